mod common;

use trellis::graph::Cell;
use trellis::net::NoopCleanup;
use trellis::{CellId, EdgeDim, EdgeKey, Shape, Tensor};

fn killer_cell(stride: usize) -> Cell {
    Cell::new(
        CellId::new(0, 0),
        EdgeDim::new(4, stride),
        EdgeDim::new(4, 1),
        common::killer_catalog(),
    )
    .expect("cell construction")
}

#[test]
fn full_sweep_turns_the_edge_dormant() {
    let mut cell = killer_cell(1);
    let edge = cell.edge_at(EdgeKey::new(0, 1)).unwrap();
    let live_before = edge.num_ops();
    assert!(live_before > 0);

    let removed = cell.deadhead(1);
    assert_eq!(removed, live_before);
    let edge = cell.edge_at(EdgeKey::new(0, 1)).unwrap();
    assert_eq!(edge.num_ops(), 0);
    assert!(edge.is_dormant());
}

#[test]
fn dormant_edge_forwards_zero_contribution_at_stride() {
    for stride in [1usize, 2] {
        let mut cell = killer_cell(stride);
        cell.deadhead(1);
        let x = Tensor::randn(Shape::new([2, 4, 8, 8]), 1.0, &mut common::rng());
        let out = cell.forward(&x, 0.0, None, &mut common::rng()).unwrap();
        let expected = [2, 4, 8 / stride, 8 / stride];
        assert_eq!(out.shape().dims(), &expected);
        assert!(out.data().iter().all(|&v| v == 0.0));
    }
}

#[test]
fn repeated_sweeps_remove_nothing_further() {
    let mut cell = killer_cell(1);
    assert!(cell.deadhead(1) > 0);
    assert_eq!(cell.deadhead(1), 0);
    assert_eq!(cell.deadhead(1), 0);
}

#[test]
fn num_ops_is_non_increasing() {
    let mut cell = Cell::new(
        CellId::new(0, 0),
        EdgeDim::new(4, 1),
        EdgeDim::new(4, 1),
        common::selective_killer_catalog(vec![trellis::OpKind::AvgPool3]),
    )
    .unwrap();
    let mut previous = cell.edge_at(EdgeKey::new(0, 1)).unwrap().num_ops();
    for _ in 0..3 {
        cell.deadhead(1);
        let now = cell.edge_at(EdgeKey::new(0, 1)).unwrap().num_ops();
        assert!(now <= previous);
        previous = now;
    }
    assert!(previous > 0, "only the targeted kind should be pruned");
}

#[test]
fn dormant_edge_reports_zero_size_and_params() {
    let mut cell = killer_cell(1);
    assert!(cell.edge_at(EdgeKey::new(0, 1)).unwrap().edge_size_kib() > 0.0);
    cell.deadhead(1);
    let edge = cell.edge_at(EdgeKey::new(0, 1)).unwrap();
    assert_eq!(edge.edge_size_kib(), 0.0);
    assert_eq!(edge.param_count(), 0);
}

#[test]
fn pruning_master_switch_blocks_gates() {
    let hypers = common::hypers(
        1,
        0,
        trellis::GrowthMetric::AbsMeanGrad,
        trellis::SortDir::Max,
    );
    let mut net = trellis::Network::new(hypers, common::killer_catalog()).unwrap();
    net.set_pruning(false);
    let report = net.deadhead(1, &mut NoopCleanup).unwrap();
    assert_eq!(report.removed_ops, 0);

    net.set_pruning(true);
    let report = net.deadhead(1, &mut NoopCleanup).unwrap();
    assert!(report.removed_ops > 0);
}

#[test]
fn network_deadhead_aggregates_and_reports_deltas() {
    let hypers = common::hypers(
        2,
        1,
        trellis::GrowthMetric::AbsMeanGrad,
        trellis::SortDir::Max,
    );
    let mut net = trellis::Network::new(hypers, common::killer_catalog()).unwrap();
    let params_before = net.param_count();
    assert!(params_before > 0);

    let report = net.deadhead(1, &mut NoopCleanup).unwrap();
    assert!(report.removed_ops > 0);
    assert_eq!(report.params_before, params_before);
    assert_eq!(report.params_after, 0);
    // Every cell held exactly one edge, and every edge lost operations.
    assert_eq!(report.removed_spots.len(), 4);
}
