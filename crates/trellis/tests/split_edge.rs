mod common;

use std::collections::BTreeSet;

use trellis::graph::Cell;
use trellis::{CellId, EdgeDim, EdgeKey, GraphError};

fn new_cell() -> Cell {
    Cell::new(
        CellId::new(0, 0),
        EdgeDim::new(4, 1),
        EdgeDim::new(4, 1),
        common::catalog(),
    )
    .expect("cell construction")
}

#[test]
fn first_split_yields_the_canonical_triangle() {
    let mut cell = new_cell();
    let original = cell.id_at(EdgeKey::new(0, 1)).unwrap();
    let (a, b) = cell.split_edge(EdgeKey::new(0, 1)).unwrap();

    let keys: BTreeSet<EdgeKey> = cell.keys().collect();
    let expected: BTreeSet<EdgeKey> = [
        EdgeKey::new(0, 1),
        EdgeKey::new(1, 2),
        EdgeKey::new(0, 2),
    ]
    .into_iter()
    .collect();
    assert_eq!(keys, expected);

    // The bridge edge is the original object, re-addressed.
    assert_eq!(cell.id_at(EdgeKey::new(0, 2)), Some(original));
    assert_eq!(cell.id_at(EdgeKey::new(0, 1)), Some(a));
    assert_eq!(cell.id_at(EdgeKey::new(1, 2)), Some(b));
}

#[test]
fn split_adds_one_node_and_two_edges() {
    let mut cell = new_cell();
    for _ in 0..4 {
        let nodes = cell.n_nodes();
        let edges = cell.n_edges();
        let key = cell.keys().next().unwrap();
        cell.split_edge(key).unwrap();
        assert_eq!(cell.n_nodes(), nodes + 1);
        assert_eq!(cell.n_edges(), edges + 2);
    }
}

#[test]
fn endpoints_shift_only_at_or_above_the_split_destination() {
    let mut cell = new_cell();
    cell.split_edge(EdgeKey::new(0, 1)).unwrap();
    // {0->1, 1->2, 0->2}; split 0->1 again: j = 1, so 1->2 becomes 2->3 and
    // 0->2 becomes 0->3, while indices below 1 stay put.
    let before: Vec<(EdgeKey, trellis::EdgeId)> =
        cell.keys().map(|k| (k, cell.id_at(k).unwrap())).collect();
    cell.split_edge(EdgeKey::new(0, 1)).unwrap();

    for (old_key, id) in before {
        if old_key == EdgeKey::new(0, 1) {
            continue;
        }
        let new_key = cell
            .keys()
            .find(|&k| cell.id_at(k) == Some(id))
            .expect("surviving edge kept its identity");
        let src_shift = new_key.src - old_key.src;
        let dst_shift = new_key.dst - old_key.dst;
        assert!(src_shift <= 1 && dst_shift <= 1);
        assert_eq!(src_shift == 1, old_key.src >= 1);
        assert_eq!(dst_shift == 1, old_key.dst >= 1);
    }
}

#[test]
fn lineage_length_counts_splits() {
    let mut cell = new_cell();
    // Repeatedly split whatever sits at 0->1; each fresh edge inherits the
    // parent's lineage plus the parent itself.
    for expected_len in 1..=3 {
        let (a, b) = cell.split_edge(EdgeKey::new(0, 1)).unwrap();
        assert_eq!(cell.edge(a).unwrap().lineage().len(), expected_len);
        assert_eq!(cell.edge(b).unwrap().lineage().len(), expected_len);
    }
}

#[test]
fn bridge_edge_growth_stats_are_reset() {
    let mut cell = new_cell();
    let original = cell.id_at(EdgeKey::new(0, 1)).unwrap();
    cell.edge_mut(original)
        .unwrap()
        .record_growth(trellis::ops::GrowthSample {
            weight: Some(1.0),
            grad: Some(2.0),
        });
    assert!(!cell.edge(original).unwrap().growth_record().is_null());
    cell.split_edge(EdgeKey::new(0, 1)).unwrap();
    assert!(cell.edge(original).unwrap().growth_record().is_null());
}

#[test]
fn fresh_edges_carry_only_surviving_kinds() {
    use trellis::OpKind;
    let mut cell = Cell::new(
        CellId::new(0, 0),
        EdgeDim::new(4, 1),
        EdgeDim::new(4, 1),
        common::selective_killer_catalog(vec![OpKind::SepConv5, OpKind::MaxPool3]),
    )
    .unwrap();
    assert_eq!(cell.deadhead(1), 2);
    let (a, _) = cell.split_edge(EdgeKey::new(0, 1)).unwrap();
    let kinds: Vec<OpKind> = cell
        .edge(a)
        .unwrap()
        .ops()
        .iter()
        .map(|op| op.kind())
        .collect();
    assert!(!kinds.contains(&OpKind::SepConv5));
    assert!(!kinds.contains(&OpKind::MaxPool3));
    assert!(kinds.contains(&OpKind::Identity));
    assert!(kinds.contains(&OpKind::SepConv3));
}

#[test]
fn splitting_a_dormant_edge_is_refused() {
    let mut cell = Cell::new(
        CellId::new(0, 0),
        EdgeDim::new(4, 1),
        EdgeDim::new(4, 1),
        common::killer_catalog(),
    )
    .unwrap();
    let removed = cell.deadhead(1);
    assert!(removed > 0);
    let err = cell.split_edge(EdgeKey::new(0, 1)).unwrap_err();
    assert_eq!(
        err.downcast_ref::<GraphError>(),
        Some(&GraphError::DormantSplit {
            cell: CellId::new(0, 0),
            key: EdgeKey::new(0, 1),
        })
    );
}

#[test]
fn splitting_a_missing_edge_is_an_error() {
    let mut cell = new_cell();
    let err = cell.split_edge(EdgeKey::new(0, 5)).unwrap_err();
    assert_eq!(
        err.downcast_ref::<GraphError>(),
        Some(&GraphError::UnknownEdge {
            cell: CellId::new(0, 0),
            key: EdgeKey::new(0, 5),
        })
    );
}

#[test]
fn reduction_edge_splits_into_reduce_then_normal() {
    let mut cell = Cell::new(
        CellId::new(0, 1),
        EdgeDim::new(4, 2),
        EdgeDim::new(4, 1),
        common::catalog(),
    )
    .unwrap();
    let (a, b) = cell.split_edge(EdgeKey::new(0, 1)).unwrap();
    // The first hop keeps the reduction stride; the second runs at the
    // post-reduction dimension.
    assert_eq!(cell.edge(a).unwrap().dim(), EdgeDim::new(4, 2));
    assert_eq!(cell.edge(b).unwrap().dim(), EdgeDim::new(4, 1));
}
