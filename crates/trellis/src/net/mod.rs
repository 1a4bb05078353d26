//! The network: every chain, the global growth/pruning schedule, and the
//! bookkeeping the mutation policy runs on.

pub mod chain;
pub mod growth;
pub mod mutation;
pub mod shap;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use anyhow::{ensure, Result};
use rand::RngCore;

use crate::config::Hypers;
use crate::graph::{Cell, CellId, Edge, EdgeId, EdgeKey};
use crate::ops::Catalog;
use crate::report::{DeadheadReport, NullReporter, Reporter};
use crate::tensor::Tensor;

pub use chain::Chain;
pub use growth::{GrowthMetric, GrowthRecord, GrowthSnapshot};
pub use mutation::{MutationEnv, MutationOutcome, SizeProbe};
pub use shap::{AttributionBackend, ProbeBatch};

/// Per-cell mute maps for valuation passes; a key marked `0.0` is omitted.
pub type MuteMask = HashMap<CellId, BTreeMap<EdgeKey, f64>>;

/// Hook invoked after a pruning sweep so the caller can release freed
/// device memory.
pub trait CleanupHook {
    fn clean(&mut self, phase: &str);
}

/// Cleanup hook that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCleanup;

impl CleanupHook for NoopCleanup {
    fn clean(&mut self, _phase: &str) {}
}

/// Owns all chains; drives forward evaluation, pruning sweeps, growth
/// bookkeeping, and the mutation policy.
pub struct Network {
    hypers: Hypers,
    chains: Vec<Chain>,
    size_table: HashMap<CellId, BTreeMap<EdgeKey, f64>>,
    epoch: usize,
    reporter: Box<dyn Reporter>,
}

impl Network {
    /// Builds every chain from the hyperparameters and catalog. Chain `c`
    /// runs at channel scale `scale * 2^c` over `reductions + 1` cells.
    pub fn new(hypers: Hypers, catalog: Catalog) -> Result<Self> {
        ensure!(hypers.chains >= 1, "network needs at least one chain");
        ensure!(hypers.scale >= 1, "channel scale must be at least 1");
        let in_channels = hypers.input_dim[1];
        let mut chains = Vec::with_capacity(hypers.chains);
        for c in 0..hypers.chains {
            chains.push(Chain::new(
                c,
                in_channels,
                hypers.scale << c,
                hypers.reductions,
                hypers.classes,
                &catalog,
            )?);
        }
        let mut net = Network {
            hypers,
            chains,
            size_table: HashMap::new(),
            epoch: 0,
            reporter: Box::new(NullReporter),
        };
        if !net.hypers.prune {
            net.set_pruning(false);
        }
        Ok(net)
    }

    /// Replaces the injected reporter.
    pub fn with_reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub(crate) fn reporter_mut(&mut self) -> &mut dyn Reporter {
        self.reporter.as_mut()
    }

    pub fn hypers(&self) -> &Hypers {
        &self.hypers
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn advance_epoch(&mut self) {
        self.epoch += 1;
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.chains.get(id.chain)?.cell(id.cell)
    }

    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.chains.get_mut(id.chain)?.cell_mut(id.cell)
    }

    pub fn edge(&self, cell: CellId, id: EdgeId) -> Option<&Edge> {
        self.cell(cell)?.edge(id)
    }

    /// Cells in chain-then-position order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> + '_ {
        self.chains.iter().flat_map(|chain| chain.cells().iter())
    }

    fn cells_mut(&mut self) -> impl Iterator<Item = &mut Cell> + '_ {
        self.chains
            .iter_mut()
            .flat_map(|chain| chain.cells_mut().iter_mut())
    }

    pub fn n_edges(&self) -> usize {
        self.cells().map(Cell::n_edges).sum()
    }

    /// Every `(cell, key)` pair in deterministic chain-then-cell-then-key
    /// order. The mask space and every snapshot follow this order.
    pub fn edge_order(&self) -> Vec<(CellId, EdgeKey)> {
        self.cells()
            .flat_map(|cell| cell.keys().map(move |key| (cell.id(), key)))
            .collect()
    }

    /// Forward over every chain in order, collecting one auxiliary output
    /// per (chain, cell).
    pub fn forward(
        &self,
        x: &Tensor,
        drop_prob: f32,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Tensor>> {
        self.forward_masked(x, drop_prob, None, rng)
    }

    pub(crate) fn forward_masked(
        &self,
        x: &Tensor,
        drop_prob: f32,
        mute: Option<&MuteMask>,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Tensor>> {
        let mut outs = Vec::new();
        for chain in &self.chains {
            chain.forward(x, drop_prob, mute, rng, &mut outs)?;
        }
        Ok(outs)
    }

    /// Runs the pruning sweep across every edge, reports the deltas, and
    /// invokes the cleanup hook.
    pub fn deadhead(
        &mut self,
        interval: usize,
        cleanup: &mut dyn CleanupHook,
    ) -> Result<DeadheadReport> {
        let params_before = self.param_count();
        let mut removed_ops = 0;
        let mut removed_spots = Vec::new();
        for cell in self.cells_mut() {
            let keys: Vec<EdgeKey> = cell.keys().collect();
            for key in keys {
                let Some(edge) = cell.edge_mut_at(key) else {
                    continue;
                };
                let removed = edge.deadhead(interval);
                if removed > 0 {
                    removed_ops += removed;
                    removed_spots.push((cell.id(), key));
                }
            }
        }
        let report = DeadheadReport {
            removed_ops,
            removed_spots,
            params_before,
            params_after: self.param_count(),
        };
        self.reporter.deadhead(&report);
        cleanup.clean("deadhead");
        Ok(report)
    }

    /// Pulls one growth observation from every live operation into its
    /// edge's sample buffers.
    pub fn compile_growth_factors(&mut self) {
        for cell in self.cells_mut() {
            for edge in cell.edges_mut() {
                let samples: Vec<_> = edge
                    .ops()
                    .iter()
                    .filter(|op| op.is_live())
                    .map(|op| op.growth_sample())
                    .collect();
                for sample in samples {
                    edge.record_growth(sample);
                }
            }
        }
    }

    /// Gate tracking sweep: every gate's `track`/`clamp`, plus head
    /// tracking.
    pub fn compile_pruner_stats(&mut self) {
        for cell in self.cells_mut() {
            for edge in cell.edges_mut() {
                for op in edge.ops_mut() {
                    op.track();
                    op.clamp();
                }
            }
        }
        for chain in &mut self.chains {
            for head in chain.heads_mut() {
                head.track();
            }
        }
    }

    /// Growth statistics for every edge, in [`Network::edge_order`] order.
    pub fn growth_snapshot(&self) -> GrowthSnapshot {
        self.cells()
            .flat_map(|cell| {
                cell.edges_in_order()
                    .map(move |(key, edge)| ((cell.id(), key), edge.growth_record()))
            })
            .collect()
    }

    /// Rebuilds the per-(cell, edge) incremental-footprint cache: a split
    /// mints two fresh edges, so the increment is twice the edge size.
    pub fn refresh_size_table(&mut self) {
        let mut table: HashMap<CellId, BTreeMap<EdgeKey, f64>> = HashMap::new();
        for cell in self.cells() {
            let entry = table.entry(cell.id()).or_default();
            for (key, edge) in cell.edges_in_order() {
                entry.insert(key, 2.0 * edge.edge_size_kib());
            }
        }
        self.size_table = table;
    }

    pub fn incremental_size(&self, cell: CellId, key: EdgeKey) -> Option<f64> {
        self.size_table.get(&cell)?.get(&key).copied()
    }

    /// Clears growth samples network-wide.
    pub fn clear_growth(&mut self) {
        for cell in self.cells_mut() {
            for edge in cell.edges_mut() {
                edge.reset_growth();
            }
        }
    }

    /// Master switch for every pruning gate.
    pub fn set_pruning(&mut self, enabled: bool) {
        for cell in self.cells_mut() {
            for edge in cell.edges_mut() {
                for op in edge.ops_mut() {
                    op.set_prune_enabled(enabled);
                }
            }
        }
    }

    /// Returns the engine to its start-of-training state: epoch zero, no
    /// growth samples, no attributions. Collaborator parameters are theirs
    /// to reset.
    pub fn reset_state(&mut self) {
        self.epoch = 0;
        for cell in self.cells_mut() {
            for edge in cell.edges_mut() {
                edge.reset_growth();
                edge.clear_shap();
            }
        }
    }

    /// Sum of the active operations' footprints across the network, in KiB.
    pub fn size_kib(&self) -> f64 {
        self.cells().map(Cell::size_kib).sum()
    }

    pub fn param_count(&self) -> u64 {
        self.chains.iter().map(Chain::param_count).sum()
    }

    pub fn op_count(&self) -> usize {
        self.cells().map(Cell::op_count).sum()
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:=^46}", " NETWORK ")?;
        writeln!(
            f,
            "{:<12}{:>10}{:>10}{:>14}",
            format!("Epoch {}", self.epoch),
            "Edges",
            "Ops",
            "Params"
        )?;
        for (c, chain) in self.chains.iter().enumerate() {
            writeln!(f, "{:-^46}", format!(" Chain {c} "))?;
            for cell in chain.cells() {
                writeln!(
                    f,
                    "{:<12}{:>10}{:>10}{:>14}",
                    format!("Cell {}", cell.id().cell),
                    cell.n_edges(),
                    cell.op_count(),
                    cell.param_count()
                )?;
            }
        }
        writeln!(f, "{:=^46}", "")?;
        writeln!(
            f,
            "{:<12}{:>10}{:>10}{:>14}",
            "Total",
            self.n_edges(),
            self.op_count(),
            self.param_count()
        )
    }
}
