//! The global growth policy: rank edges, gate on the memory budget, split.

use std::collections::HashSet;

use anyhow::{Context, Result};
use rand::{Rng, RngCore};

use crate::config::SortDir;
use crate::graph::{CellId, EdgeId, EdgeKey};
use crate::net::shap::{AttributionBackend, ProbeBatch};
use crate::net::Network;
use crate::report::BudgetSkip;

/// External size probe: current footprint estimate (KiB) plus whether the
/// model already overfills its device.
pub trait SizeProbe {
    fn measure(&mut self, net: &Network) -> Result<(f64, bool)>;
}

/// Collaborators a mutation pass needs.
pub struct MutationEnv<'a> {
    pub probe: &'a mut dyn SizeProbe,
    pub attribution: &'a dyn AttributionBackend,
    pub probe_batches: &'a [ProbeBatch],
    /// Coalition draws for the SHAP refresh; defaults to `100 * n_edges`.
    pub shap_samples: Option<usize>,
    pub rng: &'a mut dyn RngCore,
}

/// Structured result of a mutation pass, for the caller to register with
/// training state (e.g. attach fresh edges to the optimizer).
#[derive(Debug, Clone, Default)]
pub struct MutationOutcome {
    /// Split targets, in application order.
    pub applied: Vec<(CellId, EdgeKey)>,
    /// The freshly constructed edges from every applied split.
    pub new_edges: Vec<(CellId, EdgeId)>,
    /// Steps attempted before the pass finished or the exploration fallback
    /// ran out of chains.
    pub steps_attempted: usize,
}

impl Network {
    /// Performs up to `n` growth attempts.
    ///
    /// Past the first epoch the SHAP attributions are refreshed first; they
    /// are the costlier, higher-fidelity signal and supersede raw growth
    /// statistics once available. Each step re-snapshots growth (a prior
    /// step's split invalidates older snapshots), selects a target edge,
    /// and asks the size probe whether the split fits the budget. A step
    /// rejected by the budget gate is skipped, not retried.
    pub fn mutate(&mut self, n: usize, env: &mut MutationEnv<'_>) -> Result<MutationOutcome> {
        if self.epoch() > 0 {
            let samples = env.shap_samples.unwrap_or(100 * self.n_edges());
            self.compute_shap_values(samples, env.attribution, env.probe_batches, env.rng)?;
        }

        let metric = self.hypers().mutation.metric;
        let sort_dir = self.hypers().mutation.sort_dir;
        let budget = self.hypers().memory_budget_kib;

        let mut outcome = MutationOutcome::default();
        let mut used_chains: HashSet<usize> = HashSet::new();

        for _ in 0..n {
            // Dormant edges are never candidates; splitting them is refused
            // at the cell level as well.
            let candidates: Vec<(CellId, EdgeKey, Option<f64>)> = self
                .growth_snapshot()
                .into_iter()
                .map(|((cell_id, key), record)| (cell_id, key, record.metric(metric)))
                .filter(|&(cell_id, key, _)| {
                    self.cell(cell_id)
                        .and_then(|cell| cell.edge_at(key))
                        .is_some_and(|edge| !edge.is_dormant())
                })
                .collect();

            let (cell_id, key) = if candidates.iter().all(|(_, _, v)| v.is_none()) {
                // Exploration fallback: no signal anywhere yet, so pick
                // uniformly among edges in chains this call has not touched.
                let pool: Vec<(CellId, EdgeKey)> = candidates
                    .iter()
                    .filter(|(cell_id, _, _)| !used_chains.contains(&cell_id.chain))
                    .map(|&(cell_id, key, _)| (cell_id, key))
                    .collect();
                if pool.is_empty() {
                    self.reporter_mut().fallback_exhausted(outcome.applied.len());
                    break;
                }
                let picked = pool[env.rng.gen_range(0..pool.len())];
                used_chains.insert(picked.0.chain);
                picked
            } else {
                let mut ranked: Vec<(CellId, EdgeKey, f64)> = candidates
                    .iter()
                    .filter_map(|&(cell_id, key, v)| v.map(|v| (cell_id, key, v)))
                    .collect();
                ranked.sort_by(|a, b| match sort_dir {
                    SortDir::Max => b.2.total_cmp(&a.2),
                    SortDir::Min => a.2.total_cmp(&b.2),
                });
                let top = ranked[0];
                (top.0, top.1)
            };
            outcome.steps_attempted += 1;

            let (current_kib, overfill) = env.probe.measure(self)?;
            self.refresh_size_table();
            let incremental_kib = self
                .incremental_size(cell_id, key)
                .context("selected edge missing from the size table")?;
            if overfill || current_kib + incremental_kib > budget {
                self.reporter_mut().budget_skip(&BudgetSkip {
                    cell: cell_id,
                    key,
                    current_kib,
                    incremental_kib,
                    budget_kib: budget,
                    overfill,
                });
                continue;
            }

            let cell = self
                .cell_mut(cell_id)
                .context("selected cell disappeared before the split")?;
            let (a, b) = cell.split_edge(key)?;
            if let Some(edge) = cell.edge_mut_at(key) {
                edge.reset_growth();
            }
            outcome.applied.push((cell_id, key));
            outcome.new_edges.push((cell_id, a));
            outcome.new_edges.push((cell_id, b));
            self.reporter_mut().mutation(cell_id, key);
        }

        // Fresh operations need a clean baseline before being judged against
        // the survivors.
        if !outcome.new_edges.is_empty() {
            self.clear_growth();
        }
        Ok(outcome)
    }
}
