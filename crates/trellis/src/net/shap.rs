//! SHAP-based edge valuation.
//!
//! The engine exposes a pure (mask rows -> scores) function and lets an
//! external model-agnostic attribution backend drive the sampling. A mask
//! row assigns every edge a coalition value: `0.0` mutes the edge (its
//! input bypasses the candidate operations through the stride-aware
//! identity), anything else leaves it live. The baseline sample mutes
//! everything and the evaluation sample enables everything, so the
//! resulting attribution is each edge's contribution to switching the
//! network on.

use anyhow::{ensure, Context, Result};
use rand::RngCore;

use crate::net::{MuteMask, Network};
use crate::ops::functional::{bootstrap_mean, top1_correct};
use crate::tensor::Tensor;

/// Bootstrap resamples drawn per mask row when estimating utility.
pub const BOOTSTRAP_DRAWS: usize = 10_000;

/// Keeps scores away from exact 0/1 so a log-odds link stays defined.
const SCORE_EPS: f64 = 1e-6;

/// One labelled batch of held-out probe data for valuation passes.
#[derive(Debug, Clone)]
pub struct ProbeBatch {
    pub inputs: Tensor,
    pub targets: Vec<usize>,
}

/// Model-agnostic attribution backend (external). Given a scoring function
/// over mask rows, a baseline sample, an evaluation sample, and a coalition
/// sample count, produces one attribution per feature.
pub trait AttributionBackend {
    fn attribute(
        &self,
        score: &mut dyn FnMut(&[Vec<f64>]) -> Result<Vec<f64>>,
        baseline: &[f64],
        evaluation: &[f64],
        samples: usize,
    ) -> Result<Vec<f64>>;
}

impl Network {
    /// Runs the attribution backend over the edge mask space and writes the
    /// resulting per-edge attributions back onto the edges, in snapshot
    /// order.
    pub fn compute_shap_values(
        &mut self,
        samples: usize,
        backend: &dyn AttributionBackend,
        probe: &[ProbeBatch],
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        ensure!(
            !probe.is_empty(),
            "edge valuation requires at least one probe batch"
        );
        let n_edges = self.n_edges();
        let baseline = vec![0.0; n_edges];
        let evaluation = vec![1.0; n_edges];

        let values = {
            let net = &*self;
            let mut score = |rows: &[Vec<f64>]| net.shap_forward(rows, probe, &mut *rng);
            backend.attribute(&mut score, &baseline, &evaluation, samples)?
        };
        ensure!(
            values.len() == n_edges,
            "attribution backend returned {} values for {} edges",
            values.len(),
            n_edges
        );

        let order = self.edge_order();
        for ((cell_id, key), value) in order.into_iter().zip(values) {
            let edge = self
                .cell_mut(cell_id)
                .and_then(|cell| cell.edge_mut_at(key))
                .context("edge order drifted during attribution write-back")?;
            edge.set_shap(value);
        }
        Ok(())
    }

    /// Black-box scoring function for the attribution backend: for each mask
    /// row, runs the probe batches through the masked network, takes top-1
    /// correctness of the final head's output per example, and estimates the
    /// row's utility as the mean of bootstrap resample means, clamped away
    /// from exact 0 and 1.
    pub fn shap_forward(
        &self,
        rows: &[Vec<f64>],
        probe: &[ProbeBatch],
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f64>> {
        ensure!(
            !probe.is_empty(),
            "edge valuation requires at least one probe batch"
        );
        let mut scores = Vec::with_capacity(rows.len());
        for row in rows {
            let mask = self.mute_mask_from_row(row)?;
            let mut correct: Vec<f64> = Vec::new();
            for batch in probe {
                let outs = self.forward_masked(&batch.inputs, 0.0, Some(&mask), rng)?;
                let logits = outs
                    .last()
                    .context("masked forward produced no auxiliary outputs")?;
                correct.extend(
                    top1_correct(logits, &batch.targets)?
                        .into_iter()
                        .map(|c| if c { 1.0 } else { 0.0 }),
                );
            }
            let mut score = bootstrap_mean(&correct, BOOTSTRAP_DRAWS, rng)?;
            if score >= 1.0 {
                score -= SCORE_EPS;
            } else if score <= 0.0 {
                score += SCORE_EPS;
            }
            scores.push(score);
        }
        Ok(scores)
    }

    /// Expands a flat mask row into per-cell mute maps, pairing values with
    /// edges in snapshot order.
    fn mute_mask_from_row(&self, row: &[f64]) -> Result<MuteMask> {
        let order = self.edge_order();
        ensure!(
            row.len() == order.len(),
            "mask row has {} entries for {} edges",
            row.len(),
            order.len()
        );
        let mut mask = MuteMask::new();
        for ((cell_id, key), &value) in order.into_iter().zip(row) {
            mask.entry(cell_id).or_default().insert(key, value);
        }
        Ok(mask)
    }
}
