//! A directed edge carrying candidate operations between two nodes.

use anyhow::{bail, Context, Result};
use rand::RngCore;

use crate::graph::EdgeId;
use crate::net::growth::GrowthRecord;
use crate::ops::functional::{self, ChannelNorm};
use crate::ops::{Catalog, EdgeDim, GrowthSample, OpKind, PrunableOp};
use crate::tensor::Tensor;

/// Evaluates a set of candidate operations, summed and normalized; supports
/// pruning and reports growth statistics.
///
/// Once every counted operation has been pruned the edge goes dormant:
/// normalization is dropped and evaluation takes a fixed zero-output path.
/// Dormancy is one-directional.
pub struct Edge {
    id: EdgeId,
    dim: EdgeDim,
    ops: Vec<PrunableOp>,
    num_ops: usize,
    norm: Option<ChannelNorm>,
    lineage: Vec<EdgeId>,
    growth_weight: Vec<f64>,
    growth_grad: Vec<f64>,
    shap: Option<f64>,
}

impl Edge {
    /// Instantiates one operation per catalog entry at the edge's dimension.
    pub fn new(id: EdgeId, dim: EdgeDim, catalog: &Catalog, lineage: Vec<EdgeId>) -> Result<Self> {
        let ops = catalog.build_ops(dim)?;
        let num_ops = ops.iter().filter(|op| !op.kind().is_zero()).count();
        let norm = (num_ops > 0).then(|| ChannelNorm::new(dim.channels));
        Ok(Edge {
            id,
            dim,
            ops,
            num_ops,
            norm,
            lineage,
            growth_weight: Vec::new(),
            growth_grad: Vec::new(),
            shap: None,
        })
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn dim(&self) -> EdgeDim {
        self.dim
    }

    /// Count of unpruned, non-zero-kind operations.
    pub fn num_ops(&self) -> usize {
        self.num_ops
    }

    pub fn is_dormant(&self) -> bool {
        self.num_ops == 0
    }

    /// Ancestor edge ids, oldest first. Strictly append-only across splits.
    pub fn lineage(&self) -> &[EdgeId] {
        &self.lineage
    }

    pub fn ops(&self) -> &[PrunableOp] {
        &self.ops
    }

    pub fn ops_mut(&mut self) -> &mut [PrunableOp] {
        &mut self.ops
    }

    /// Kinds of the operations that have not been pruned, in catalog order.
    /// Fresh edges minted by a split are restricted to these.
    pub fn surviving_kinds(&self) -> Vec<OpKind> {
        self.ops
            .iter()
            .filter(|op| !op.is_pruned())
            .map(|op| op.kind())
            .collect()
    }

    /// Evaluates the edge. With `omit` the input bypasses the operations
    /// through a fixed stride-aware identity, muting the edge without
    /// changing topology. Stochastic path drop applies to every operation
    /// except the identity/zero passthroughs.
    pub fn forward(
        &self,
        x: &Tensor,
        drop_prob: f32,
        omit: bool,
        rng: &mut dyn RngCore,
    ) -> Result<Tensor> {
        if omit {
            return functional::identity_bypass(x, self.dim.stride);
        }
        if self.num_ops == 0 {
            return functional::zero_output(x, self.dim.stride);
        }
        let mut sum: Option<Tensor> = None;
        for op in &self.ops {
            if op.is_pruned() || op.kind().is_zero() {
                continue;
            }
            let mut out = op.forward(x)?;
            if !op.kind().is_passthrough() {
                out = functional::drop_path(out, drop_prob, rng)?;
            }
            sum = match sum {
                None => Some(out),
                Some(mut acc) => {
                    acc.add_assign(&out)?;
                    Some(acc)
                }
            };
        }
        let Some(total) = sum else {
            bail!("edge {} counts {} live ops but none evaluated", self.id, self.num_ops);
        };
        self.norm
            .as_ref()
            .context("active edge lost its normalization stage")?
            .forward(&total)
    }

    /// Polls every operation's gate. Returns how many were removed; on the
    /// sweep that removes the last counted operation the edge goes dormant.
    pub fn deadhead(&mut self, interval: usize) -> usize {
        let removed = self
            .ops
            .iter_mut()
            .map(|op| usize::from(op.deadhead(interval)))
            .sum::<usize>();
        self.num_ops -= removed;
        if self.num_ops == 0 {
            self.norm = None;
        }
        removed
    }

    /// Appends one growth observation; absent sides are skipped.
    pub fn record_growth(&mut self, sample: GrowthSample) {
        if let Some(w) = sample.weight {
            self.growth_weight.push(w);
        }
        if let Some(g) = sample.grad {
            self.growth_grad.push(g);
        }
    }

    /// Fixed-shape growth statistics. All-null exactly when no samples have
    /// been recorded since the last reset.
    pub fn growth_record(&self) -> GrowthRecord {
        GrowthRecord::from_samples(&self.growth_weight, &self.growth_grad, self.shap)
    }

    pub fn reset_growth(&mut self) {
        self.growth_weight.clear();
        self.growth_grad.clear();
    }

    pub fn shap(&self) -> Option<f64> {
        self.shap
    }

    pub fn set_shap(&mut self, value: f64) {
        self.shap = Some(value);
    }

    pub fn clear_shap(&mut self) {
        self.shap = None;
    }

    /// Sum of the active operations' declared footprints, in KiB.
    pub fn edge_size_kib(&self) -> f64 {
        self.ops.iter().map(|op| op.mem_kib()).sum()
    }

    /// Sum of the active operations' parameter counts.
    pub fn param_count(&self) -> u64 {
        self.ops.iter().map(|op| op.params()).sum()
    }
}
