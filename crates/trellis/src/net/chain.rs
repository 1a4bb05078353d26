//! One chain: a stem, a sequence of cells, and the inter-cell plumbing.
//!
//! Between consecutive cells the running activation is rescaled and merged
//! with the cell output (`x = scaler(residual(x) + cell_out)`); every cell
//! also feeds an auxiliary head whose output is surfaced to the caller in
//! cell order. Stems, scalers, residual rescalers, and heads are all
//! factory-built collaborators.

use anyhow::Result;
use rand::RngCore;

use crate::graph::{Cell, CellId};
use crate::net::MuteMask;
use crate::ops::{AuxHead, Catalog, EdgeDim, TensorOp};
use crate::tensor::Tensor;

pub struct Chain {
    stem: Box<dyn TensorOp>,
    cells: Vec<Cell>,
    scalers: Vec<Box<dyn TensorOp>>,
    residuals: Vec<Box<dyn TensorOp>>,
    heads: Vec<Box<dyn AuxHead>>,
}

impl Chain {
    /// Builds chain `chain_idx` with `reductions + 1` cells at channel scale
    /// `base_channels = scale * 2^chain_idx`; cell `k` runs at
    /// `base_channels * 2^k` and reduces on entry for every `k > 0`.
    pub fn new(
        chain_idx: usize,
        in_channels: usize,
        base_channels: usize,
        reductions: usize,
        classes: usize,
        catalog: &Catalog,
    ) -> Result<Self> {
        let factory = catalog.factory();
        let stem = factory.build_stem(in_channels, base_channels)?;

        let n_cells = reductions + 1;
        let mut cells = Vec::with_capacity(n_cells);
        let mut scalers = Vec::with_capacity(n_cells.saturating_sub(1));
        let mut residuals = Vec::with_capacity(n_cells.saturating_sub(1));
        let mut heads = Vec::with_capacity(n_cells);
        for k in 0..n_cells {
            let channels = base_channels << k;
            let entry_stride = if k == 0 { 1 } else { 2 };
            let entry_dim = EdgeDim::new(channels, entry_stride);
            let post_dim = EdgeDim::new(channels, 1);
            cells.push(Cell::new(
                CellId::new(chain_idx, k),
                entry_dim,
                post_dim,
                catalog.clone(),
            )?);
            heads.push(factory.build_head(channels, classes)?);
            if k + 1 < n_cells {
                scalers.push(factory.build_scaler(channels, channels * 2)?);
                residuals.push(factory.build_residual(channels, entry_stride)?);
            }
        }
        Ok(Chain {
            stem,
            cells,
            scalers,
            residuals,
            heads,
        })
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    pub fn cell(&self, idx: usize) -> Option<&Cell> {
        self.cells.get(idx)
    }

    pub fn cell_mut(&mut self, idx: usize) -> Option<&mut Cell> {
        self.cells.get_mut(idx)
    }

    pub(crate) fn heads_mut(&mut self) -> &mut [Box<dyn AuxHead>] {
        &mut self.heads
    }

    /// Runs the chain, pushing one auxiliary output per cell onto `outs` in
    /// cell order. `mute` carries per-cell mute masks for valuation passes.
    pub fn forward(
        &self,
        input: &Tensor,
        drop_prob: f32,
        mute: Option<&MuteMask>,
        rng: &mut dyn RngCore,
        outs: &mut Vec<Tensor>,
    ) -> Result<()> {
        let mut x = self.stem.forward(input)?;
        let last = self.cells.len() - 1;
        for (k, cell) in self.cells.iter().enumerate() {
            let mask = mute.and_then(|m| m.get(&cell.id()));
            let cell_out = cell.forward(&x, drop_prob, mask, rng)?;
            if k != last {
                let carried = self.residuals[k].forward(&x)?.add(&cell_out)?;
                x = self.scalers[k].forward(&carried)?;
            }
            outs.push(self.heads[k].forward(&cell_out)?);
        }
        Ok(())
    }

    pub fn param_count(&self) -> u64 {
        self.cells.iter().map(Cell::param_count).sum()
    }
}
