//! Injected observers for structural changes.
//!
//! Core mutation operations return structured results; anything a caller
//! wants printed, plotted, or persisted goes through a [`Reporter`]
//! implementation supplied at network construction.

use crate::graph::{CellId, EdgeKey};

/// Outcome of a pruning sweep across the whole network.
#[derive(Debug, Clone)]
pub struct DeadheadReport {
    /// Total operations removed in this sweep.
    pub removed_ops: usize,
    /// Every edge that lost at least one operation.
    pub removed_spots: Vec<(CellId, EdgeKey)>,
    pub params_before: u64,
    pub params_after: u64,
}

/// A mutation step that was skipped by the budget gate.
#[derive(Debug, Clone)]
pub struct BudgetSkip {
    pub cell: CellId,
    pub key: EdgeKey,
    pub current_kib: f64,
    pub incremental_kib: f64,
    pub budget_kib: f64,
    pub overfill: bool,
}

pub trait Reporter {
    fn deadhead(&mut self, report: &DeadheadReport) {
        let _ = report;
    }

    fn budget_skip(&mut self, skip: &BudgetSkip) {
        let _ = skip;
    }

    fn mutation(&mut self, cell: CellId, key: EdgeKey) {
        let _ = (cell, key);
    }

    /// Exploration fallback found no chain left to mutate; the remaining
    /// steps of the call were abandoned.
    fn fallback_exhausted(&mut self, steps_completed: usize) {
        let _ = steps_completed;
    }
}

/// Discards every event. The default when no reporter is injected.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {}
