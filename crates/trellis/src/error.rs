//! Typed errors raised at the structural-graph boundary.

use thiserror::Error;

use crate::graph::{CellId, EdgeKey};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// The forward plan no longer matches the edge mapping. Cannot occur as
    /// long as every structural change rebuilds the plan before the next
    /// evaluation.
    #[error("forward order for cell {cell} is stale; rebuild it after structural changes")]
    StaleOrder { cell: CellId },
    #[error("no edge at {key} in cell {cell}")]
    UnknownEdge { cell: CellId, key: EdgeKey },
    /// Splitting a dormant edge would grow a branch whose only ancestry is a
    /// zero output, so it is rejected outright.
    #[error("edge {key} in cell {cell} has no active operations and cannot be split")]
    DormantSplit { cell: CellId, key: EdgeKey },
}
