//! Node/edge/cell addressing and the structural graph itself.
//!
//! Nodes are small consecutive integers local to a cell. Edges carry two
//! addresses: a positional [`EdgeKey`] that renumbers when the cell grows,
//! and a stable [`EdgeId`] minted once at construction and kept for life.
//! Lineage, optimizer registration, and identity checks use the stable id;
//! evaluation order and mutation targeting use the key.

mod cell;
mod edge;
mod plan;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use cell::Cell;
pub use edge::Edge;
pub use plan::{ForwardPlan, PlanStep};

/// Node index within a cell; 0 is the sole source.
pub type NodeId = u32;

/// Stable per-cell edge identity. Never reused, never renumbered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct EdgeId(pub u64);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Positional edge address: an ordered node pair with `src < dst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub src: NodeId,
    pub dst: NodeId,
}

impl EdgeKey {
    /// Builds a key, enforcing the `src < dst` invariant.
    pub fn new(src: NodeId, dst: NodeId) -> Self {
        assert!(src < dst, "edge keys require src < dst, got {src} >= {dst}");
        EdgeKey { src, dst }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.src, self.dst)
    }
}

/// Network-level cell address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId {
    pub chain: usize,
    pub cell: usize,
}

impl CellId {
    pub fn new(chain: usize, cell: usize) -> Self {
        CellId { chain, cell }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.chain, self.cell)
    }
}
