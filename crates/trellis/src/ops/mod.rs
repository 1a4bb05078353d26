//! Operation layer: the closed kind vocabulary, the collaborator trait
//! seams, the gate-wrapped operation wrapper, and the engine-owned
//! functional routines.

pub mod capability;
pub mod functional;
pub mod kind;
pub mod prunable;

use std::sync::Arc;

use anyhow::{ensure, Result};

pub use capability::{AuxHead, BuiltOp, EdgeDim, GrowthSample, OpFactory, PruneGate, TensorOp};
pub use kind::OpKind;
pub use prunable::PrunableOp;

/// The catalog an edge is built from: an ordered set of operation kinds plus
/// the factory that constructs concrete instances for a given dimension.
#[derive(Clone)]
pub struct Catalog {
    kinds: Vec<OpKind>,
    factory: Arc<dyn OpFactory>,
}

impl Catalog {
    pub fn new(kinds: Vec<OpKind>, factory: Arc<dyn OpFactory>) -> Result<Self> {
        ensure!(!kinds.is_empty(), "catalog needs at least one kind");
        Ok(Catalog { kinds, factory })
    }

    /// The full kind vocabulary with the provided factory.
    pub fn common(factory: Arc<dyn OpFactory>) -> Self {
        Catalog {
            kinds: OpKind::ALL.to_vec(),
            factory,
        }
    }

    pub fn kinds(&self) -> &[OpKind] {
        &self.kinds
    }

    pub fn factory(&self) -> &Arc<dyn OpFactory> {
        &self.factory
    }

    /// Same factory, narrowed to `kinds`. Used when a split restricts fresh
    /// edges to the kinds still alive on the parent.
    pub fn restricted(&self, kinds: Vec<OpKind>) -> Result<Catalog> {
        Catalog::new(kinds, Arc::clone(&self.factory))
    }

    /// Instantiates one gate-wrapped operation per kind at the given dim.
    pub fn build_ops(&self, dim: EdgeDim) -> Result<Vec<PrunableOp>> {
        self.kinds
            .iter()
            .map(|&kind| Ok(PrunableOp::new(kind, self.factory.build_op(kind, dim)?)))
            .collect()
    }
}
