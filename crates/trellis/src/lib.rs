pub mod config;
pub mod error;
pub mod graph;
pub mod net;
pub mod ops;
pub mod report;
pub mod tensor;

pub use config::{Hypers, MutationMetric, SortDir};
pub use error::GraphError;
pub use graph::{Cell, CellId, Edge, EdgeId, EdgeKey};
pub use net::{GrowthMetric, Network};
pub use ops::{Catalog, EdgeDim, OpKind};
pub use tensor::{Shape, Tensor};
