pub mod backend;
pub mod config;
pub mod error;
pub mod graph;
pub mod import;
pub mod layers;
pub mod model;
pub mod ops;
pub mod shape;
pub mod tensor;

pub use crate::backend::Backend;
pub use crate::config::Config;
pub use crate::error::{ConfigError, Error, GraphError};
pub use crate::graph::{Graph, Node, NodeId};
pub use crate::layers::Layer;
pub use crate::model::sequential::Sequential;
pub use crate::model::{Compiled, Model, Plan, Step};
pub use crate::ops::{OpKind, Operator};
pub use crate::shape::{Array, ShapeError};
pub use crate::tensor::{DataType, TensorHandle, TensorId};
