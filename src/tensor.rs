use crate::graph::NodeId;
use crate::shape::{display_comma, Array};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Debug, Display, Formatter};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Float,
    Double,
    Int,
    Long,
    Bool,
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Float => "float32",
            DataType::Double => "float64",
            DataType::Int => "int32",
            DataType::Long => "int64",
            DataType::Bool => "bool",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TensorId(pub(crate) usize);

impl TensorId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Symbolic tensor flowing between operator nodes. Carries no data.
#[derive(Clone, PartialEq)]
pub struct TensorHandle {
    pub(crate) shape: Array,
    pub(crate) data_type: DataType,
    pub(crate) producer: NodeId,
    pub(crate) name: Option<String>,
}

impl TensorHandle {
    pub(crate) fn new(shape: Array, data_type: DataType, producer: NodeId) -> Self {
        TensorHandle {
            shape,
            data_type,
            producer,
            name: None,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Node that created this tensor. Graph inputs are produced by `Input` nodes.
    pub fn producer(&self) -> NodeId {
        self.producer
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl Debug for TensorHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.data_type, display_comma(&self.shape))
    }
}
