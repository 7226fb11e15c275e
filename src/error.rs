use crate::import::ImportError;
use crate::ops::{Arity, OpKind};
use crate::shape::{display_shapes, Array, ShapeError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("shape error in {kind} `{name}` with inputs [{}]: {source}", display_shapes(.inputs))]
    Shape {
        kind: OpKind,
        name: String,
        inputs: Vec<Array>,
        #[source]
        source: ShapeError,
    },

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("import error at line {line}: {source}")]
    Import {
        line: usize,
        #[source]
        source: ImportError,
    },

    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn shape(&self) -> Option<&ShapeError> {
        match self {
            Error::Shape { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn graph(&self) -> Option<&GraphError> {
        match self {
            Error::Graph(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum GraphError {
    #[error("`{0}` is already connected, do not reuse the layer")]
    Reused(String),

    #[error("input node `{0}` cannot consume tensors")]
    ConnectInput(String),

    #[error("{kind} `{name}` expects {expected} inputs but {actual} were given")]
    Arity {
        kind: OpKind,
        name: String,
        expected: Arity,
        actual: usize,
    },

    #[error("`{name}` was given tensor #{tensor} more than once")]
    DuplicateInput { name: String, tensor: usize },

    #[error("unknown node #{0}")]
    UnknownNode(usize),

    #[error("unknown tensor #{0}")]
    UnknownTensor(usize),

    #[error("tensor #{0} is not a graph input")]
    NotAnInput(usize),

    #[error("a model needs at least one input")]
    NoInputs,

    #[error("a model needs at least one output")]
    NoOutputs,

    #[error("output tensor #{tensor} (from `{producer}`) is not reachable from the model inputs")]
    DisconnectedOutput { tensor: usize, producer: String },

    #[error("`{0}` consumes a tensor that does not descend from the model inputs")]
    Unreachable(String),

    #[error("`{0}` is the first layer and must declare an input shape")]
    MissingInputShape(String),

    #[error("`{name}` produces {count} outputs where one was expected")]
    MultipleOutputs { name: String, count: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{kind}: {param} must be larger than 0")]
    Zero { kind: OpKind, param: &'static str },

    #[error("{kind}: {param} is not supported")]
    Unsupported { kind: OpKind, param: &'static str },

    #[error("dropout rate must be in [0, 1), got {0}")]
    DropoutRate(f32),

    #[error("batch size must be larger than 0")]
    BatchSize,
}
