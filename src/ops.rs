pub mod conv;
pub mod core;
pub mod gemm;
pub mod map;
pub mod nn;

use crate::error::ConfigError;
use crate::ops::conv::{BatchNorm, Conv2d, Padding, Pool2d};
use crate::ops::core::{Concat, Split};
use crate::ops::gemm::Dense;
use crate::ops::map::BinaryOperation;
use crate::ops::nn::{Activation, Dropout, Embedding};
use crate::shape::{Array, ShapeError};
use crate::tensor::DataType;
use serde::{Deserialize, Serialize};
use smallvec::smallvec;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Operator kind tag, without parameters.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Input,
    Dense,
    Conv2d,
    Pool2d,
    Flatten,
    Embedding,
    Activation,
    Dropout,
    BatchNorm,
    Concat,
    Split,
    Add,
    Subtract,
    Multiply,
}

impl OpKind {
    pub fn default_name(&self) -> &'static str {
        match self {
            OpKind::Input => "input",
            OpKind::Dense => "dense",
            OpKind::Conv2d => "conv2d",
            OpKind::Pool2d => "pool2d",
            OpKind::Flatten => "flat",
            OpKind::Embedding => "embedding",
            OpKind::Activation => "activation",
            OpKind::Dropout => "dropout",
            OpKind::BatchNorm => "batch_normalization",
            OpKind::Concat => "concatenate",
            OpKind::Split => "split",
            OpKind::Add => "add",
            OpKind::Subtract => "subtract",
            OpKind::Multiply => "multiply",
        }
    }
}

impl Display for OpKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpKind::Input => "InputLayer",
            OpKind::Dense => "Dense",
            OpKind::Conv2d => "Conv2D",
            OpKind::Pool2d => "Pooling2D",
            OpKind::Flatten => "Flatten",
            OpKind::Embedding => "Embedding",
            OpKind::Activation => "Activation",
            OpKind::Dropout => "Dropout",
            OpKind::BatchNorm => "BatchNormalization",
            OpKind::Concat => "Concatenate",
            OpKind::Split => "Split",
            OpKind::Add => "Add",
            OpKind::Subtract => "Subtract",
            OpKind::Multiply => "Multiply",
        };
        write!(f, "{s}")
    }
}

/// Number of input tensors an operator accepts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match *self {
            Arity::Exactly(k) => n == k,
            Arity::AtLeast(k) => n >= k,
        }
    }
}

impl Display for Arity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exactly(k) => write!(f, "exactly {k}"),
            Arity::AtLeast(k) => write!(f, "at least {k}"),
        }
    }
}

// Declared but not implemented by any backend; rejected at node creation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Regularizer {
    L1(f32),
    L2(f32),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Operator {
    Input,
    Dense(Dense),
    Conv2d(Conv2d),
    Pool2d(Pool2d),
    Flatten,
    Embedding(Embedding),
    Activation(Activation),
    Dropout(Dropout),
    BatchNorm(BatchNorm),
    Concat(Concat),
    Split(Split),
    Binary(BinaryOperation),
}

impl Operator {
    pub fn kind(&self) -> OpKind {
        match self {
            Operator::Input => OpKind::Input,
            Operator::Dense(_) => OpKind::Dense,
            Operator::Conv2d(_) => OpKind::Conv2d,
            Operator::Pool2d(_) => OpKind::Pool2d,
            Operator::Flatten => OpKind::Flatten,
            Operator::Embedding(_) => OpKind::Embedding,
            Operator::Activation(_) => OpKind::Activation,
            Operator::Dropout(_) => OpKind::Dropout,
            Operator::BatchNorm(_) => OpKind::BatchNorm,
            Operator::Concat(_) => OpKind::Concat,
            Operator::Split(_) => OpKind::Split,
            Operator::Binary(BinaryOperation::Add) => OpKind::Add,
            Operator::Binary(BinaryOperation::Sub) => OpKind::Subtract,
            Operator::Binary(BinaryOperation::Mul) => OpKind::Multiply,
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Operator::Input => Arity::Exactly(0),
            Operator::Concat(_) => Arity::AtLeast(1),
            Operator::Binary(_) => Arity::Exactly(2),
            _ => Arity::Exactly(1),
        }
    }

    /// Merge operators refuse the same tensor twice.
    pub fn is_merge(&self) -> bool {
        matches!(self, Operator::Concat(_) | Operator::Binary(_))
    }

    pub fn num_outputs(&self) -> usize {
        match self {
            Operator::Split(split) => split.num_parts(),
            _ => 1,
        }
    }

    pub fn output_type(&self, input: DataType) -> DataType {
        match self {
            Operator::Embedding(_) => DataType::Float,
            _ => input,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Operator::Input | Operator::Flatten | Operator::Binary(_) => Ok(()),
            Operator::Activation(_) | Operator::Concat(_) => Ok(()),
            Operator::Dense(dense) => dense.validate(),
            Operator::Conv2d(conv) => conv.validate(),
            Operator::Pool2d(pool) => pool.validate(),
            Operator::Embedding(emb) => emb.validate(),
            Operator::Dropout(dropout) => dropout.validate(),
            Operator::BatchNorm(_) => Ok(()),
            Operator::Split(split) => split.validate(),
        }
    }

    /// Computes output shapes from input shapes. `x` must satisfy `arity()`.
    ///
    /// A `Same` padding is resolved in place into its explicit value, so the
    /// operator handed to a backend always carries concrete padding.
    pub fn infer(&mut self, x: &[&[usize]]) -> Result<Vec<Array>, ShapeError> {
        let y: Array = match self {
            Operator::Input => return Ok(Vec::new()),
            Operator::Dense(dense) => gemm::dense_shape(dense, x[0])?,
            Operator::Conv2d(params) => {
                let (y, padding) = conv::conv_2d_shape(params, x[0])?;
                params.filter.padding = Padding::Explicit(padding);
                y
            }
            Operator::Pool2d(params) => {
                let (y, padding) = conv::pool_2d_shape(params, x[0])?;
                params.filter.padding = Padding::Explicit(padding);
                y
            }
            Operator::BatchNorm(_) => conv::batch_norm_shape(x[0])?,
            Operator::Flatten => self::core::flatten_shape(x[0])?,
            Operator::Concat(concat) => self::core::concat_shape(concat, x)?,
            Operator::Split(split) => return self::core::split_shape(split, x[0]),
            Operator::Embedding(emb) => nn::embedding_shape(emb, x[0])?,
            Operator::Activation(_) | Operator::Dropout(_) => x[0].iter().copied().collect(),
            Operator::Binary(_) => map::binary_shape(x[0], x[1])?,
        };
        Ok(vec![y])
    }
}

pub(crate) fn shape2(b: usize, d: usize) -> Array {
    smallvec![b, d]
}

macro_rules! impl_from_params {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Operator {
            fn from(params: $ty) -> Self {
                Operator::$variant(params)
            }
        }
    };
}

impl_from_params!(Dense, Dense);
impl_from_params!(Conv2d, Conv2d);
impl_from_params!(Pool2d, Pool2d);
impl_from_params!(Embedding, Embedding);
impl_from_params!(Activation, Activation);
impl_from_params!(Dropout, Dropout);
impl_from_params!(BatchNorm, BatchNorm);
impl_from_params!(Concat, Concat);
impl_from_params!(Split, Split);
impl_from_params!(BinaryOperation, Binary);
