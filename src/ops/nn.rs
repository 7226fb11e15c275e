use crate::error::ConfigError;
use crate::ops::{shape2, OpKind};
use crate::shape::{check_rank, Array, ShapeError};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    Sigmoid,
    Tanh,
    Elu,
    Softmax,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dropout {
    pub rate: f32,
    pub seed: u64,
}

impl Dropout {
    pub fn new(rate: f32) -> Self {
        Dropout { rate, seed: 0 }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.rate) {
            return Err(ConfigError::DropoutRate(self.rate));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    // vocabulary size
    pub input_dim: usize,
    pub output_dim: usize,
    pub input_length: usize,
}

impl Embedding {
    pub fn new(input_dim: usize, output_dim: usize, input_length: usize) -> Self {
        Embedding {
            input_dim,
            output_dim,
            input_length,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let param = if self.input_dim == 0 {
            "input_dim"
        } else if self.output_dim == 0 {
            "output_dim"
        } else if self.input_length == 0 {
            "input_length"
        } else {
            return Ok(());
        };
        Err(ConfigError::Zero {
            kind: OpKind::Embedding,
            param,
        })
    }
}

// [N, L] -> [N, E]; L must be exactly the declared input length
pub fn embedding_shape(emb: &Embedding, x: &[usize]) -> Result<Array, ShapeError> {
    check_rank(x, 2)?;

    if x[1] == 0 {
        return Err(ShapeError::ZeroExtent { axis: 1 });
    }
    if x[1] != emb.input_length {
        return Err(ShapeError::ExtentMismatch {
            axis: 1,
            expected: emb.input_length,
            actual: x[1],
        });
    }
    Ok(shape2(x[0], emb.output_dim))
}
