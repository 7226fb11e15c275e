use crate::error::ConfigError;
use crate::ops::nn::Activation;
use crate::ops::{shape2, OpKind, Regularizer};
use crate::shape::{check_rank, Array, ShapeError};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub units: usize,
    // expected input features, when declared up front
    pub in_channels: Option<usize>,
    pub activation: Option<Activation>,
    pub use_bias: bool,
    pub kernel_regularizer: Option<Regularizer>,
    pub bias_regularizer: Option<Regularizer>,
}

impl Dense {
    pub fn new(units: usize) -> Self {
        Dense {
            units,
            in_channels: None,
            activation: None,
            use_bias: true,
            kernel_regularizer: None,
            bias_regularizer: None,
        }
    }

    pub fn in_channels(mut self, in_channels: usize) -> Self {
        self.in_channels = Some(in_channels);
        self
    }

    pub fn activation(mut self, activation: Activation) -> Self {
        self.activation = Some(activation);
        self
    }

    pub fn use_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    pub fn kernel_regularizer(mut self, r: Regularizer) -> Self {
        self.kernel_regularizer = Some(r);
        self
    }

    pub fn bias_regularizer(mut self, r: Regularizer) -> Self {
        self.bias_regularizer = Some(r);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let kind = OpKind::Dense;
        if self.units == 0 {
            return Err(ConfigError::Zero {
                kind,
                param: "units",
            });
        }
        if self.kernel_regularizer.is_some() {
            return Err(ConfigError::Unsupported {
                kind,
                param: "kernel_regularizer",
            });
        }
        if self.bias_regularizer.is_some() {
            return Err(ConfigError::Unsupported {
                kind,
                param: "bias_regularizer",
            });
        }
        Ok(())
    }
}

// [N, IN] -> [N, OUT]
pub fn dense_shape(dense: &Dense, x: &[usize]) -> Result<Array, ShapeError> {
    check_rank(x, 2)?;

    let in_dim = x[1];
    if in_dim == 0 {
        return Err(ShapeError::ZeroExtent { axis: 1 });
    }

    if let Some(expected) = dense.in_channels {
        if expected != in_dim {
            return Err(ShapeError::ExtentMismatch {
                axis: 1,
                expected,
                actual: in_dim,
            });
        }
    }

    Ok(shape2(x[0], dense.units))
}
