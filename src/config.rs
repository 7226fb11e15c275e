use crate::error::ConfigError;
use crate::tensor::DataType;
use serde::{Deserialize, Serialize};

/// Build-time settings shared by every node of a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Substituted for a leading `0` extent in input declarations.
    pub batch_size: usize,
    /// Data type of inputs created implicitly, e.g. by `Sequential`.
    pub data_type: DataType,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            batch_size: 64,
            data_type: DataType::Float,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::BatchSize);
        }
        Ok(())
    }
}
