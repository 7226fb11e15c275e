//! Reader for the line-oriented model description format.
//!
//! Each non-empty line is one record:
//!
//! ```text
//! name, pred1:pred2:..., op_code, fields...
//! ```
//!
//! Predecessors are names of earlier records; the literal `input` consumes the
//! next unused graph input. An `OUTPUT` record collects its predecessors as the
//! model outputs.

use crate::error::Error;
use crate::graph::Graph;
use crate::ops::conv::{BatchNorm, Conv2d, Padding, Pool2d, PoolType};
use crate::ops::core::Concat;
use crate::ops::gemm::Dense;
use crate::ops::map::BinaryOperation;
use crate::ops::nn::{Activation, Dropout};
use crate::ops::{Arity, Operator};
use crate::tensor::TensorId;
use itertools::Itertools;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

// operator codes
const CONV2D: u32 = 2011;
const POOL2D: u32 = 2013;
const LINEAR: u32 = 2014;
const CONCAT: u32 = 2016;
const FLAT: u32 = 2017;
const BATCH_NORM: u32 = 2021;
const RELU: u32 = 2022;
const SIGMOID: u32 = 2023;
const TANH: u32 = 2024;
const ELU: u32 = 2025;
const DROPOUT: u32 = 2026;
const ADD: u32 = 2041;
const SUBTRACT: u32 = 2042;
const MULTIPLY: u32 = 2043;
const OUTPUT: u32 = 2050;

// activation codes
const AC_NONE: u32 = 10;
const AC_RELU: u32 = 11;
const AC_SIGMOID: u32 = 12;
const AC_TANH: u32 = 13;
const AC_ELU: u32 = 14;

// pool codes
const POOL_MAX: u32 = 30;
const POOL_AVG: u32 = 31;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImportError {
    #[error("a record needs at least 3 fields, found {0}")]
    TooFewFields(usize),

    #[error("unknown operator code {0}")]
    UnknownOpCode(u32),

    #[error("operator code {code} expects {expected} fields, found {actual}")]
    FieldCount {
        code: u32,
        expected: usize,
        actual: usize,
    },

    #[error("operator code {code} expects {expected} predecessors, found {actual}")]
    PredecessorCount {
        code: u32,
        expected: Arity,
        actual: usize,
    },

    #[error("field {index} has invalid value `{value}`")]
    InvalidField { index: usize, value: String },

    #[error("unknown activation code {0}")]
    UnknownActivation(u32),

    #[error("unknown pool type code {0}")]
    UnknownPoolType(u32),

    #[error("predecessor `{0}` is not defined by an earlier record")]
    UnknownPredecessor(String),

    #[error("record `{0}` is defined twice")]
    DuplicateName(String),

    #[error("`{0}` asks for a graph input but all inputs are consumed")]
    InputsExhausted(String),
}

/// Result of an import: the tensors produced by every record, by name.
#[derive(Debug, Clone, Default)]
pub struct Imported {
    pub tensors: HashMap<String, Vec<TensorId>>,
    pub outputs: Vec<TensorId>,
}

struct Record<'a> {
    name: &'a str,
    preds: Vec<&'a str>,
    code: u32,
    items: Vec<&'a str>,
}

impl<'a> Record<'a> {
    fn parse(line: &'a str) -> Result<Self, ImportError> {
        let items = line.split(',').map(str::trim).collect_vec();
        if items.len() < 3 {
            return Err(ImportError::TooFewFields(items.len()));
        }

        let preds = items[1]
            .split(':')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect_vec();

        let mut record = Record {
            name: items[0],
            preds,
            code: 0,
            items,
        };
        record.code = record.field(2)?;
        Ok(record)
    }

    fn field<T>(&self, index: usize) -> Result<T, ImportError>
    where
        T: FromStr,
    {
        let value = self.items[index];
        value.parse().map_err(|_| ImportError::InvalidField {
            index,
            value: value.to_string(),
        })
    }

    fn flag(&self, index: usize) -> Result<bool, ImportError> {
        Ok(self.field::<u8>(index)? != 0)
    }

    fn activation(&self, index: usize) -> Result<Option<Activation>, ImportError> {
        match self.field::<u32>(index)? {
            AC_NONE => Ok(None),
            AC_RELU => Ok(Some(Activation::Relu)),
            AC_SIGMOID => Ok(Some(Activation::Sigmoid)),
            AC_TANH => Ok(Some(Activation::Tanh)),
            AC_ELU => Ok(Some(Activation::Elu)),
            code => Err(ImportError::UnknownActivation(code)),
        }
    }

    fn expect_fields(&self, expected: usize) -> Result<(), ImportError> {
        if self.items.len() != expected {
            return Err(ImportError::FieldCount {
                code: self.code,
                expected,
                actual: self.items.len(),
            });
        }
        Ok(())
    }

    // Operator with the predecessor count the record format allows for it.
    fn operator(&self) -> Result<(Operator, Arity), ImportError> {
        let single = Arity::Exactly(1);

        let op = match self.code {
            LINEAR => {
                self.expect_fields(6)?;
                let mut dense = Dense::new(self.field(3)?).use_bias(self.flag(5)?);
                dense.activation = self.activation(4)?;
                (dense.into(), single)
            }
            CONV2D => {
                self.expect_fields(12)?;
                let kernel: [usize; 2] = [self.field(4)?, self.field(5)?];
                let stride: [usize; 2] = [self.field(6)?, self.field(7)?];
                let padding: [usize; 2] = [self.field(8)?, self.field(9)?];
                let mut conv = Conv2d::new(self.field(3)?, kernel)
                    .stride(stride)
                    .padding(Padding::Explicit(padding))
                    .use_bias(self.flag(11)?);
                conv.activation = self.activation(10)?;
                (conv.into(), single)
            }
            POOL2D => {
                self.expect_fields(8)?;
                let pool_type = match self.field::<u32>(6)? {
                    POOL_MAX => PoolType::Max,
                    POOL_AVG => PoolType::Avg,
                    code => return Err(ImportError::UnknownPoolType(code)),
                };
                let kernel: usize = self.field(3)?;
                let stride: usize = self.field(4)?;
                let padding: usize = self.field(5)?;
                let mut pool = Pool2d::new(pool_type, kernel)
                    .stride(stride)
                    .padding(Padding::Explicit([padding, padding]));
                pool.activation = self.activation(7)?;
                (pool.into(), single)
            }
            DROPOUT => {
                self.expect_fields(4)?;
                (Dropout::new(self.field(3)?).into(), single)
            }
            FLAT => {
                self.expect_fields(3)?;
                (Operator::Flatten, single)
            }
            RELU | SIGMOID | TANH | ELU => {
                self.expect_fields(3)?;
                let activation = match self.code {
                    RELU => Activation::Relu,
                    SIGMOID => Activation::Sigmoid,
                    TANH => Activation::Tanh,
                    _ => Activation::Elu,
                };
                (activation.into(), single)
            }
            BATCH_NORM => {
                self.expect_fields(3)?;
                (BatchNorm::new().into(), single)
            }
            CONCAT => {
                self.expect_fields(4)?;
                (Concat::new(self.field(3)?).into(), Arity::AtLeast(2))
            }
            ADD | SUBTRACT | MULTIPLY => {
                self.expect_fields(3)?;
                let op = match self.code {
                    ADD => BinaryOperation::Add,
                    SUBTRACT => BinaryOperation::Sub,
                    _ => BinaryOperation::Mul,
                };
                (op.into(), Arity::Exactly(2))
            }
            code => return Err(ImportError::UnknownOpCode(code)),
        };
        Ok(op)
    }
}

struct Importer<'a> {
    inputs: &'a [TensorId],
    next_input: usize,
    imported: Imported,
}

impl<'a> Importer<'a> {
    fn resolve(&mut self, record: &Record) -> Result<Vec<TensorId>, ImportError> {
        let mut x = Vec::with_capacity(record.preds.len());
        for &pred in record.preds.iter() {
            if pred == "input" {
                let t = self
                    .inputs
                    .get(self.next_input)
                    .ok_or_else(|| ImportError::InputsExhausted(record.name.to_string()))?;
                self.next_input += 1;
                x.push(*t);
            } else {
                let tensors = self
                    .imported
                    .tensors
                    .get(pred)
                    .ok_or_else(|| ImportError::UnknownPredecessor(pred.to_string()))?;
                x.extend(tensors.iter().copied());
            }
        }
        Ok(x)
    }

    fn record(&mut self, g: &mut Graph, line: usize, text: &str) -> Result<(), Error> {
        let at = |source| Error::Import { line, source };

        let record = Record::parse(text).map_err(at)?;
        if self.imported.tensors.contains_key(record.name) {
            return Err(at(ImportError::DuplicateName(record.name.to_string())));
        }

        if record.code == OUTPUT {
            let outputs = self.resolve(&record).map_err(at)?;
            self.imported.outputs = outputs.clone();
            self.imported
                .tensors
                .insert(record.name.to_string(), outputs);
            return Ok(());
        }

        let (op, arity) = record.operator().map_err(at)?;
        if !arity.accepts(record.preds.len()) {
            return Err(at(ImportError::PredecessorCount {
                code: record.code,
                expected: arity,
                actual: record.preds.len(),
            }));
        }

        let x = self.resolve(&record).map_err(at)?;
        let y = g.apply_named(op, record.name, &x)?;

        debug!("line {line}: imported `{}` ({})", record.name, record.code);
        self.imported.tensors.insert(record.name.to_string(), y);
        Ok(())
    }
}

/// Builds the described operators into `g`, consuming `inputs` in order
/// wherever a record names the predecessor `input`.
///
/// Description errors are reported with their 1-based line. Shape and graph
/// errors raised while connecting a record are returned as they are; they
/// carry the record name as node name.
pub fn import_model(g: &mut Graph, inputs: &[TensorId], text: &str) -> Result<Imported, Error> {
    let mut importer = Importer {
        inputs,
        next_input: 0,
        imported: Imported::default(),
    };

    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        importer.record(g, i + 1, line)?;
    }

    Ok(importer.imported)
}
