use crate::shape::{Array, ShapeError};
use serde::{Deserialize, Serialize};

// Element-wise binary operations. Operands must agree exactly; nothing is broadcast.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BinaryOperation {
    Add,
    Sub,
    Mul,
}

pub fn binary_shape(x0: &[usize], x1: &[usize]) -> Result<Array, ShapeError> {
    if x0 != x1 {
        return Err(ShapeError::ShapeMismatch(
            x0.iter().copied().collect(),
            x1.iter().copied().collect(),
        ));
    }
    Ok(x0.iter().copied().collect())
}
