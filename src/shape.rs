use itertools::Itertools;
use smallvec::SmallVec;
use thiserror::Error;

pub type Array = SmallVec<[usize; 5]>;

pub fn display_comma(arr: &[usize]) -> String {
    arr.iter().map(|s| s.to_string()).join(", ")
}

pub fn display_shapes(shapes: &[Array]) -> String {
    shapes
        .iter()
        .map(|s| format!("({})", display_comma(s)))
        .join(", ")
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ShapeError {
    #[error("expected a rank-{} tensor but got rank {}", .expected, .actual)]
    RankMismatch { expected: usize, actual: usize },

    #[error("expected a tensor of rank at least {} but got rank {}", .min, .actual)]
    InsufficientRank { min: usize, actual: usize },

    #[error("extent of axis {} must be larger than 0", .axis)]
    ZeroExtent { axis: usize },

    #[error("extent mismatch on axis {}! expected {} but got {}.", .axis, .expected, .actual)]
    ExtentMismatch {
        axis: usize,
        expected: usize,
        actual: usize,
    },

    #[error("shape mismatch between ({}) and ({})", display_comma(.0), display_comma(.1))]
    ShapeMismatch(Array, Array),

    #[error("kernel {} does not fit axis {} of padded extent {}", .kernel, .axis, .extent)]
    KernelTooLarge {
        axis: usize,
        extent: usize,
        kernel: usize,
    },

    #[error("extent {} of axis {} is not divisible into {} parts", .extent, .axis, .parts)]
    NonDivisible {
        axis: usize,
        extent: usize,
        parts: usize,
    },

    #[error("index out of range, expected index in range of {}..{}, but {} is given.", .low, .high, .index)]
    OutOfBounds {
        index: isize,
        low: isize,
        high: isize,
    },

    #[error("extent of axis {} overflows", .axis)]
    Overflow { axis: usize },

    #[error("invalid index bound")]
    InvalidBound,
}

pub fn check_rank(x: &[usize], rank: usize) -> Result<(), ShapeError> {
    if x.len() != rank {
        return Err(ShapeError::RankMismatch {
            expected: rank,
            actual: x.len(),
        });
    }
    Ok(())
}

pub fn check_nonzero(x: &[usize]) -> Result<(), ShapeError> {
    match x.iter().position(|&e| e == 0) {
        Some(axis) => Err(ShapeError::ZeroExtent { axis }),
        None => Ok(()),
    }
}

// Replaces the leading (batch) extent.
pub fn rebatch(x: &mut Array, batch_size: usize) {
    if let Some(b) = x.first_mut() {
        *b = batch_size;
    }
}

pub trait SizedExtent<const N: usize> {
    fn to_arr(&self) -> [usize; N];
}

/// Maps a possibly negative axis onto `0..rank`.
pub fn normalize_axis(axis: isize, rank: usize) -> Result<usize, ShapeError> {
    if rank < 1 {
        return Err(ShapeError::InvalidBound);
    }
    let resolved = if axis < 0 { axis + rank as isize } else { axis };

    if (0..rank as isize).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(ShapeError::OutOfBounds {
            index: axis,
            low: -(rank as isize),
            high: rank as isize - 1,
        })
    }
}

impl<const N: usize> SizedExtent<N> for usize {
    fn to_arr(&self) -> [usize; N] {
        [*self; N]
    }
}

impl<const N: usize> SizedExtent<N> for [usize; N] {
    fn to_arr(&self) -> [usize; N] {
        *self
    }
}
