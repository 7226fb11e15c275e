use crate::error::ConfigError;
use crate::ops::{shape2, OpKind};
use crate::shape::{normalize_axis, Array, ShapeError};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Concat {
    pub axis: isize,
}

impl Concat {
    pub fn new(axis: isize) -> Self {
        Concat { axis }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Sections {
    // equal pieces
    Parts(usize),
    Sizes(Array),
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub sections: Sections,
    pub axis: isize,
}

impl Split {
    pub fn even(parts: usize, axis: isize) -> Self {
        Split {
            sections: Sections::Parts(parts),
            axis,
        }
    }

    pub fn sizes<I>(sizes: I, axis: isize) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        Split {
            sections: Sections::Sizes(sizes.into_iter().collect()),
            axis,
        }
    }

    pub fn num_parts(&self) -> usize {
        match &self.sections {
            Sections::Parts(n) => *n,
            Sections::Sizes(sizes) => sizes.len(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let degenerate = match &self.sections {
            Sections::Parts(n) => *n == 0,
            Sections::Sizes(sizes) => sizes.is_empty() || sizes.contains(&0),
        };
        if degenerate {
            return Err(ConfigError::Zero {
                kind: OpKind::Split,
                param: "sections",
            });
        }
        Ok(())
    }
}

// [N, D1, D2, ...] -> [N, D1 * D2 * ...]
pub fn flatten_shape(x: &[usize]) -> Result<Array, ShapeError> {
    if x.len() < 2 {
        return Err(ShapeError::InsufficientRank {
            min: 2,
            actual: x.len(),
        });
    }
    let size = x
        .iter()
        .enumerate()
        .skip(1)
        .try_fold(1_usize, |acc, (axis, &e)| {
            acc.checked_mul(e).ok_or(ShapeError::Overflow { axis })
        })?;
    Ok(shape2(x[0], size))
}

pub fn concat_shape(concat: &Concat, x: &[&[usize]]) -> Result<Array, ShapeError> {
    let first = x[0];
    let axis = normalize_axis(concat.axis, first.len())?;

    let mut concat_size = first[axis];

    for v in x.iter().skip(1) {
        if v.len() != first.len() {
            return Err(ShapeError::RankMismatch {
                expected: first.len(),
                actual: v.len(),
            });
        }

        let mismatch = first
            .iter()
            .zip(v.iter())
            .enumerate()
            .find(|&(i, (a, b))| i != axis && a != b);

        if let Some((i, (&expected, &actual))) = mismatch {
            return Err(ShapeError::ExtentMismatch {
                axis: i,
                expected,
                actual,
            });
        }
        concat_size = concat_size
            .checked_add(v[axis])
            .ok_or(ShapeError::Overflow { axis })?;
    }

    let mut extents: Array = first.iter().copied().collect();
    extents[axis] = concat_size;
    Ok(extents)
}

pub fn split_shape(split: &Split, x: &[usize]) -> Result<Vec<Array>, ShapeError> {
    let axis = normalize_axis(split.axis, x.len())?;
    let extent = x[axis];

    let sizes: Array = match &split.sections {
        Sections::Parts(parts) => {
            if extent % parts != 0 {
                return Err(ShapeError::NonDivisible {
                    axis,
                    extent,
                    parts: *parts,
                });
            }
            (0..*parts).map(|_| extent / parts).collect()
        }
        Sections::Sizes(sizes) => {
            let total = sizes
                .iter()
                .try_fold(0_usize, |acc, &s| acc.checked_add(s))
                .ok_or(ShapeError::Overflow { axis })?;
            if total != extent {
                return Err(ShapeError::ExtentMismatch {
                    axis,
                    expected: extent,
                    actual: total,
                });
            }
            sizes.clone()
        }
    };

    Ok(sizes
        .iter()
        .map(|&size| {
            let mut y: Array = x.iter().copied().collect();
            y[axis] = size;
            y
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use crate::ops::core::{concat_shape, flatten_shape, split_shape, Concat, Split};
    use crate::shape::ShapeError;

    #[test]
    fn test_flatten() {
        assert_eq!(
            flatten_shape(&[8, 16, 5, 5]).unwrap().to_vec(),
            vec![8, 400]
        );
        assert_eq!(flatten_shape(&[8, 10]).unwrap().to_vec(), vec![8, 10]);
        assert_eq!(
            flatten_shape(&[8]).expect_err(""),
            ShapeError::InsufficientRank { min: 2, actual: 1 }
        );
    }

    #[test]
    fn test_extent_overflow() {
        assert_eq!(
            flatten_shape(&[2, 1 << 32, 1 << 32]).expect_err(""),
            ShapeError::Overflow { axis: 2 }
        );
        assert_eq!(
            concat_shape(&Concat::new(1), &[&[2, usize::MAX], &[2, 1]]).expect_err(""),
            ShapeError::Overflow { axis: 1 }
        );
        assert_eq!(
            split_shape(&Split::sizes([usize::MAX, 2], 1), &[2, 8]).expect_err(""),
            ShapeError::Overflow { axis: 1 }
        );
    }

    #[test]
    fn test_concat() {
        let y = concat_shape(&Concat::new(1), &[&[4, 6, 8, 8], &[4, 10, 8, 8]]).unwrap();
        assert_eq!(y.to_vec(), vec![4, 16, 8, 8]);

        // negative axes count from the back
        let y = concat_shape(&Concat::new(-1), &[&[4, 6], &[4, 2], &[4, 1]]).unwrap();
        assert_eq!(y.to_vec(), vec![4, 9]);

        let y = concat_shape(&Concat::new(1), &[&[4, 6]]).unwrap();
        assert_eq!(y.to_vec(), vec![4, 6]);
    }

    #[test]
    fn test_concat_mismatch() {
        assert_eq!(
            concat_shape(&Concat::new(1), &[&[4, 6, 8, 8], &[4, 10, 7, 8]]).expect_err(""),
            ShapeError::ExtentMismatch {
                axis: 2,
                expected: 8,
                actual: 7
            }
        );
        assert_eq!(
            concat_shape(&Concat::new(1), &[&[4, 6, 8, 8], &[4, 6]]).expect_err(""),
            ShapeError::RankMismatch {
                expected: 4,
                actual: 2
            }
        );
        assert!(matches!(
            concat_shape(&Concat::new(4), &[&[4, 6, 8, 8], &[4, 6, 8, 8]]),
            Err(ShapeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_split() {
        let y = split_shape(&Split::even(3, 1), &[4, 12, 8]).unwrap();
        assert_eq!(y.len(), 3);
        assert!(y.iter().all(|s| s.to_vec() == vec![4, 4, 8]));

        let y = split_shape(&Split::sizes([2, 6], -1), &[4, 8]).unwrap();
        assert_eq!(y[0].to_vec(), vec![4, 2]);
        assert_eq!(y[1].to_vec(), vec![4, 6]);
    }

    #[test]
    fn test_split_err() {
        assert_eq!(
            split_shape(&Split::even(5, 1), &[4, 12]).expect_err(""),
            ShapeError::NonDivisible {
                axis: 1,
                extent: 12,
                parts: 5
            }
        );
        assert_eq!(
            split_shape(&Split::sizes([2, 3], 1), &[4, 12]).expect_err(""),
            ShapeError::ExtentMismatch {
                axis: 1,
                expected: 12,
                actual: 5
            }
        );
    }
}
