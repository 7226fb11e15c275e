use crate::error::ConfigError;
use crate::ops::nn::Activation;
use crate::ops::{OpKind, Regularizer};
use crate::shape::{check_nonzero, check_rank, Array, ShapeError, SizedExtent};
use serde::{Deserialize, Serialize};
use smallvec::smallvec;
use tracing::debug;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Padding {
    Valid,
    Same,
    Explicit([usize; 2]),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PoolType {
    Max,
    Avg,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub kernel_size: [usize; 2],
    pub stride: [usize; 2],
    pub padding: Padding,
}

impl Filter {
    pub fn new<E>(kernel_size: E) -> Self
    where
        E: SizedExtent<2>,
    {
        Filter {
            kernel_size: kernel_size.to_arr(),
            stride: [1, 1],
            padding: Padding::Valid,
        }
    }

    fn validate(&self, kind: OpKind) -> Result<(), ConfigError> {
        if self.kernel_size.contains(&0) {
            return Err(ConfigError::Zero {
                kind,
                param: "kernel_size",
            });
        }
        if self.stride.contains(&0) {
            return Err(ConfigError::Zero {
                kind,
                param: "stride",
            });
        }
        Ok(())
    }

    // (H, W) -> resolved (PH, PW)
    fn resolve_padding(&self, size: [usize; 2]) -> [usize; 2] {
        match self.padding {
            Padding::Valid => [0, 0],
            Padding::Explicit(p) => p,
            Padding::Same => same_padding(size, self.kernel_size, self.stride),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conv2d {
    pub filters: usize,
    pub filter: Filter,
    pub dilation: [usize; 2],
    pub groups: usize,
    pub activation: Option<Activation>,
    pub use_bias: bool,
    pub kernel_regularizer: Option<Regularizer>,
    pub bias_regularizer: Option<Regularizer>,
}

impl Conv2d {
    pub fn new<E>(filters: usize, kernel_size: E) -> Self
    where
        E: SizedExtent<2>,
    {
        Conv2d {
            filters,
            filter: Filter::new(kernel_size),
            dilation: [1, 1],
            groups: 1,
            activation: None,
            use_bias: true,
            kernel_regularizer: None,
            bias_regularizer: None,
        }
    }

    pub fn stride<E>(mut self, stride: E) -> Self
    where
        E: SizedExtent<2>,
    {
        self.filter.stride = stride.to_arr();
        self
    }

    pub fn padding(mut self, padding: Padding) -> Self {
        self.filter.padding = padding;
        self
    }

    pub fn dilation<E>(mut self, dilation: E) -> Self
    where
        E: SizedExtent<2>,
    {
        self.dilation = dilation.to_arr();
        self
    }

    pub fn groups(mut self, groups: usize) -> Self {
        self.groups = groups;
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
        let kind = OpKind::Conv2d;
        if self.filters == 0 {
            return Err(ConfigError::Zero {
                kind,
                param: "filters",
            });
        }
        self.filter.validate(kind)?;

        let unsupported = if self.dilation != [1, 1] {
            Some("dilation_rate")
        } else if self.groups != 1 {
            Some("groups")
        } else if self.kernel_regularizer.is_some() {
            Some("kernel_regularizer")
        } else if self.bias_regularizer.is_some() {
            Some("bias_regularizer")
        } else {
            None
        };

        match unsupported {
            Some(param) => Err(ConfigError::Unsupported { kind, param }),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pool2d {
    pub filter: Filter,
    pub pool_type: PoolType,
    pub activation: Option<Activation>,
}

impl Pool2d {
    // stride defaults to the pool size
    pub fn new<E>(pool_type: PoolType, pool_size: E) -> Self
    where
        E: SizedExtent<2>,
    {
        let kernel_size = pool_size.to_arr();
        Pool2d {
            filter: Filter {
                kernel_size,
                stride: kernel_size,
                padding: Padding::Valid,
            },
            pool_type,
            activation: None,
        }
    }

    pub fn max<E>(pool_size: E) -> Self
    where
        E: SizedExtent<2>,
    {
        Self::new(PoolType::Max, pool_size)
    }

    pub fn avg<E>(pool_size: E) -> Self
    where
        E: SizedExtent<2>,
    {
        Self::new(PoolType::Avg, pool_size)
    }

    pub fn stride<E>(mut self, stride: E) -> Self
    where
        E: SizedExtent<2>,
    {
        self.filter.stride = stride.to_arr();
        self
    }

    pub fn padding(mut self, padding: Padding) -> Self {
        self.filter.padding = padding;
        self
    }

    pub fn activation(mut self, activation: Activation) -> Self {
        self.activation = Some(activation);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        self.filter.validate(OpKind::Pool2d)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchNorm {
    pub momentum: f32,
    pub epsilon: f32,
    pub center: bool,
    pub scale: bool,
}

impl Default for BatchNorm {
    fn default() -> Self {
        BatchNorm {
            momentum: 0.99,
            epsilon: 1e-3,
            center: true,
            scale: true,
        }
    }
}

impl BatchNorm {
    pub fn new() -> Self {
        BatchNorm::default()
    }
}

/// Same padding, halved with floor division.
///
/// Odd totals lose one unit of padding instead of padding one side more, so the
/// output may be one element smaller than `ceil(size / stride)` for even
/// kernels or strided windows.
pub fn same_padding(size: [usize; 2], ker: [usize; 2], stride: [usize; 2]) -> [usize; 2] {
    let mut pad = [0; 2];
    for i in 0..2 {
        let rem = size[i] % stride[i];
        let total = if rem == 0 {
            ker[i].saturating_sub(stride[i])
        } else {
            ker[i].saturating_sub(rem)
        };
        pad[i] = total / 2;
    }
    pad
}

fn conv_size(
    size: [usize; 2],
    ker: [usize; 2],
    stride: [usize; 2],
    pad: [usize; 2],
) -> Result<[usize; 2], ShapeError> {
    let mut out = [0; 2];
    for i in 0..2 {
        let padded = pad[i]
            .checked_mul(2)
            .and_then(|p| p.checked_add(size[i]))
            .ok_or(ShapeError::Overflow { axis: i + 2 })?;
        if padded < ker[i] {
            return Err(ShapeError::KernelTooLarge {
                axis: i + 2,
                extent: padded,
                kernel: ker[i],
            });
        }
        out[i] = (padded - ker[i]) / stride[i] + 1;
    }
    Ok(out)
}

// [N, C, H, W] -> ([N, OH, OW], [PH, PW])
fn window_shape(filter: &Filter, x: &[usize]) -> Result<([usize; 3], [usize; 2]), ShapeError> {
    check_rank(x, 4)?;
    check_nonzero(x)?;

    let size = [x[2], x[3]];
    let padding = filter.resolve_padding(size);
    if filter.padding == Padding::Same {
        debug!(?padding, "resolved same padding");
    }

    let [oh, ow] = conv_size(size, filter.kernel_size, filter.stride, padding)?;
    Ok(([x[0], oh, ow], padding))
}

/// [N, C, H, W] -> [N, F, OH, OW], along with the padding actually applied.
pub fn conv_2d_shape(conv: &Conv2d, x: &[usize]) -> Result<(Array, [usize; 2]), ShapeError> {
    let ([n, oh, ow], padding) = window_shape(&conv.filter, x)?;
    Ok((smallvec![n, conv.filters, oh, ow], padding))
}

/// [N, C, H, W] -> [N, C, OH, OW], along with the padding actually applied.
pub fn pool_2d_shape(pool: &Pool2d, x: &[usize]) -> Result<(Array, [usize; 2]), ShapeError> {
    let ([n, oh, ow], padding) = window_shape(&pool.filter, x)?;
    Ok((smallvec![n, x[1], oh, ow], padding))
}

pub fn batch_norm_shape(x: &[usize]) -> Result<Array, ShapeError> {
    check_rank(x, 4)?;
    Ok(x.iter().copied().collect())
}
