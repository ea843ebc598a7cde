//! # Max Pooling With Indices
//!
//! Max pooling that keeps the flat argmax position of every window, and the
//! matching unpool that puts pooled values back to those positions.
//!
//! Indices follow the usual convention: for each `(batch, channel)` plane the
//! index of a value at row `ih`, column `iw` is `ih * W + iw`, where `W` is the
//! width of the pre-pool plane.

use burn::{prelude::*, tensor::BasicOps};
use thiserror::Error;

/// Errors raised when a pooled tensor cannot be inverted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnpoolError {
    /// The tensor to unpool and the recorded index map differ in shape.
    #[error("unpool input {input:?} does not match index map {indices:?}")]
    IndexShapeMismatch {
        /// Shape of the tensor passed to the unpool.
        input: [usize; 4],
        /// Shape of the recorded index map.
        indices: [usize; 4],
    },

    /// The recorded pre-pool size cannot hold every pooled window.
    #[error("output size {output:?} cannot hold {pooled:?} windows of size {kernel:?}")]
    OutputTooSmall {
        /// Recorded pre-pool spatial size.
        output: [usize; 2],
        /// Pooled spatial size.
        pooled: [usize; 2],
        /// Pooling window.
        kernel: [usize; 2],
    },
}

/// A specialized `Result` type for unpool operations.
pub type UnpoolResult<T> = Result<T, UnpoolError>;

/// Argmax positions recorded by one max pool.
///
/// Only the unpool matching the pool that produced it should consume this.
#[derive(Debug, Clone)]
pub struct PoolIndices<B: Backend> {
    indices: Tensor<B, 4, Int>,
    input_size: [usize; 2],
    kernel_size: [usize; 2],
}

impl<B: Backend> PoolIndices<B> {
    /// Wraps an index map produced by a pool over a `input_size` plane.
    pub const fn new(
        indices: Tensor<B, 4, Int>,
        input_size: [usize; 2],
        kernel_size: [usize; 2],
    ) -> Self {
        Self {
            indices,
            input_size,
            kernel_size,
        }
    }

    /// The flat argmax index map, shape `[batch, channels, pooled_h, pooled_w]`.
    pub const fn indices(&self) -> &Tensor<B, 4, Int> {
        &self.indices
    }

    /// Spatial size `[height, width]` of the tensor before pooling.
    pub const fn input_size(&self) -> [usize; 2] {
        self.input_size
    }

    /// Window size `[kh, kw]` of the pool, which is also its stride.
    pub const fn kernel_size(&self) -> [usize; 2] {
        self.kernel_size
    }

    /// Shape of the index map.
    pub fn dims(&self) -> [usize; 4] {
        self.indices.dims()
    }
}

/// Configuration for [`MaxPool2dWithIndices`].
#[derive(Config, Debug)]
pub struct MaxPool2dWithIndicesConfig {
    /// Window size; the stride always equals the window.
    #[config(default = "[2, 2]")]
    pub kernel_size: [usize; 2],
}

impl MaxPool2dWithIndicesConfig {
    /// Initializes a new [`MaxPool2dWithIndices`] module.
    pub fn init(&self) -> MaxPool2dWithIndices {
        assert!(
            self.kernel_size.iter().all(|&k| k > 0),
            "Kernel size must be positive, got {:?}",
            self.kernel_size
        );
        MaxPool2dWithIndices {
            kernel_size: self.kernel_size,
        }
    }
}

/// Non-overlapping max pool returning the pooled tensor and its [`PoolIndices`].
#[derive(Module, Clone, Debug)]
pub struct MaxPool2dWithIndices {
    kernel_size: [usize; 2],
}

impl MaxPool2dWithIndices {
    /// # Shapes
    /// - input: `[batch, channels, height, width]`
    /// - output: `[batch, channels, height / kh, width / kw]` plus indices of the same shape
    pub fn forward<B: Backend>(&self, input: Tensor<B, 4>) -> (Tensor<B, 4>, PoolIndices<B>) {
        max_pool2d_with_indices(input, self.kernel_size)
    }
}

/// Max pool with stride equal to `kernel_size` and no padding.
///
/// Trailing rows or columns that do not fill a whole window are dropped, as
/// with floor-mode pooling.
pub fn max_pool2d_with_indices<B: Backend>(
    input: Tensor<B, 4>,
    kernel_size: [usize; 2],
) -> (Tensor<B, 4>, PoolIndices<B>) {
    let [_, _, height, width] = input.dims();
    let (pooled, indices) = burn::tensor::module::max_pool2d_with_indices(
        input,
        kernel_size,
        kernel_size,
        [0, 0],
        [1, 1],
    );

    (
        pooled,
        PoolIndices::new(indices, [height, width], kernel_size),
    )
}

/// Inverts a max pool: every value of `input` is written to the position its
/// index map recorded, all other positions are zero.
///
/// # Shapes
/// - input: `[batch, channels, pooled_h, pooled_w]`
/// - output: `[batch, channels, height, width]` with `[height, width]` the recorded pre-pool size
///
/// # Errors
///
/// Returns [`UnpoolError`] when `input` does not have the shape of the index
/// map, or when the recorded output size is smaller than the pooled windows.
pub fn max_unpool2d<B: Backend>(
    input: Tensor<B, 4>,
    indices: &PoolIndices<B>,
) -> UnpoolResult<Tensor<B, 4>> {
    let input_dims = input.dims();
    let index_dims = indices.dims();
    if input_dims != index_dims {
        return Err(UnpoolError::IndexShapeMismatch {
            input: input_dims,
            indices: index_dims,
        });
    }

    let [batch, channels, pooled_h, pooled_w] = input_dims;
    let [out_h, out_w] = indices.input_size;
    let [kernel_h, kernel_w] = indices.kernel_size;
    if out_h < pooled_h * kernel_h || out_w < pooled_w * kernel_w {
        return Err(UnpoolError::OutputTooSmall {
            output: indices.input_size,
            pooled: [pooled_h, pooled_w],
            kernel: indices.kernel_size,
        });
    }

    let device = input.device();
    let (covered_h, covered_w) = (pooled_h * kernel_h, pooled_w * kernel_w);

    // Each pooled value is repeated over its window and kept where the window
    // position equals the recorded index.
    let spread = spread_windows(input, indices.kernel_size);
    let spread_indices = spread_windows(indices.indices.clone(), indices.kernel_size);

    let rows = Tensor::<B, 1, Int>::arange(0..covered_h as i64, &device)
        .mul_scalar(out_w as i64)
        .reshape([covered_h, 1])
        .repeat_dim(1, covered_w);
    let cols = Tensor::<B, 1, Int>::arange(0..covered_w as i64, &device)
        .reshape([1, covered_w])
        .repeat_dim(0, covered_h);
    let positions = (rows + cols)
        .reshape([1, 1, covered_h, covered_w])
        .repeat_dim(0, batch)
        .repeat_dim(1, channels);

    let mut output = spread.mask_fill(spread_indices.equal(positions).bool_not(), 0.0);

    // Rows and columns dropped by a floor-mode pool come back as zeros.
    if out_h > covered_h {
        let filler = Tensor::zeros([batch, channels, out_h - covered_h, covered_w], &device);
        output = Tensor::cat(vec![output, filler], 2);
    }
    if out_w > covered_w {
        let filler = Tensor::zeros([batch, channels, out_h, out_w - covered_w], &device);
        output = Tensor::cat(vec![output, filler], 3);
    }

    Ok(output)
}

/// Repeats every element over a `kernel_size` window.
fn spread_windows<B: Backend, K: BasicOps<B>>(
    tensor: Tensor<B, 4, K>,
    [kernel_h, kernel_w]: [usize; 2],
) -> Tensor<B, 4, K> {
    let [batch, channels, height, width] = tensor.dims();
    tensor
        .reshape([batch, channels, height, 1, width, 1])
        .repeat_dim(3, kernel_h)
        .repeat_dim(5, kernel_w)
        .reshape([batch, channels, height * kernel_h, width * kernel_w])
}
