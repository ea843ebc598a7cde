//! Additional operations for the Burn deep learning framework
//!
//! Burn exposes a max pool that reports argmax positions but has no inverse.
//! This crate pairs the two so an encoder can hand its pooling indices to the
//! decoder stage that undoes the pool.

mod pool;

#[doc(inline)]
pub use pool::{
    max_pool2d_with_indices, max_unpool2d, MaxPool2dWithIndices, MaxPool2dWithIndicesConfig,
    PoolIndices, UnpoolError, UnpoolResult,
};

#[cfg(test)]
mod tests {
    use burn::backend::{Autodiff, NdArray};

    pub type TestBackend = NdArray;

    pub type TestAutodiffBackend = Autodiff<TestBackend>;
}
