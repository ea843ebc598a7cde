//! # Matting Train
//!
//! Training data for the matting network: foregrounds composited over
//! backgrounds with their alpha mattes, random trimaps grown from the mattes,
//! augmentation, and a Burn batcher producing [`matting_model::MattingBatch`]es.

pub mod augmentation;
pub mod composition;
pub mod dataset;
pub mod error;

// Re-export commonly used types
pub use augmentation::{AugmentationConfig, AugmentationMethod, CompositeSample, MattingAugmentor};
pub use composition::{composite, fit_background, generate_trimap, BackgroundPlacement};
pub use dataset::{DatasetSplit, MattingBatcher, MattingDataset, MattingDatasetConfig, MattingItem};
pub use error::{DatasetError, DatasetResult};

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    pub type TestBackend = NdArray;
}
