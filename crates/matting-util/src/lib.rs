//! Image, trimap and weight file utilities for the matting network.

pub mod image;
pub mod weights;

pub use image::{
    is_extension_supported, is_supported_image_format, ImageError, ImageResult, ImageUtils,
    IMAGENET_MEAN, IMAGENET_STD,
};
pub use weights::*;

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    pub type TestBackend = NdArray;
}
