//! Conversions between images on disk and the tensors the matting network consumes.

use std::path::Path;

use burn::tensor::{backend::Backend, DType, Int, Tensor, TensorData};
use image::{
    buffer::ConvertBuffer, DynamicImage, GenericImageView, GrayImage, ImageBuffer, Luma, Rgb, Rgba,
};
use matting_model::{trimap_from_classes, TrimapClass};
use thiserror::Error;

/// Per-channel mean of the ImageNet training set.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation of the ImageNet training set.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Image extensions accepted by the file-walking entry points.
const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// ImageError covers all possible errors in image processing operations
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to open image at '{path}': {source}")]
    ImageLoadError {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to convert tensor to data: {reason}")]
    TensorConversionError { reason: String },

    #[error("failed to create image buffer: {reason}")]
    BufferCreationError { reason: String },

    #[error("batch size mismatch: expected 1, got {actual}")]
    InvalidBatchSize { actual: usize },

    #[error("unsupported image format: is_mask={is_mask}, channels={channels}. Expected: (true, 1), (false, 3), or (false, 4)")]
    UnsupportedImageFormat { is_mask: bool, channels: usize },

    #[error("shape mismatch between {what}: {left:?} vs {right:?}")]
    ShapeMismatch {
        what: &'static str,
        left: [usize; 4],
        right: [usize; 4],
    },

    #[error("invalid channel count for {what}: expected {expected}, got {actual}")]
    InvalidChannels {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Result type alias for ImageError
pub type ImageResult<T> = Result<T, ImageError>;

/// Image processing utilities
pub struct ImageUtils;

impl ImageUtils {
    /// Open an image file.
    pub fn open<P: AsRef<Path>>(path: P) -> ImageResult<DynamicImage> {
        image::open(&path).map_err(|source| ImageError::ImageLoadError {
            path: path.as_ref().display().to_string(),
            source,
        })
    }

    /// Load image from file and convert to tensor
    ///
    /// # Returns
    /// Tensor of shape [1, 3, height, width] with values in range [0, 1]
    pub fn load_image<B: Backend, P: AsRef<Path>>(
        path: P,
        device: &B::Device,
    ) -> ImageResult<Tensor<B, 4>> {
        Ok(Self::dynamic_image_to_tensor(Self::open(path)?, device))
    }

    /// Convert an image to an RGB tensor `[1, 3, height, width]` in [0, 1].
    pub fn dynamic_image_to_tensor<B: Backend>(
        img: DynamicImage,
        device: &B::Device,
    ) -> Tensor<B, 4> {
        let (width, height) = img.dimensions();
        let buf = img.into_rgb32f().into_raw();

        let data = TensorData::new(buf, [height as usize, width as usize, 3]);
        let tensor = Tensor::<B, 3>::from_data(data.convert::<B::FloatElem>(), device);

        tensor.permute([2, 0, 1]).unsqueeze::<4>()
    }

    /// Convert tensor to DynamicImage
    ///
    /// # Arguments
    /// * `tensor` - Tensor of shape [1, channels, height, width] with values in [0, 1]
    /// * `is_mask` - Whether the tensor is a mask (single channel)
    pub fn tensor_to_dynamic_image<B: Backend>(
        tensor: Tensor<B, 4>,
        is_mask: bool,
    ) -> ImageResult<DynamicImage> {
        let [batch, channels, height, width] = tensor.dims();

        if batch != 1 {
            return Err(ImageError::InvalidBatchSize { actual: batch });
        }

        match (is_mask, channels) {
            (true, 1) | (false, 3 | 4) => {}
            _ => {
                return Err(ImageError::UnsupportedImageFormat { is_mask, channels });
            }
        }

        let tensor = tensor.squeeze::<3>(0).permute([1, 2, 0]);

        let data = tensor
            .into_data()
            .convert_dtype(DType::F32)
            .to_vec::<f32>()
            .map_err(|e| ImageError::TensorConversionError {
                reason: format!("{e:?}"),
            })?;

        let (width, height) = (width as u32, height as u32);
        let img = match channels {
            1 => {
                let buffer = ImageBuffer::<Luma<f32>, _>::from_raw(width, height, data)
                    .ok_or_else(|| ImageError::BufferCreationError {
                        reason: "grayscale f32 image buffer".to_owned(),
                    })?;
                let u8_buffer: ImageBuffer<Luma<u8>, Vec<u8>> = buffer.convert();
                DynamicImage::ImageLuma8(u8_buffer)
            }
            3 => {
                let buffer = ImageBuffer::<Rgb<f32>, _>::from_raw(width, height, data)
                    .ok_or_else(|| ImageError::BufferCreationError {
                        reason: "RGB f32 image buffer".to_owned(),
                    })?;
                DynamicImage::ImageRgb8(buffer.convert())
            }
            _ => {
                let buffer = ImageBuffer::<Rgba<f32>, _>::from_raw(width, height, data)
                    .ok_or_else(|| ImageError::BufferCreationError {
                        reason: "RGBA f32 image buffer".to_owned(),
                    })?;
                DynamicImage::ImageRgba8(buffer.convert())
            }
        };

        Ok(img)
    }

    /// Normalize an RGB tensor in [0, 1] with the ImageNet statistics.
    ///
    /// # Shapes
    /// - image: `[batch, 3, height, width]`
    pub fn apply_imagenet_normalization<B: Backend>(
        image: Tensor<B, 4>,
    ) -> ImageResult<Tensor<B, 4>> {
        let channels = image.dims()[1];
        if channels != 3 {
            return Err(ImageError::InvalidChannels {
                what: "image",
                expected: 3,
                actual: channels,
            });
        }

        let device = image.device();
        let mean = Tensor::<B, 1>::from_floats(IMAGENET_MEAN, &device).reshape([1, 3, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(IMAGENET_STD, &device).reshape([1, 3, 1, 1]);

        Ok((image - mean) / std)
    }

    /// One-hot trimap `[1, 3, height, width]` from a greyscale trimap image.
    ///
    /// Pure black is background, pure white is foreground, every other grey
    /// level is unknown.
    pub fn trimap_to_tensor<B: Backend>(trimap: &GrayImage, device: &B::Device) -> Tensor<B, 4> {
        let (width, height) = trimap.dimensions();
        let classes: Vec<i64> = trimap
            .pixels()
            .map(|Luma([value])| TrimapClass::from_luma(*value).index() as i64)
            .collect();

        let classes = Tensor::<B, 4, Int>::from_data(
            TensorData::new(classes, [1, 1, height as usize, width as usize]),
            device,
        );

        trimap_from_classes(classes)
    }

    /// Load a greyscale trimap file as a one-hot tensor `[1, 3, height, width]`.
    pub fn load_trimap<B: Backend, P: AsRef<Path>>(
        path: P,
        device: &B::Device,
    ) -> ImageResult<Tensor<B, 4>> {
        Ok(Self::trimap_to_tensor(&Self::open(path)?.into_luma8(), device))
    }

    /// Alpha matte tensor `[1, 1, height, width]` in [0, 1] from a greyscale image.
    pub fn alpha_to_tensor<B: Backend>(alpha: &GrayImage, device: &B::Device) -> Tensor<B, 4> {
        let (width, height) = alpha.dimensions();
        let values: Vec<f32> = alpha
            .pixels()
            .map(|Luma([value])| f32::from(*value) / 255.0)
            .collect();

        Tensor::from_data(
            TensorData::new(values, [1, 1, height as usize, width as usize])
                .convert::<B::FloatElem>(),
            device,
        )
    }

    /// Load a greyscale alpha matte file as a tensor `[1, 1, height, width]`.
    pub fn load_alpha<B: Backend, P: AsRef<Path>>(
        path: P,
        device: &B::Device,
    ) -> ImageResult<Tensor<B, 4>> {
        Ok(Self::alpha_to_tensor(&Self::open(path)?.into_luma8(), device))
    }

    /// Blend `foreground` over `background` with `alpha`.
    ///
    /// # Shapes
    /// - foreground, background: `[batch, 3, height, width]`
    /// - alpha: `[batch, 1, height, width]`
    pub fn composite<B: Backend>(
        foreground: Tensor<B, 4>,
        background: Tensor<B, 4>,
        alpha: Tensor<B, 4>,
    ) -> ImageResult<Tensor<B, 4>> {
        let fg_dims = foreground.dims();
        let bg_dims = background.dims();
        if fg_dims != bg_dims {
            return Err(ImageError::ShapeMismatch {
                what: "foreground and background",
                left: fg_dims,
                right: bg_dims,
            });
        }
        Self::check_mask(fg_dims, &alpha)?;

        let alpha = alpha.repeat_dim(1, 3);
        Ok(foreground * alpha.clone() + background * alpha.neg().add_scalar(1.0))
    }

    /// Attach an alpha matte as the fourth channel of an RGB tensor.
    ///
    /// # Returns
    /// RGBA image tensor [batch, 4, height, width]
    pub fn apply_mask<B: Backend>(
        image: Tensor<B, 4>,
        mask: Tensor<B, 4>,
    ) -> ImageResult<Tensor<B, 4>> {
        let image_dims = image.dims();
        if image_dims[1] != 3 {
            return Err(ImageError::InvalidChannels {
                what: "image",
                expected: 3,
                actual: image_dims[1],
            });
        }
        Self::check_mask(image_dims, &mask)?;

        Ok(Tensor::cat(vec![image, mask], 1))
    }

    fn check_mask<B: Backend>(image_dims: [usize; 4], mask: &Tensor<B, 4>) -> ImageResult<()> {
        let mask_dims = mask.dims();
        if mask_dims[1] != 1 {
            return Err(ImageError::InvalidChannels {
                what: "mask",
                expected: 1,
                actual: mask_dims[1],
            });
        }
        if mask_dims[0] != image_dims[0]
            || mask_dims[2] != image_dims[2]
            || mask_dims[3] != image_dims[3]
        {
            return Err(ImageError::ShapeMismatch {
                what: "image and mask",
                left: image_dims,
                right: mask_dims,
            });
        }
        Ok(())
    }
}

/// Whether an extension, with or without the leading dot, names a supported image format.
pub fn is_extension_supported(extension: &str) -> bool {
    let extension = extension.trim_start_matches('.').to_ascii_lowercase();
    SUPPORTED_EXTENSIONS.contains(&extension.as_str())
}

/// Whether the file at `path` has a supported image extension.
pub fn is_supported_image_format<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(is_extension_supported)
}

#[cfg(test)]
mod tests {
    use image::RgbImage;

    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn trimap_image_becomes_one_hot_tensor() {
        let device = Default::default();
        let trimap = GrayImage::from_raw(4, 1, vec![0, 128, 200, 255]).unwrap();

        let tensor = ImageUtils::trimap_to_tensor::<TestBackend>(&trimap, &device);

        assert_eq!(tensor.dims(), [1, 3, 1, 4]);
        let values = tensor.into_data().to_vec::<f32>().unwrap();
        assert_eq!(
            values,
            vec![
                1.0, 0.0, 0.0, 0.0, // background
                0.0, 1.0, 1.0, 0.0, // unknown
                0.0, 0.0, 0.0, 1.0, // foreground
            ]
        );
    }

    #[test]
    fn alpha_image_is_scaled_to_unit_range() {
        let device = Default::default();
        let alpha = GrayImage::from_raw(2, 1, vec![0, 255]).unwrap();

        let values = ImageUtils::alpha_to_tensor::<TestBackend>(&alpha, &device)
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        assert_eq!(values, vec![0.0, 1.0]);
    }

    #[test]
    fn image_round_trips_through_tensor() {
        let device = Default::default();
        let pixels = vec![0, 64, 128, 255, 32, 16];
        let image = DynamicImage::ImageRgb8(RgbImage::from_raw(2, 1, pixels.clone()).unwrap());

        let tensor = ImageUtils::dynamic_image_to_tensor::<TestBackend>(image, &device);
        assert_eq!(tensor.dims(), [1, 3, 1, 2]);

        let restored = ImageUtils::tensor_to_dynamic_image(tensor, false).unwrap();
        assert_eq!(restored.into_rgb8().into_raw(), pixels);
    }

    #[test]
    fn tensor_to_image_rejects_multi_image_batches() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 4>::zeros([2, 1, 4, 4], &device);

        assert!(matches!(
            ImageUtils::tensor_to_dynamic_image(tensor, true),
            Err(ImageError::InvalidBatchSize { actual: 2 })
        ));
    }

    #[test]
    fn imagenet_normalization_maps_mean_to_zero() {
        let device = Default::default();
        let image = Tensor::<TestBackend, 1>::from_floats(IMAGENET_MEAN, &device)
            .reshape([1, 3, 1, 1])
            .repeat_dim(2, 2);

        let normalized = ImageUtils::apply_imagenet_normalization(image).unwrap();
        let max = normalized.abs().max().into_scalar();

        assert!(max < 1e-6);
    }

    #[test]
    fn imagenet_normalization_rejects_single_channel() {
        let device = Default::default();
        let image = Tensor::<TestBackend, 4>::zeros([1, 1, 2, 2], &device);

        assert!(matches!(
            ImageUtils::apply_imagenet_normalization(image),
            Err(ImageError::InvalidChannels { actual: 1, .. })
        ));
    }

    #[test]
    fn composite_blends_by_alpha() {
        let device = Default::default();
        let fg = Tensor::<TestBackend, 4>::ones([1, 3, 1, 2], &device);
        let bg = Tensor::<TestBackend, 4>::zeros([1, 3, 1, 2], &device);
        let alpha = Tensor::<TestBackend, 4>::from_floats([[[[0.25, 1.0]]]], &device);

        let values = ImageUtils::composite(fg, bg, alpha)
            .unwrap()
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        assert_eq!(values, vec![0.25, 1.0, 0.25, 1.0, 0.25, 1.0]);
    }

    #[test]
    fn apply_mask_mismatched_dimensions_returns_error() {
        let device = Default::default();
        let image = Tensor::<TestBackend, 4>::zeros([1, 3, 10, 10], &device);
        let mask = Tensor::<TestBackend, 4>::zeros([1, 1, 5, 5], &device);

        assert!(matches!(
            ImageUtils::apply_mask(image, mask),
            Err(ImageError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn apply_mask_creates_rgba_tensor() {
        let device = Default::default();
        let image = Tensor::<TestBackend, 4>::zeros([1, 3, 10, 10], &device);
        let mask = Tensor::<TestBackend, 4>::ones([1, 1, 10, 10], &device);

        let rgba = ImageUtils::apply_mask(image, mask).unwrap();

        assert_eq!(rgba.dims(), [1, 4, 10, 10]);
    }

    #[test]
    fn supported_image_formats_are_detected_case_insensitively() {
        assert!(is_supported_image_format("test.jpg"));
        assert!(is_supported_image_format("test.PNG"));
        assert!(is_supported_image_format("/path/to/image.jpeg"));
        assert!(!is_supported_image_format("test.txt"));
        assert!(!is_supported_image_format("test"));

        assert!(is_extension_supported(".png"));
        assert!(!is_extension_supported("gif"));
    }
}
