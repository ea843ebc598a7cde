//! Data augmentation for composite samples.
//!
//! Training samples go through, in configured order:
//! 1. Random crop of 320, 480 or 640 pixels centred on an unknown trimap pixel
//! 2. Horizontal flip (50% probability)
//! 3. Color jitter of brightness, contrast and saturation (image only)
//!
//! and are then resized to the output size. Validation samples are only resized.
//!
//! Each sample draws from its own RNG, seeded from the augmentor seed and the
//! sample index, so a dataset yields the same samples in any loading order.

use burn::config::Config;
use image::{
    imageops::{self, FilterType},
    GrayImage, Rgb, RgbImage,
};
use matting_model::TrimapClass;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Data augmentation configuration.
#[derive(Config, Debug)]
pub struct AugmentationConfig {
    /// Augmentations applied to training samples, in order.
    #[config(default = "AugmentationMethod::all()")]
    pub enabled_methods: Vec<AugmentationMethod>,
    /// Square crop sizes, one drawn per sample.
    #[config(default = "vec![320, 480, 640]")]
    pub crop_sizes: Vec<u32>,
    /// Side of the square samples handed to the network.
    #[config(default = 320)]
    pub output_size: u32,
    /// Probability of a horizontal flip.
    #[config(default = 0.5)]
    pub flip_probability: f64,
    /// Brightness factors are drawn from `[1 - brightness, 1 + brightness]`.
    #[config(default = 0.125)]
    pub brightness: f32,
    /// Contrast factors are drawn from `[1 - contrast, 1 + contrast]`.
    #[config(default = 0.125)]
    pub contrast: f32,
    /// Saturation factors are drawn from `[1 - saturation, 1 + saturation]`.
    #[config(default = 0.125)]
    pub saturation: f32,
}

/// Available data augmentation methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AugmentationMethod {
    /// Crop around the unknown region
    Crop,
    /// Horizontal flip
    Flip,
    /// Brightness, contrast and saturation jitter
    Jitter,
}

impl AugmentationMethod {
    pub fn all() -> Vec<Self> {
        vec![Self::Crop, Self::Flip, Self::Jitter]
    }
}

/// A composite with its trimap and ground truth alpha, all the same size.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeSample {
    pub image: RgbImage,
    /// Greyscale trimap with levels {0, 128, 255}.
    pub trimap: GrayImage,
    pub alpha: GrayImage,
}

impl CompositeSample {
    pub const fn new(image: RgbImage, trimap: GrayImage, alpha: GrayImage) -> Self {
        Self {
            image,
            trimap,
            alpha,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Applies [`AugmentationConfig`] to composite samples.
#[derive(Debug, Clone)]
pub struct MattingAugmentor {
    config: AugmentationConfig,
    seed: u64,
}

impl MattingAugmentor {
    pub const fn new(config: AugmentationConfig, seed: u64) -> Self {
        Self { config, seed }
    }

    pub const fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// RNG of the sample at `index`.
    pub fn rng(&self, index: usize) -> StdRng {
        StdRng::seed_from_u64(self.seed.wrapping_add(index as u64))
    }

    /// Augment a sample.
    ///
    /// # Arguments
    /// * `sample` - Composite, trimap and alpha of one item
    /// * `rng` - The item's RNG, see [`MattingAugmentor::rng`]
    /// * `is_training` - Validation samples are only resized
    pub fn augment<R: Rng>(
        &self,
        mut sample: CompositeSample,
        rng: &mut R,
        is_training: bool,
    ) -> CompositeSample {
        if is_training {
            for method in &self.config.enabled_methods {
                sample = match method {
                    AugmentationMethod::Crop => self.random_crop(sample, rng),
                    AugmentationMethod::Flip => self.horizontal_flip(sample, rng),
                    AugmentationMethod::Jitter => self.color_jitter(sample, rng),
                };
            }
        }

        self.resize(sample)
    }

    fn resize(&self, sample: CompositeSample) -> CompositeSample {
        let size = self.config.output_size;
        if sample.dimensions() == (size, size) {
            return sample;
        }

        CompositeSample {
            image: imageops::resize(&sample.image, size, size, FilterType::Lanczos3),
            trimap: imageops::resize(&sample.trimap, size, size, FilterType::Nearest),
            alpha: imageops::resize(&sample.alpha, size, size, FilterType::Triangle),
        }
    }

    /// Square crop around a random unknown pixel, clamped to the image.
    ///
    /// Skipped when the drawn size exceeds the image. Without unknown pixels
    /// the crop is centred on the image.
    fn random_crop<R: Rng>(&self, sample: CompositeSample, rng: &mut R) -> CompositeSample {
        let sizes = &self.config.crop_sizes;
        if sizes.is_empty() {
            return sample;
        }
        let size = sizes[rng.random_range(0..sizes.len())];

        let (width, height) = sample.dimensions();
        if size > width || size > height {
            return sample;
        }

        let unknown = TrimapClass::Unknown.luma();
        let is_unknown = |pixel: &(u32, u32, &image::Luma<u8>)| pixel.2[0] == unknown;
        let count = sample.trimap.enumerate_pixels().filter(is_unknown).count();
        let (center_x, center_y) = if count == 0 {
            (width / 2, height / 2)
        } else {
            let nth = rng.random_range(0..count);
            sample
                .trimap
                .enumerate_pixels()
                .filter(is_unknown)
                .nth(nth)
                .map_or((width / 2, height / 2), |(x, y, _)| (x, y))
        };

        let x = center_x.saturating_sub(size / 2).min(width - size);
        let y = center_y.saturating_sub(size / 2).min(height - size);

        CompositeSample {
            image: imageops::crop_imm(&sample.image, x, y, size, size).to_image(),
            trimap: imageops::crop_imm(&sample.trimap, x, y, size, size).to_image(),
            alpha: imageops::crop_imm(&sample.alpha, x, y, size, size).to_image(),
        }
    }

    fn horizontal_flip<R: Rng>(&self, sample: CompositeSample, rng: &mut R) -> CompositeSample {
        if !rng.random_bool(self.config.flip_probability.clamp(0.0, 1.0)) {
            return sample;
        }

        CompositeSample {
            image: imageops::flip_horizontal(&sample.image),
            trimap: imageops::flip_horizontal(&sample.trimap),
            alpha: imageops::flip_horizontal(&sample.alpha),
        }
    }

    fn color_jitter<R: Rng>(&self, mut sample: CompositeSample, rng: &mut R) -> CompositeSample {
        let brightness = jitter_factor(rng, self.config.brightness);
        let contrast = jitter_factor(rng, self.config.contrast);
        let saturation = jitter_factor(rng, self.config.saturation);

        let image = adjust_brightness(&sample.image, brightness);
        let image = adjust_contrast(&image, contrast);
        sample.image = adjust_saturation(&image, saturation);
        sample
    }
}

fn jitter_factor<R: Rng>(rng: &mut R, amount: f32) -> f32 {
    if amount <= 0.0 {
        return 1.0;
    }
    rng.random_range((1.0 - amount).max(0.0)..=1.0 + amount)
}

/// Scales every channel by `factor`.
pub fn adjust_brightness(image: &RgbImage, factor: f32) -> RgbImage {
    map_pixels(image, |channel, _| channel * factor)
}

/// Moves every channel towards (`factor < 1`) or away from the mean grey
/// level of the image.
pub fn adjust_contrast(image: &RgbImage, factor: f32) -> RgbImage {
    let pixels = (image.width() as usize * image.height() as usize).max(1);
    let mean = image.pixels().map(|pixel| luma(*pixel)).sum::<f32>() / pixels as f32;

    map_pixels(image, |channel, _| factor.mul_add(channel - mean, mean))
}

/// Moves every channel towards (`factor < 1`) or away from the grey level of
/// its pixel.
pub fn adjust_saturation(image: &RgbImage, factor: f32) -> RgbImage {
    map_pixels(image, |channel, grey| factor.mul_add(channel - grey, grey))
}

fn luma(Rgb([r, g, b]): Rgb<u8>) -> f32 {
    0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)
}

fn map_pixels(image: &RgbImage, f: impl Fn(f32, f32) -> f32) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let grey = luma(*pixel);
        for channel in &mut pixel.0 {
            *channel = f(f32::from(*channel), grey).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    fn sample(width: u32, height: u32) -> CompositeSample {
        CompositeSample::new(
            RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 0])),
            GrayImage::from_pixel(width, height, Luma([128])),
            GrayImage::from_fn(width, height, |x, _| Luma([x as u8])),
        )
    }

    fn config_with(methods: Vec<AugmentationMethod>) -> AugmentationConfig {
        AugmentationConfig::new()
            .with_enabled_methods(methods)
            .with_output_size(4)
    }

    #[test]
    fn augmentation_config_defaults() {
        let config = AugmentationConfig::new();

        assert_eq!(config.enabled_methods, AugmentationMethod::all());
        assert_eq!(config.crop_sizes, vec![320, 480, 640]);
        assert_eq!(config.output_size, 320);
        assert_eq!(config.flip_probability, 0.5);
        assert_eq!(config.brightness, 0.125);
    }

    #[test]
    fn validation_samples_are_only_resized() {
        let augmentor = MattingAugmentor::new(AugmentationConfig::new().with_output_size(32), 7);
        let mut rng = augmentor.rng(0);

        let output = augmentor.augment(sample(64, 48), &mut rng, false);

        assert_eq!(output.dimensions(), (32, 32));
        assert_eq!(output.trimap.dimensions(), (32, 32));
        assert_eq!(output.alpha.dimensions(), (32, 32));
        assert!(output.trimap.pixels().all(|p| p[0] == 128));
    }

    #[test]
    fn crop_centres_on_unknown_pixel() {
        let config = config_with(vec![AugmentationMethod::Crop]).with_crop_sizes(vec![4]);
        let augmentor = MattingAugmentor::new(config, 7);
        let mut input = sample(16, 16);
        input.trimap = GrayImage::from_pixel(16, 16, Luma([0]));
        input.trimap.put_pixel(12, 12, Luma([128]));

        let output = augmentor.augment(input, &mut augmentor.rng(0), true);

        assert_eq!(output.dimensions(), (4, 4));
        assert_eq!(*output.image.get_pixel(0, 0), Rgb([10, 10, 0]));
        assert_eq!(output.trimap.get_pixel(2, 2)[0], 128);
        assert_eq!(output.alpha.get_pixel(0, 0)[0], 10);
    }

    #[test]
    fn crop_is_clamped_to_image_bounds() {
        let config = config_with(vec![AugmentationMethod::Crop]).with_crop_sizes(vec![4]);
        let augmentor = MattingAugmentor::new(config, 7);
        let mut input = sample(8, 8);
        input.trimap = GrayImage::from_pixel(8, 8, Luma([255]));
        input.trimap.put_pixel(7, 0, Luma([128]));

        let output = augmentor.augment(input, &mut augmentor.rng(0), true);

        assert_eq!(*output.image.get_pixel(0, 0), Rgb([4, 0, 0]));
    }

    #[test]
    fn crop_larger_than_image_is_skipped() {
        let config = config_with(vec![AugmentationMethod::Crop]).with_crop_sizes(vec![320]);
        let augmentor = MattingAugmentor::new(config.with_output_size(8), 7);

        let output = augmentor.augment(sample(8, 8), &mut augmentor.rng(0), true);

        assert_eq!(output, sample(8, 8));
    }

    #[test]
    fn flip_mirrors_all_planes() {
        let config = config_with(vec![AugmentationMethod::Flip])
            .with_flip_probability(1.0)
            .with_output_size(4);
        let augmentor = MattingAugmentor::new(config, 7);

        let output = augmentor.augment(sample(4, 4), &mut augmentor.rng(0), true);

        assert_eq!(output.image.get_pixel(0, 0)[0], 3);
        assert_eq!(output.alpha.get_pixel(0, 0)[0], 3);
    }

    #[test]
    fn flip_with_zero_probability_keeps_sample() {
        let config = config_with(vec![AugmentationMethod::Flip]).with_flip_probability(0.0);
        let augmentor = MattingAugmentor::new(config, 7);

        let output = augmentor.augment(sample(4, 4), &mut augmentor.rng(0), true);

        assert_eq!(output, sample(4, 4));
    }

    #[test]
    fn jitter_leaves_trimap_and_alpha_untouched() {
        let augmentor = MattingAugmentor::new(config_with(vec![AugmentationMethod::Jitter]), 7);

        let output = augmentor.augment(sample(4, 4), &mut augmentor.rng(0), true);

        assert_eq!(output.trimap, sample(4, 4).trimap);
        assert_eq!(output.alpha, sample(4, 4).alpha);
    }

    #[test]
    fn same_index_gives_same_augmentation() {
        let config = AugmentationConfig::new()
            .with_crop_sizes(vec![8, 16])
            .with_output_size(8);
        let augmentor = MattingAugmentor::new(config, 7);

        let first = augmentor.augment(sample(32, 32), &mut augmentor.rng(5), true);
        let second = augmentor.augment(sample(32, 32), &mut augmentor.rng(5), true);

        assert_eq!(first, second);
    }

    #[test]
    fn brightness_scales_and_saturates() {
        let image = RgbImage::from_pixel(1, 1, Rgb([100, 200, 0]));

        assert_eq!(adjust_brightness(&image, 1.0), image);
        assert_eq!(*adjust_brightness(&image, 2.0).get_pixel(0, 0), Rgb([200, 255, 0]));
    }

    #[test]
    fn zero_saturation_gives_grey() {
        let image = RgbImage::from_pixel(2, 1, Rgb([255, 0, 0]));

        let grey = adjust_saturation(&image, 0.0);

        let Rgb([r, g, b]) = *grey.get_pixel(0, 0);
        assert_eq!((r, g, b), (76, 76, 76));
    }

    #[test]
    fn zero_contrast_gives_mean_grey() {
        let image = RgbImage::from_fn(2, 1, |x, _| Rgb([if x == 0 { 0 } else { 200 }; 3]));

        let flat = adjust_contrast(&image, 0.0);

        assert!(flat.pixels().all(|pixel| *pixel == Rgb([100, 100, 100])));
    }
}
