//! Synthetic composites and trimap generation.
//!
//! Training samples are made by blending a foreground over an unrelated
//! background with its alpha matte. The trimap the network receives is derived
//! from the same matte by growing and shrinking its support a random amount.

use image::{
    imageops::{self, FilterType},
    GrayImage, Luma, Rgb, RgbImage,
};
use imageproc::{
    distance_transform::Norm,
    morphology::{dilate, erode},
};
use matting_model::TrimapClass;
use rand::Rng;

use crate::error::{DatasetError, DatasetResult};

/// Largest structuring element side drawn by [`generate_trimap`].
pub const MAX_KERNEL_SIZE: u32 = 4;

/// Largest number of morphology iterations drawn by [`generate_trimap`].
pub const MAX_ITERATIONS: u32 = 19;

/// Where the foreground lands on a background larger than itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackgroundPlacement {
    /// Top left corner of the background. Used for training composites.
    #[default]
    Origin,
    /// Middle of the background. Used for test composites.
    Center,
}

/// Cuts a `width` x `height` window out of `background`.
///
/// A background smaller than the window in either direction is first scaled
/// up with cubic interpolation, keeping its aspect ratio, until it covers it.
pub fn fit_background(
    background: &RgbImage,
    width: u32,
    height: u32,
    placement: BackgroundPlacement,
) -> RgbImage {
    let (bg_width, bg_height) = background.dimensions();
    let ratio = (f64::from(width) / f64::from(bg_width))
        .max(f64::from(height) / f64::from(bg_height));

    let scaled;
    let background = if ratio > 1.0 {
        let scaled_width = ((f64::from(bg_width) * ratio).ceil() as u32).max(width);
        let scaled_height = ((f64::from(bg_height) * ratio).ceil() as u32).max(height);
        scaled = imageops::resize(
            background,
            scaled_width,
            scaled_height,
            FilterType::CatmullRom,
        );
        &scaled
    } else {
        background
    };

    let (bg_width, bg_height) = background.dimensions();
    let (x, y) = match placement {
        BackgroundPlacement::Origin => (0, 0),
        BackgroundPlacement::Center => ((bg_width - width) / 2, (bg_height - height) / 2),
    };

    imageops::crop_imm(background, x, y, width, height).to_image()
}

/// Blends `foreground` over `background` with `alpha`:
/// `alpha * fg + (1 - alpha) * bg`.
///
/// The background is fitted to the foreground with [`fit_background`] first.
///
/// # Errors
///
/// [`DatasetError::SizeMismatch`] when the foreground and alpha sizes differ.
pub fn composite(
    foreground: &RgbImage,
    alpha: &GrayImage,
    background: &RgbImage,
    placement: BackgroundPlacement,
) -> DatasetResult<RgbImage> {
    if foreground.dimensions() != alpha.dimensions() {
        return Err(DatasetError::SizeMismatch {
            foreground: foreground.dimensions(),
            alpha: alpha.dimensions(),
        });
    }

    let (width, height) = foreground.dimensions();
    let background = fit_background(background, width, height, placement);

    Ok(RgbImage::from_fn(width, height, |x, y| {
        let Luma([a]) = *alpha.get_pixel(x, y);
        let Rgb(fg) = *foreground.get_pixel(x, y);
        let Rgb(bg) = *background.get_pixel(x, y);
        let a = f32::from(a) / 255.0;

        Rgb(std::array::from_fn(|c| blend(fg[c], bg[c], a)))
    }))
}

fn blend(foreground: u8, background: u8, alpha: f32) -> u8 {
    alpha
        .mul_add(f32::from(foreground), (1.0 - alpha) * f32::from(background))
        .clamp(0.0, 255.0) as u8
}

/// Random trimap for an alpha matte.
///
/// Draws a square structuring element of side 1 to [`MAX_KERNEL_SIZE`] and 1
/// to [`MAX_ITERATIONS`] iterations, then applies [`trimap_from_alpha`] with the
/// resulting radius.
pub fn generate_trimap<R: Rng>(alpha: &GrayImage, rng: &mut R) -> GrayImage {
    let kernel_size = rng.random_range(1..=MAX_KERNEL_SIZE);
    let iterations = rng.random_range(1..=MAX_ITERATIONS);

    trimap_from_alpha(alpha, morphology_radius(kernel_size, iterations))
}

/// Chebyshev radius reached by `iterations` passes of a square element of
/// side `kernel_size`.
pub fn morphology_radius(kernel_size: u32, iterations: u32) -> u8 {
    u8::try_from((kernel_size / 2) * iterations).unwrap_or(u8::MAX)
}

/// Trimap with an unknown band of `radius` pixels around the matte's edge.
///
/// Pixels farther than `radius` from any non-zero alpha are background, pixels
/// whose whole `radius` neighbourhood is fully opaque are foreground, the rest
/// is unknown.
pub fn trimap_from_alpha(alpha: &GrayImage, radius: u8) -> GrayImage {
    let (width, height) = alpha.dimensions();

    let covered = dilate(alpha, Norm::LInf, radius);
    let opaque = GrayImage::from_fn(width, height, |x, y| {
        Luma([if alpha.get_pixel(x, y)[0] == u8::MAX { u8::MAX } else { 0 }])
    });
    let interior = erode(&opaque, Norm::LInf, radius);

    GrayImage::from_fn(width, height, |x, y| {
        let class = if interior.get_pixel(x, y)[0] == u8::MAX {
            TrimapClass::Foreground
        } else if covered.get_pixel(x, y)[0] == 0 {
            TrimapClass::Background
        } else {
            TrimapClass::Unknown
        };
        Luma([class.luma()])
    })
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn row(values: &[u8]) -> GrayImage {
        GrayImage::from_raw(values.len() as u32, 1, values.to_vec()).unwrap()
    }

    fn gradient_background(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| Rgb([x as u8, 0, 0]))
    }

    #[test]
    fn fit_background_upscales_small_backgrounds() {
        let background = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));

        let fitted = fit_background(&background, 8, 6, BackgroundPlacement::Origin);

        assert_eq!(fitted.dimensions(), (8, 6));
        assert_eq!(*fitted.get_pixel(7, 5), Rgb([10, 20, 30]));
    }

    #[test]
    fn fit_background_crops_from_origin_or_center() {
        let background = gradient_background(6, 1);

        let origin = fit_background(&background, 2, 1, BackgroundPlacement::Origin);
        let center = fit_background(&background, 2, 1, BackgroundPlacement::Center);

        assert_eq!(origin.get_pixel(0, 0)[0], 0);
        assert_eq!(center.get_pixel(0, 0)[0], 2);
        assert_eq!(center.get_pixel(1, 0)[0], 3);
    }

    #[test]
    fn composite_blends_with_alpha() {
        let foreground = RgbImage::from_pixel(3, 1, Rgb([200, 200, 200]));
        let background = RgbImage::from_pixel(3, 1, Rgb([100, 100, 100]));
        let alpha = row(&[255, 0, 128]);

        let image = composite(&foreground, &alpha, &background, BackgroundPlacement::Origin)
            .unwrap();

        assert_eq!(*image.get_pixel(0, 0), Rgb([200, 200, 200]));
        assert_eq!(*image.get_pixel(1, 0), Rgb([100, 100, 100]));
        assert_eq!(*image.get_pixel(2, 0), Rgb([150, 150, 150]));
    }

    #[test]
    fn composite_rejects_mismatched_alpha() {
        let foreground = RgbImage::new(4, 4);
        let background = RgbImage::new(4, 4);
        let alpha = GrayImage::new(3, 4);

        assert!(matches!(
            composite(&foreground, &alpha, &background, BackgroundPlacement::Center),
            Err(DatasetError::SizeMismatch {
                foreground: (4, 4),
                alpha: (3, 4)
            })
        ));
    }

    #[test]
    fn trimap_without_radius_follows_alpha() {
        let trimap = trimap_from_alpha(&row(&[0, 128, 255]), 0);

        assert_eq!(trimap.into_raw(), vec![0, 128, 255]);
    }

    #[test]
    fn trimap_band_grows_and_shrinks_by_radius() {
        let alpha = row(&[0, 0, 0, 255, 255, 255, 255, 0, 0]);

        let trimap = trimap_from_alpha(&alpha, 1);

        assert_eq!(
            trimap.into_raw(),
            vec![0, 0, 128, 128, 255, 255, 128, 128, 0]
        );
    }

    #[test]
    fn morphology_radius_uses_half_kernel_per_iteration() {
        assert_eq!(morphology_radius(1, 19), 0);
        assert_eq!(morphology_radius(3, 5), 5);
        assert_eq!(morphology_radius(4, 19), 38);
    }

    #[test]
    fn generated_trimap_is_consistent_with_alpha() {
        let alpha = GrayImage::from_fn(16, 16, |x, y| {
            let inside = (4..12).contains(&x) && (4..12).contains(&y);
            Luma([if inside { 255 } else { 0 }])
        });
        let mut rng = StdRng::seed_from_u64(7);

        let trimap = generate_trimap(&alpha, &mut rng);

        for (a, t) in alpha.pixels().zip(trimap.pixels()) {
            match t[0] {
                0 => assert_eq!(a[0], 0),
                255 => assert_eq!(a[0], 255),
                128 => {}
                other => panic!("unexpected trimap value {other}"),
            }
        }
    }

    #[test]
    fn generated_trimap_is_reproducible_from_seed() {
        let alpha = GrayImage::from_fn(16, 16, |x, _| Luma([(x * 16) as u8]));

        let first = generate_trimap(&alpha, &mut StdRng::seed_from_u64(3));
        let second = generate_trimap(&alpha, &mut StdRng::seed_from_u64(3));

        assert_eq!(first, second);
    }
}
