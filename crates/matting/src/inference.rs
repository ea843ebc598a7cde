//! Batch matting of images with their trimaps.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use burn::{
    config::Config,
    prelude::*,
    tensor::{
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};
use matting_model::{MattingNet, MattingNetConfig};
use matting_util::{is_supported_image_format, load_model, load_model_auto, ImageUtils};

/// Default side of the square network input.
pub const DEFAULT_INPUT_SIZE: usize = 320;

/// Inference configuration.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Image file or directory of images.
    pub image_path: PathBuf,
    /// Trimap file, or directory of trimaps matched by file stem.
    pub trimap_path: PathBuf,
    /// Weight file.
    pub weights_path: PathBuf,
    /// Network configuration. Defaults to the one stored next to the weights.
    pub config_path: Option<PathBuf>,
    /// Background to composite the matted foreground over.
    pub background_path: Option<PathBuf>,
    /// Output directory.
    pub output_path: PathBuf,
    /// Side of the square network input, a multiple of 32.
    pub size: usize,
}

impl InferenceConfig {
    /// Creates a new inference configuration.
    pub fn new(
        image_path: impl Into<PathBuf>,
        trimap_path: impl Into<PathBuf>,
        weights_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            image_path: image_path.into(),
            trimap_path: trimap_path.into(),
            weights_path: weights_path.into(),
            config_path: None,
            background_path: None,
            output_path: output_path.into(),
            size: DEFAULT_INPUT_SIZE,
        }
    }

    pub fn with_config_path(mut self, config_path: Option<PathBuf>) -> Self {
        self.config_path = config_path;
        self
    }

    pub fn with_background_path(mut self, background_path: Option<PathBuf>) -> Self {
        self.background_path = background_path;
        self
    }

    pub const fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }
}

/// Loads a network from `weights_path`, configured from `config_path` when
/// given and from the companion configuration otherwise.
pub fn load_network<B: Backend>(
    weights_path: &Path,
    config_path: Option<&Path>,
    device: &B::Device,
) -> Result<MattingNet<B>> {
    let model = match config_path {
        Some(config_path) => {
            let config = MattingNetConfig::load(config_path).with_context(|| {
                format!("failed to read network configuration {}", config_path.display())
            })?;
            load_model(&config, weights_path, device)?
        }
        None => load_model_auto(weights_path, device)?.0,
    };

    tracing::info!(
        weights = %weights_path.display(),
        refined = model.has_refiner(),
        "Model loaded"
    );
    Ok(model)
}

/// Predicts the alpha matte of one image at the network resolution `size`.
///
/// # Shapes
/// - image: `[1, 3, height, width]` RGB in [0, 1]
/// - trimap: `[1, 3, h, w]` one-hot, resized to the network input
/// - output: `[1, 1, height, width]` in [0, 1]
pub fn predict_alpha<B: Backend>(
    model: &MattingNet<B>,
    image: Tensor<B, 4>,
    trimap: Tensor<B, 4>,
    size: usize,
) -> Result<Tensor<B, 4>> {
    let [_, _, height, width] = image.dims();

    let image = interpolate(
        ImageUtils::apply_imagenet_normalization(image)?,
        [size, size],
        InterpolateOptions::new(InterpolateMode::Bicubic),
    );
    let trimap = interpolate(
        trimap,
        [size, size],
        InterpolateOptions::new(InterpolateMode::Nearest),
    );

    let alpha = model.forward(image, trimap)?;

    Ok(interpolate(
        alpha,
        [height, width],
        InterpolateOptions::new(InterpolateMode::Bilinear),
    )
    .clamp(0.0, 1.0))
}

/// Runs matting on an image or directory of images.
///
/// Writes `<stem>_alpha.png` for every image, and `<stem>_composite.png` when
/// a background is configured.
///
/// # Errors
///
/// Returns an error if the model cannot be loaded or the input paths do not
/// exist. Failures on single images of a directory are logged and skipped.
pub fn run_inference<B: Backend>(config: &InferenceConfig, device: &B::Device) -> Result<()> {
    tracing::info!(
        image = %config.image_path.display(),
        trimap = %config.trimap_path.display(),
        output = %config.output_path.display(),
        size = config.size,
        "Running inference"
    );

    let model = load_network::<B>(&config.weights_path, config.config_path.as_deref(), device)?;
    let background = config
        .background_path
        .as_ref()
        .map(|path| ImageUtils::load_image::<B, _>(path, device))
        .transpose()?;

    fs::create_dir_all(&config.output_path)?;

    if config.image_path.is_file() {
        process_single_image(
            &model,
            config,
            &config.image_path,
            &config.trimap_path,
            background.as_ref(),
            device,
        )?;
    } else if config.image_path.is_dir() {
        for image_path in list_images(&config.image_path)? {
            let result = find_by_stem(&config.trimap_path, &image_path)
                .with_context(|| format!("no trimap for {}", image_path.display()))
                .and_then(|trimap_path| {
                    process_single_image(
                        &model,
                        config,
                        &image_path,
                        &trimap_path,
                        background.as_ref(),
                        device,
                    )
                });
            if let Err(e) = result {
                tracing::error!(path = %image_path.display(), error = %e, "Failed to process image");
            }
        }
    } else {
        anyhow::bail!("Input path does not exist: {}", config.image_path.display());
    }

    tracing::info!("Inference completed");
    Ok(())
}

fn process_single_image<B: Backend>(
    model: &MattingNet<B>,
    config: &InferenceConfig,
    image_path: &Path,
    trimap_path: &Path,
    background: Option<&Tensor<B, 4>>,
    device: &B::Device,
) -> Result<()> {
    tracing::info!(path = %image_path.display(), "Processing image");

    let image = ImageUtils::load_image::<B, _>(image_path, device)?;
    let trimap = ImageUtils::load_trimap::<B, _>(trimap_path, device)?;
    let alpha = predict_alpha(model, image.clone(), trimap, config.size)?;

    let stem = image_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");

    let alpha_path = config.output_path.join(format!("{stem}_alpha.png"));
    ImageUtils::tensor_to_dynamic_image(alpha.clone(), true)?.save(&alpha_path)?;
    tracing::info!(path = %alpha_path.display(), "Saved alpha matte");

    if let Some(background) = background {
        let [_, _, height, width] = image.dims();
        let background = interpolate(
            background.clone(),
            [height, width],
            InterpolateOptions::new(InterpolateMode::Bilinear),
        );
        let composite = ImageUtils::composite(image, background, alpha)?.clamp(0.0, 1.0);

        let composite_path = config.output_path.join(format!("{stem}_composite.png"));
        ImageUtils::tensor_to_dynamic_image(composite, false)?.save(&composite_path)?;
        tracing::info!(path = %composite_path.display(), "Saved composite");
    }

    Ok(())
}

/// Supported images in `dir`, sorted by path.
pub(crate) fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    let entries = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && is_supported_image_format(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// The file in `dir` sharing the stem of `reference`. `dir` may also be the
/// file itself.
pub(crate) fn find_by_stem(dir: &Path, reference: &Path) -> Result<PathBuf> {
    if dir.is_file() {
        return Ok(dir.to_path_buf());
    }

    let stem = reference.file_stem();
    list_images(dir)?
        .into_iter()
        .find(|candidate| candidate.file_stem() == stem)
        .with_context(|| {
            format!(
                "no file named like {} in {}",
                reference.display(),
                dir.display()
            )
        })
}

#[cfg(test)]
mod tests {
    use burn::tensor::Distribution;
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::tests::{fixture, TestBackend};

    #[test]
    fn inference_config_defaults() {
        let config = InferenceConfig::new("image.png", "trimap.png", "model.mpk", "out/");

        assert_eq!(config.image_path, PathBuf::from("image.png"));
        assert_eq!(config.size, DEFAULT_INPUT_SIZE);
        assert!(config.config_path.is_none());
        assert!(config.background_path.is_none());
    }

    #[test]
    fn predict_alpha_restores_input_size() {
        let device = Default::default();
        let model = MattingNetConfig::coarse()
            .init::<TestBackend>(&device)
            .unwrap();
        let image = Tensor::random([1, 3, 40, 50], Distribution::Default, &device);
        let trimap = Tensor::random([1, 3, 40, 50], Distribution::Default, &device);

        let alpha = predict_alpha(&model, image, trimap, 32).unwrap();

        assert_eq!(alpha.dims(), [1, 1, 40, 50]);
        let max: f32 = alpha.clone().max().into_scalar();
        let min: f32 = alpha.min().into_scalar();
        assert!((0.0..=1.0).contains(&min) && (0.0..=1.0).contains(&max));
    }

    #[test]
    fn predict_alpha_rejects_indivisible_size() {
        let device = Default::default();
        let model = MattingNetConfig::coarse()
            .init::<TestBackend>(&device)
            .unwrap();
        let image = Tensor::zeros([1, 3, 40, 40], &device);
        let trimap = Tensor::zeros([1, 3, 40, 40], &device);

        assert!(predict_alpha(&model, image, trimap, 30).is_err());
    }

    #[test]
    fn find_by_stem_matches_any_extension() {
        let (dir, _) = fixture();

        let found = find_by_stem(&dir.path().join("trimaps"), Path::new("images/cat.jpg")).unwrap();

        assert_eq!(found, dir.path().join("trimaps/cat.png"));
        assert!(find_by_stem(&dir.path().join("trimaps"), Path::new("dog.png")).is_err());
    }

    #[test]
    fn run_inference_writes_alpha_and_composite() {
        let (dir, weights) = fixture();
        let output = dir.path().join("out");
        let background = dir.path().join("bg.png");
        RgbImage::from_pixel(16, 16, Rgb([0, 255, 0]))
            .save(&background)
            .unwrap();
        let config = InferenceConfig::new(
            dir.path().join("images"),
            dir.path().join("trimaps"),
            weights,
            &output,
        )
        .with_background_path(Some(background))
        .with_size(32);

        run_inference::<TestBackend>(&config, &Default::default()).unwrap();

        let alpha = image::open(output.join("cat_alpha.png")).unwrap();
        assert_eq!((alpha.width(), alpha.height()), (40, 40));
        assert!(output.join("cat_composite.png").exists());
    }

    #[test]
    fn run_inference_rejects_missing_input() {
        let (dir, weights) = fixture();
        let config = InferenceConfig::new(
            dir.path().join("missing.png"),
            dir.path().join("trimaps"),
            weights,
            dir.path().join("out"),
        );

        assert!(run_inference::<TestBackend>(&config, &Default::default()).is_err());
    }
}
