//! Offline evaluation against ground truth mattes.
//!
//! Every image is matched with the trimap and alpha matte of the same stem.
//! SAD is taken over the whole image, MSE over the unknown region of the trimap.

use std::{fs, path::PathBuf};

use anyhow::Result;
use burn::prelude::*;
use matting_metric::{compute_mse, compute_sad};
use matting_model::unknown_region;
use matting_util::ImageUtils;

use crate::inference::{find_by_stem, list_images, load_network, predict_alpha, DEFAULT_INPUT_SIZE};

/// Evaluation configuration.
#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    pub images_dir: PathBuf,
    pub trimaps_dir: PathBuf,
    pub alphas_dir: PathBuf,
    pub weights_path: PathBuf,
    pub config_path: Option<PathBuf>,
    /// Where predictions are written, if anywhere.
    pub output_dir: Option<PathBuf>,
    pub size: usize,
}

impl EvaluationConfig {
    pub fn new(
        images_dir: impl Into<PathBuf>,
        trimaps_dir: impl Into<PathBuf>,
        alphas_dir: impl Into<PathBuf>,
        weights_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            images_dir: images_dir.into(),
            trimaps_dir: trimaps_dir.into(),
            alphas_dir: alphas_dir.into(),
            weights_path: weights_path.into(),
            config_path: None,
            output_dir: None,
            size: DEFAULT_INPUT_SIZE,
        }
    }

    pub fn with_config_path(mut self, config_path: Option<PathBuf>) -> Self {
        self.config_path = config_path;
        self
    }

    pub fn with_output_dir(mut self, output_dir: Option<PathBuf>) -> Self {
        self.output_dir = output_dir;
        self
    }

    pub const fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }
}

/// Metrics averaged over the evaluated images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationSummary {
    /// Images evaluated.
    pub count: usize,
    /// Mean SAD, in thousands.
    pub sad: f64,
    /// Mean MSE over the unknown region.
    pub mse: f64,
}

/// Evaluates a network on a directory of images.
///
/// Images without a trimap or alpha matte are skipped with a warning.
///
/// # Errors
///
/// Fails when the model cannot be loaded, a directory cannot be read, a
/// prediction fails, or no image could be evaluated.
pub fn run_evaluation<B: Backend>(
    config: &EvaluationConfig,
    device: &B::Device,
) -> Result<EvaluationSummary> {
    let model = load_network::<B>(&config.weights_path, config.config_path.as_deref(), device)?;
    if let Some(output_dir) = &config.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let mut count = 0;
    let mut total_sad = 0.0;
    let mut total_mse = 0.0;

    for image_path in list_images(&config.images_dir)? {
        let paths = find_by_stem(&config.trimaps_dir, &image_path)
            .and_then(|trimap| Ok((trimap, find_by_stem(&config.alphas_dir, &image_path)?)));
        let (trimap_path, alpha_path) = match paths {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(path = %image_path.display(), error = %e, "Skipping image");
                continue;
            }
        };

        let image = ImageUtils::load_image::<B, _>(&image_path, device)?;
        let trimap = ImageUtils::load_trimap::<B, _>(&trimap_path, device)?;
        let target = ImageUtils::load_alpha::<B, _>(&alpha_path, device)?;

        let prediction = predict_alpha(&model, image, trimap.clone(), config.size)?;
        let sad = compute_sad(prediction.clone(), target.clone());
        let mse = compute_mse(prediction.clone(), target, unknown_region(trimap));
        tracing::debug!(path = %image_path.display(), sad, mse, "Evaluated image");

        if let Some(output_dir) = &config.output_dir {
            let stem = image_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output");
            ImageUtils::tensor_to_dynamic_image(prediction, true)?
                .save(output_dir.join(format!("{stem}.png")))?;
        }

        count += 1;
        total_sad += sad;
        total_mse += mse;
    }

    if count == 0 {
        anyhow::bail!(
            "No image in {} could be evaluated",
            config.images_dir.display()
        );
    }

    let summary = EvaluationSummary {
        count,
        sad: total_sad / count as f64,
        mse: total_mse / count as f64,
    };
    tracing::info!(count, sad = summary.sad, mse = summary.mse, "Evaluation completed");

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{fixture, TestBackend};

    #[test]
    fn evaluation_averages_metrics_over_images() {
        let (dir, weights) = fixture();
        let output = dir.path().join("predictions");
        let config = EvaluationConfig::new(
            dir.path().join("images"),
            dir.path().join("trimaps"),
            dir.path().join("alphas"),
            weights,
        )
        .with_output_dir(Some(output.clone()))
        .with_size(32);

        let summary = run_evaluation::<TestBackend>(&config, &Default::default()).unwrap();

        assert_eq!(summary.count, 1);
        assert!(summary.sad.is_finite() && summary.sad >= 0.0);
        assert!(summary.mse.is_finite() && summary.mse >= 0.0);
        assert!(output.join("cat.png").exists());
    }

    #[test]
    fn evaluation_without_ground_truth_fails() {
        let (dir, weights) = fixture();
        let config = EvaluationConfig::new(
            dir.path().join("images"),
            dir.path().join("trimaps"),
            dir.path().join("trimaps"),
            weights,
        )
        .with_size(32);
        fs::remove_file(dir.path().join("trimaps/cat.png")).unwrap();

        assert!(run_evaluation::<TestBackend>(&config, &Default::default()).is_err());
    }
}
