//! Alpha prediction loss.
//!
//! A Charbonnier (smooth L1) penalty on the alpha error, restricted to a mask
//! and normalized by the mask area:
//!
//! `L = sum(sqrt(((p - g) * m)^2 + eps^2)) / (sum(m) + eps)`
//!
//! Training uses the unknown region of the trimap as the mask, so the network
//! is only graded where the trimap leaves the answer open.

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    tensor::{backend::Backend, Tensor},
};

/// Configuration for creating an [alpha prediction loss](AlphaLoss).
#[derive(Config, Debug)]
pub struct AlphaLossConfig {
    /// Smoothing term of the Charbonnier penalty. Also guards the
    /// normalization against an empty mask. Default: 1e-6
    #[config(default = 1e-6)]
    pub epsilon: f64,
    /// Weight factor for the loss. Default: 1.0
    #[config(default = 1.0)]
    pub weight: f64,
}

impl AlphaLossConfig {
    /// Initialize [alpha prediction loss](AlphaLoss).
    pub fn init(&self) -> AlphaLoss {
        self.assertions();
        AlphaLoss {
            epsilon: self.epsilon,
            weight: self.weight,
        }
    }

    fn assertions(&self) {
        assert!(
            self.epsilon > 0.0,
            "Epsilon for AlphaLoss must be positive, got {}",
            self.epsilon
        );
        assert!(
            self.weight > 0.0,
            "Weight for AlphaLoss must be positive, got {}",
            self.weight
        );
    }
}

/// Masked Charbonnier loss on alpha mattes.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct AlphaLoss {
    /// Smoothing term.
    pub epsilon: f64,
    /// Weight factor applied to the loss.
    pub weight: f64,
}

impl Default for AlphaLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for AlphaLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("epsilon", &self.epsilon)
            .add("weight", &self.weight)
            .optional()
    }
}

impl AlphaLoss {
    /// Create a new alpha loss with default configuration.
    pub fn new() -> Self {
        AlphaLossConfig::new().init()
    }

    /// Compute the loss over the masked region.
    ///
    /// # Shapes
    ///
    /// - predictions: `[batch, 1, height, width]`
    /// - targets: `[batch, 1, height, width]`
    /// - mask: `[batch, 1, height, width]`, 1.0 where the error counts
    /// - output: `[1]`
    pub fn forward<B: Backend>(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4>,
        mask: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        self.assertions(&predictions, &targets, &mask);

        let epsilon_sq = self.epsilon * self.epsilon;
        let masked_error = (predictions - targets) * mask.clone();
        let penalty = masked_error.powi_scalar(2).add_scalar(epsilon_sq).sqrt();

        penalty
            .sum()
            .div(mask.sum().add_scalar(self.epsilon))
            .mul_scalar(self.weight)
    }

    /// Compute the loss over every pixel.
    pub fn forward_unmasked<B: Backend>(
        &self,
        predictions: Tensor<B, 4>,
        targets: Tensor<B, 4>,
    ) -> Tensor<B, 1> {
        let mask = predictions.ones_like();
        self.forward(predictions, targets, mask)
    }

    fn assertions<B: Backend>(
        &self,
        predictions: &Tensor<B, 4>,
        targets: &Tensor<B, 4>,
        mask: &Tensor<B, 4>,
    ) {
        let pred_dims = predictions.dims();
        let target_dims = targets.dims();
        let mask_dims = mask.dims();
        assert_eq!(
            pred_dims, target_dims,
            "Shape of predictions ({pred_dims:?}) must match targets ({target_dims:?})"
        );
        assert_eq!(
            pred_dims, mask_dims,
            "Shape of predictions ({pred_dims:?}) must match mask ({mask_dims:?})"
        );
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::TensorData;

    use super::*;
    use crate::tests::TestBackend;

    fn tensor(values: [f32; 4]) -> Tensor<TestBackend, 4> {
        Tensor::from_data(
            TensorData::new(values.to_vec(), [1, 1, 2, 2]),
            &Default::default(),
        )
    }

    #[test]
    fn alpha_loss_of_perfect_prediction_is_negligible() {
        let loss = AlphaLoss::new();
        let alpha = tensor([0.0, 0.25, 0.5, 1.0]);

        let value = loss
            .forward(alpha.clone(), alpha, tensor([1.0; 4]))
            .into_scalar();

        assert!(value < 1e-5, "got {value}");
    }

    #[test]
    fn alpha_loss_averages_absolute_error_over_mask() {
        let loss = AlphaLoss::new();
        let predictions = tensor([1.0, 0.0, 0.9, 0.1]);
        let targets = tensor([0.0, 0.5, 0.0, 0.0]);
        let mask = tensor([1.0, 1.0, 0.0, 0.0]);

        // (1.0 + 0.5) / 2, the unmasked pixels only contribute epsilon.
        let value = loss.forward(predictions, targets, mask).into_scalar();

        assert!((value - 0.75).abs() < 1e-4, "got {value}");
    }

    #[test]
    fn alpha_loss_with_empty_mask_stays_finite() {
        let loss = AlphaLoss::new();
        let value = loss
            .forward(tensor([1.0; 4]), tensor([0.0; 4]), tensor([0.0; 4]))
            .into_scalar();

        assert!(value.is_finite());
    }

    #[test]
    fn alpha_loss_weight_scales_result() {
        let loss = AlphaLossConfig::new().with_weight(2.0).init();
        let predictions = tensor([1.0, 1.0, 1.0, 1.0]);
        let targets = tensor([0.5, 0.5, 0.5, 0.5]);

        let value = loss.forward_unmasked(predictions, targets).into_scalar();

        assert!((value - 1.0).abs() < 1e-4, "got {value}");
    }

    #[test]
    #[should_panic = "Epsilon for AlphaLoss must be positive"]
    fn alpha_loss_config_zero_epsilon_panics() {
        let _loss = AlphaLossConfig::new().with_epsilon(0.0).init();
    }

    #[test]
    #[should_panic = "must match mask"]
    fn alpha_loss_mismatched_mask_panics() {
        let device = Default::default();
        let loss = AlphaLoss::new();
        let mask = Tensor::<TestBackend, 4>::ones([1, 1, 4, 4], &device);

        let _loss = loss.forward(tensor([0.0; 4]), tensor([0.0; 4]), mask);
    }

    #[test]
    fn alpha_loss_display_shows_parameters() {
        let loss = AlphaLossConfig::new().with_weight(0.5).init();

        let display = format!("{loss}");
        assert!(display.starts_with("AlphaLoss {"), "got {display}");
        assert!(display.contains("weight: 0.5"), "got {display}");
    }
}
