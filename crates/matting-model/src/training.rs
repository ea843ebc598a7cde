//! Training glue for the matting network.
//!
//! Batch and output structures used by Burn's learner, and the
//! [`TrainStep`] / [`ValidStep`] implementations of [`MattingNet`].

use burn::{
    prelude::*,
    tensor::backend::AutodiffBackend,
    train::{
        metric::{Adaptor, ItemLazy, LossInput},
        TrainOutput, TrainStep, ValidStep,
    },
};
use matting_metric::MattingMetricInput;

use crate::{error::MattingResult, loss::AlphaLoss, models::matting_net::MattingNet};

/// A batch of training composites.
#[derive(Debug, Clone)]
pub struct MattingBatch<B: Backend> {
    /// Normalized RGB images `[N, 3, H, W]`.
    pub images: Tensor<B, 4>,
    /// One-hot trimaps `[N, 3, H, W]`.
    pub trimaps: Tensor<B, 4>,
    /// Ground truth alpha `[N, 1, H, W]` in [0, 1].
    pub alphas: Tensor<B, 4>,
    /// Unknown region of the trimaps `[N, 1, H, W]`.
    pub unknown: Tensor<B, 4>,
}

impl<B: Backend> MattingBatch<B> {
    pub const fn new(
        images: Tensor<B, 4>,
        trimaps: Tensor<B, 4>,
        alphas: Tensor<B, 4>,
        unknown: Tensor<B, 4>,
    ) -> Self {
        Self {
            images,
            trimaps,
            alphas,
            unknown,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.images.dims()[0]
    }
}

/// Output of a training or validation step.
#[derive(Debug, Clone)]
pub struct MattingOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    /// Predicted alpha `[N, 1, H, W]`.
    pub alpha: Tensor<B, 4>,
    /// Ground truth alpha `[N, 1, H, W]`.
    pub targets: Tensor<B, 4>,
    /// Region the loss was computed on.
    pub unknown: Tensor<B, 4>,
}

impl<B: Backend> MattingOutput<B> {
    pub const fn new(
        loss: Tensor<B, 1>,
        alpha: Tensor<B, 4>,
        targets: Tensor<B, 4>,
        unknown: Tensor<B, 4>,
    ) -> Self {
        Self {
            loss,
            alpha,
            targets,
            unknown,
        }
    }
}

impl<B: Backend> ItemLazy for MattingOutput<B> {
    type ItemSync = Self;

    fn sync(self) -> Self::ItemSync {
        self
    }
}

impl<B: Backend> Adaptor<LossInput<B>> for MattingOutput<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.clone())
    }
}

impl<B: Backend> Adaptor<MattingMetricInput<B>> for MattingOutput<B> {
    fn adapt(&self) -> MattingMetricInput<B> {
        MattingMetricInput::new(
            self.alpha.clone(),
            self.targets.clone(),
            self.unknown.clone(),
        )
    }
}

impl<B: Backend> MattingNet<B> {
    /// Predicts the batch with the default forward mode and scores it with the
    /// alpha loss on the unknown region.
    ///
    /// # Errors
    ///
    /// Propagates input validation errors of [`MattingNet::forward`].
    pub fn forward_step(&self, batch: MattingBatch<B>) -> MattingResult<MattingOutput<B>> {
        let MattingBatch {
            images,
            trimaps,
            alphas,
            unknown,
        } = batch;

        let alpha = self.forward(images, trimaps)?;
        let loss = AlphaLoss::new().forward(alpha.clone(), alphas.clone(), unknown.clone());

        Ok(MattingOutput::new(loss, alpha, alphas, unknown))
    }
}

impl<B: AutodiffBackend> TrainStep<MattingBatch<B>, MattingOutput<B>> for MattingNet<B> {
    fn step(&self, batch: MattingBatch<B>) -> TrainOutput<MattingOutput<B>> {
        let item = self
            .forward_step(batch)
            .unwrap_or_else(|e| panic!("Training step failed: {e}"));

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<MattingBatch<B>, MattingOutput<B>> for MattingNet<B> {
    fn step(&self, batch: MattingBatch<B>) -> MattingOutput<B> {
        self.forward_step(batch)
            .unwrap_or_else(|e| panic!("Validation step failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::Distribution;

    use super::*;
    use crate::{
        config::MattingNetConfig,
        tests::{TestAutodiffBackend, TestBackend},
        trimap::unknown_region,
    };

    fn batch<B: Backend>(device: &B::Device) -> MattingBatch<B> {
        let images = Tensor::random([2, 3, 32, 32], Distribution::Normal(0.0, 1.0), device);
        let trimaps = Tensor::random([2, 3, 32, 32], Distribution::Default, device);
        let alphas = Tensor::random([2, 1, 32, 32], Distribution::Default, device);
        let unknown = unknown_region(trimaps.clone());

        MattingBatch::new(images, trimaps, alphas, unknown)
    }

    #[test]
    fn matting_batch_reports_batch_size() {
        let device = Default::default();
        let batch = batch::<TestBackend>(&device);

        assert_eq!(batch.batch_size(), 2);
        assert_eq!(batch.unknown.dims(), [2, 1, 32, 32]);
    }

    #[test]
    fn valid_step_returns_prediction_and_scalar_loss() {
        let device = Default::default();
        let model = MattingNetConfig::coarse()
            .init::<TestBackend>(&device)
            .unwrap();

        let output = ValidStep::step(&model, batch::<TestBackend>(&device));

        assert_eq!(output.loss.dims(), [1]);
        assert_eq!(output.alpha.dims(), [2, 1, 32, 32]);
        assert_eq!(output.targets.dims(), [2, 1, 32, 32]);
        assert!(output.loss.into_scalar().is_finite());
    }

    #[test]
    fn train_step_returns_prediction_with_gradients() {
        let device = Default::default();
        let model = MattingNetConfig::new()
            .init::<TestAutodiffBackend>(&device)
            .unwrap();

        let output = TrainStep::step(&model, batch::<TestAutodiffBackend>(&device));

        assert_eq!(output.item.alpha.dims(), [2, 1, 32, 32]);
    }

    #[test]
    fn metric_input_carries_unknown_mask() {
        let device = Default::default();
        let model = MattingNetConfig::coarse()
            .init::<TestBackend>(&device)
            .unwrap();
        let output = model.forward_step(batch::<TestBackend>(&device)).unwrap();

        let input: MattingMetricInput<TestBackend> = output.adapt();

        assert_eq!(input.mask.dims(), [2, 1, 32, 32]);
    }

    #[test]
    #[should_panic = "Validation step failed"]
    fn valid_step_panics_on_invalid_input() {
        let device = Default::default();
        let model = MattingNetConfig::coarse()
            .init::<TestBackend>(&device)
            .unwrap();
        let mut batch = batch::<TestBackend>(&device);
        batch.images = Tensor::zeros([2, 3, 30, 30], &device);

        let _ = ValidStep::step(&model, batch);
    }
}
