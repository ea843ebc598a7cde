//! Mean Squared Error (MSE) metric.
//!
//! The squared alpha error averaged over the evaluation mask of each image.
//! Images whose mask is empty are averaged over every pixel instead.

use std::marker::PhantomData;

use burn::{
    tensor::{backend::Backend, ElementConversion, Tensor},
    train::metric::{
        state::{FormatOptions, NumericMetricState},
        Metric, MetricEntry, MetricMetadata, Numeric,
    },
};

use crate::input::MattingMetricInput;

/// MSE metric.
#[derive(Default)]
pub struct MseMetric<B: Backend> {
    state: NumericMetricState,
    name: Option<String>,
    _backend: PhantomData<B>,
}

impl<B: Backend> MseMetric<B> {
    /// Creates a new MSE metric.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new MSE metric with a custom name.
    pub fn with_name(name: String) -> Self {
        Self {
            state: NumericMetricState::default(),
            name: Some(name),
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> Metric for MseMetric<B> {
    type Input = MattingMetricInput<B>;

    fn name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "MSE".to_owned())
    }

    fn update(&mut self, input: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        let [batch_size, ..] = input.predictions.dims();
        let mse = compute_mse(
            input.predictions.clone(),
            input.targets.clone(),
            input.mask.clone(),
        );

        self.state.update(
            mse,
            batch_size,
            FormatOptions::new(self.name()).precision(5),
        )
    }

    fn clear(&mut self) {
        self.state.reset();
    }
}

impl<B: Backend> Numeric for MseMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

/// Masked MSE of each image in the batch, averaged.
///
/// # Shapes
/// - predictions: `[batch_size, channels, height, width]`
/// - targets: same as predictions
/// - mask: same as predictions
///
/// # Panics
///
/// If the shapes differ.
pub fn compute_mse<B: Backend>(
    predictions: Tensor<B, 4>,
    targets: Tensor<B, 4>,
    mask: Tensor<B, 4>,
) -> f64 {
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

    let [batch_size, ..] = pred_dims;
    if batch_size == 0 {
        return 0.0;
    }

    let squared = (predictions - targets)
        .powi_scalar(2)
        .reshape([batch_size as i32, -1]);
    let mask = mask.reshape([batch_size as i32, -1]);

    let area = mask.clone().sum_dim(1);
    let empty = area.clone().equal_elem(0.0);
    let masked = (squared.clone() * mask).sum_dim(1) / area.clamp_min(f32::EPSILON);
    let per_image = masked.mask_where(empty, squared.mean_dim(1));

    per_image.mean().into_scalar().elem::<f64>()
}

#[cfg(test)]
mod tests {
    use burn::tensor::TensorData;

    use super::*;
    use crate::tests::TestBackend;

    fn tensor(values: Vec<f32>, shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    #[test]
    fn mse_of_identical_mattes_is_zero() {
        let alpha = tensor(vec![0.0, 0.3, 0.7, 1.0], [1, 1, 2, 2]);
        let mask = tensor(vec![1.0; 4], [1, 1, 2, 2]);

        assert_eq!(compute_mse(alpha.clone(), alpha, mask), 0.0);
    }

    #[test]
    fn mse_only_counts_masked_pixels() {
        let predictions = tensor(vec![1.0, 0.5, 1.0, 1.0], [1, 1, 2, 2]);
        let targets = tensor(vec![0.0, 0.0, 0.0, 0.0], [1, 1, 2, 2]);
        let mask = tensor(vec![0.0, 1.0, 0.0, 0.0], [1, 1, 2, 2]);

        let mse = compute_mse(predictions, targets, mask);

        assert!((mse - 0.25).abs() < 1e-6, "got {mse}");
    }

    #[test]
    fn mse_with_empty_mask_uses_whole_image() {
        let predictions = tensor(vec![1.0, 0.0, 1.0, 0.0], [1, 1, 2, 2]);
        let targets = tensor(vec![0.0; 4], [1, 1, 2, 2]);
        let mask = tensor(vec![0.0; 4], [1, 1, 2, 2]);

        let mse = compute_mse(predictions, targets, mask);

        assert!((mse - 0.5).abs() < 1e-6, "got {mse}");
    }

    #[test]
    fn mse_averages_per_image_scores_over_batch() {
        let predictions = tensor(vec![1.0, 1.0, 0.5, 0.0], [2, 1, 1, 2]);
        let targets = tensor(vec![0.0; 4], [2, 1, 1, 2]);
        // First image fully masked, second only its first pixel.
        let mask = tensor(vec![1.0, 1.0, 1.0, 0.0], [2, 1, 1, 2]);

        let mse = compute_mse(predictions, targets, mask);

        assert!((mse - (1.0 + 0.25) / 2.0).abs() < 1e-6, "got {mse}");
    }

    #[test]
    fn mse_metric_uses_default_name() {
        assert_eq!(MseMetric::<TestBackend>::new().name(), "MSE");
    }
}
