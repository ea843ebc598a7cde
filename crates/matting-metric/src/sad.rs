//! Sum of Absolute Differences (SAD) metric.
//!
//! The standard matting benchmark score: the absolute alpha error summed over
//! the image and divided by 1000, averaged over the batch.

use std::marker::PhantomData;

use burn::{
    tensor::{backend::Backend, ElementConversion, Tensor},
    train::metric::{
        state::{FormatOptions, NumericMetricState},
        Metric, MetricEntry, MetricMetadata, Numeric,
    },
};

use crate::input::MattingMetricInput;

/// Scale the summed error is reported in.
pub const SAD_SCALE: f64 = 1000.0;

/// SAD metric.
#[derive(Default)]
pub struct SadMetric<B: Backend> {
    state: NumericMetricState,
    name: Option<String>,
    _backend: PhantomData<B>,
}

impl<B: Backend> SadMetric<B> {
    /// Creates a new SAD metric.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new SAD metric with a custom name.
    pub fn with_name(name: String) -> Self {
        Self {
            state: NumericMetricState::default(),
            name: Some(name),
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> Metric for SadMetric<B> {
    type Input = MattingMetricInput<B>;

    fn name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "SAD".to_owned())
    }

    fn update(&mut self, input: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        let [batch_size, ..] = input.predictions.dims();
        let sad = compute_sad(input.predictions.clone(), input.targets.clone());

        self.state.update(
            sad,
            batch_size,
            FormatOptions::new(self.name()).precision(3),
        )
    }

    fn clear(&mut self) {
        self.state.reset();
    }
}

impl<B: Backend> Numeric for SadMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

/// SAD of each image in the batch, in units of [`SAD_SCALE`], averaged.
///
/// # Shapes
/// - predictions: `[batch_size, channels, height, width]`
/// - targets: same as predictions
///
/// # Panics
///
/// If the shapes differ.
pub fn compute_sad<B: Backend>(predictions: Tensor<B, 4>, targets: Tensor<B, 4>) -> f64 {
    let pred_dims = predictions.dims();
    let target_dims = targets.dims();
    assert_eq!(
        pred_dims, target_dims,
        "Shape of predictions ({pred_dims:?}) must match targets ({target_dims:?})"
    );

    let batch_size = pred_dims[0].max(1) as f64;
    let total = (predictions - targets)
        .abs()
        .sum()
        .into_scalar()
        .elem::<f64>();

    total / SAD_SCALE / batch_size
}
