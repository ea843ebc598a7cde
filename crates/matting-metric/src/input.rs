//! Input structures for the matting metrics.

use burn::{prelude::*, tensor::backend::Backend};
use derive_new::new;

/// Metric input shared by [`SadMetric`](crate::SadMetric) and [`MseMetric`](crate::MseMetric).
#[derive(new, Debug, Clone)]
pub struct MattingMetricInput<B: Backend> {
    /// Predicted alpha with shape `[batch_size, 1, height, width]` in [0, 1].
    pub predictions: Tensor<B, 4>,
    /// Ground truth alpha with shape `[batch_size, 1, height, width]` in [0, 1].
    pub targets: Tensor<B, 4>,
    /// Evaluation region with shape `[batch_size, 1, height, width]`, usually
    /// the unknown region of the trimap.
    pub mask: Tensor<B, 4>,
}
