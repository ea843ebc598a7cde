//! # Matting Metrics
//!
//! Alpha matte evaluation metrics for the Burn training framework.
//!
//! - [`SadMetric`]: Sum of Absolute Differences, reported in thousands
//! - [`MseMetric`]: Mean Squared Error over the evaluation mask
//!
//! Both consume a [`MattingMetricInput`] and track a running average through
//! Burn's [`NumericMetricState`](burn::train::metric::state::NumericMetricState).
//! The free functions [`compute_sad`] and [`compute_mse`] are used directly for
//! offline evaluation.

mod input;
mod mse;
mod sad;

#[doc(inline)]
pub use input::MattingMetricInput;
#[doc(inline)]
pub use mse::{compute_mse, MseMetric};
#[doc(inline)]
pub use sad::{compute_sad, SadMetric, SAD_SCALE};
