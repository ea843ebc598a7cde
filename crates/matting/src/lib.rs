//! Deep image matting: a trimap-guided encoder/decoder network with residual
//! refinement, built on Burn.
//!
//! This crate ties the workspace together: backend selection, tracing setup,
//! inference, evaluation and (feature `train`) training.

pub mod backend;
pub mod evaluation;
pub mod inference;
pub mod logging;
#[cfg(feature = "train")]
pub mod training;

#[doc(inline)]
pub use backend::{create_device, get_backend_name, SelectedBackend, SelectedDevice};
#[doc(inline)]
pub use matting_metric as metric;
#[doc(inline)]
pub use matting_model as model;
#[cfg(feature = "train")]
#[doc(inline)]
pub use matting_train as train;
#[doc(inline)]
pub use matting_util as util;
