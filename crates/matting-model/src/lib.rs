//! # Matting Model
//!
//! Encoder/decoder image matting network built on Burn.
//!
//! An RGB image and a trimap go in, an alpha matte comes out. The encoder is a
//! VGG16-style stack whose max pools remember where each maximum came from;
//! the decoder unpools with those positions and adds the encoder activations
//! back in. A small refinement head then corrects the decoder's logit.
//!
//! ## Modules
//!
//! - `config`: network configuration, including the refinement head.
//! - `error`: error types for construction and forward passes.
//! - `models`: encoder, decoder, refinement head and the assembled [`MattingNet`].
//! - `trimap`: trimap classes and their encoding as a network input.
//! - `migrate`: lenient weight transfer between related network revisions.
//! - `loss`: the alpha prediction loss.
//! - `training`: batch and output types plus the Burn training steps (feature `train`).

mod config;
mod error;
mod loss;
mod migrate;
mod models;
mod trimap;

#[cfg(feature = "train")]
pub mod training;

#[doc(inline)]
pub use config::{MattingNetConfig, RefineConfig};
#[doc(inline)]
pub use error::{MattingError, MattingResult};
#[doc(inline)]
pub use loss::{AlphaLoss, AlphaLossConfig};
#[doc(inline)]
pub use migrate::{MigrationReport, ParamMap};
#[doc(inline)]
pub use models::{
    decoder::{fuse_skip, Decoder, DECODER_STAGES},
    encoder::{Encoder, EncoderOutput, StageRecord, BOTTLENECK_CHANNELS, ENCODER_STAGES, ENCODER_STRIDE},
    matting_net::{
        combine_logits, validate_inputs, ForwardMode, MattingNet, MattingNetRecord,
        MattingPrediction, IMAGE_CHANNELS, NETWORK_IN_CHANNELS,
    },
    refiner::Refiner,
};
#[doc(inline)]
pub use trimap::{encode_trimap, trimap_from_classes, unknown_region, TrimapClass, TRIMAP_CLASSES};
#[cfg(feature = "train")]
#[doc(inline)]
pub use training::{MattingBatch, MattingOutput};

#[cfg(test)]
mod tests {
    use burn::backend::{Autodiff, NdArray};

    pub type TestBackend = NdArray;

    pub type TestAutodiffBackend = Autodiff<TestBackend>;
}
