//! # Matting Network
//!
//! Predicts an alpha matte from an RGB image and a trimap in two passes:
//!
//! 1. The trimap is reduced to one channel and concatenated to the image. The
//!    encoder/decoder turns this 4-channel input into a raw alpha logit.
//! 2. The refinement head looks at the RGB image and `sigmoid(raw)` and predicts
//!    a logit correction. The final matte is `sigmoid(raw + correction)`.
//!
//! Which passes run is chosen per call through [`ForwardMode`].

use burn::{nn::conv::Conv2d, prelude::*, tensor::activation::sigmoid};

use super::{
    decoder::Decoder,
    encoder::{Encoder, ENCODER_STRIDE},
    refiner::Refiner,
};
use crate::{
    config::MattingNetConfig,
    error::{MattingError, MattingResult},
    migrate::NamedConv,
    trimap::{encode_trimap, TRIMAP_CLASSES},
};

/// Channels of the image input.
pub const IMAGE_CHANNELS: usize = 3;

/// Channels entering the encoder: RGB plus the encoded trimap.
pub const NETWORK_IN_CHANNELS: usize = IMAGE_CHANNELS + 1;

/// Which passes of the network a forward call runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    /// Encoder/decoder only; the matte is `sigmoid(raw)`.
    Coarse,
    /// Encoder/decoder and refinement head; the matte is `sigmoid(raw + refinement)`.
    Refined,
}

/// Every intermediate a forward call produces.
#[derive(Debug, Clone)]
pub struct MattingPrediction<B: Backend> {
    /// Raw alpha logit from the decoder.
    pub raw: Tensor<B, 4>,
    /// Refinement logit, present in [`ForwardMode::Refined`].
    pub refinement: Option<Tensor<B, 4>>,
    /// Final alpha matte in [0, 1].
    pub alpha: Tensor<B, 4>,
}

/// Final matte from the raw and refinement logits.
///
/// The logits are summed before squashing so the refinement acts as a
/// correction in logit space.
pub fn combine_logits<B: Backend>(raw: Tensor<B, 4>, refinement: Tensor<B, 4>) -> Tensor<B, 4> {
    sigmoid(raw + refinement)
}

/// Checks the preconditions of a forward call.
///
/// # Errors
///
/// - [`MattingError::InvalidTensorShape`] for an empty batch or wrong channel counts,
/// - [`MattingError::InputSizeMismatch`] when image and trimap differ in batch or spatial size,
/// - [`MattingError::IndivisibleSpatialSize`] when height or width is zero or not divisible by 32.
pub fn validate_inputs<B: Backend>(
    image: &Tensor<B, 4>,
    trimap: &Tensor<B, 4>,
) -> MattingResult<()> {
    let image_dims = image.dims();
    let trimap_dims = trimap.dims();
    let [batch, channels, height, width] = image_dims;

    if batch == 0 || channels != IMAGE_CHANNELS {
        return Err(MattingError::InvalidTensorShape {
            expected: format!("image [N > 0, {IMAGE_CHANNELS}, H, W]"),
            actual: format!("{image_dims:?}"),
        });
    }
    if trimap_dims[1] != TRIMAP_CLASSES {
        return Err(MattingError::InvalidTensorShape {
            expected: format!("trimap [N, {TRIMAP_CLASSES}, H, W]"),
            actual: format!("{trimap_dims:?}"),
        });
    }
    if trimap_dims[0] != batch || trimap_dims[2] != height || trimap_dims[3] != width {
        return Err(MattingError::InputSizeMismatch {
            image: image_dims,
            trimap: trimap_dims,
        });
    }
    if height == 0 || width == 0 || height % ENCODER_STRIDE != 0 || width % ENCODER_STRIDE != 0 {
        return Err(MattingError::IndivisibleSpatialSize {
            height,
            width,
            divisor: ENCODER_STRIDE,
        });
    }

    Ok(())
}

impl MattingNetConfig {
    /// Initializes a [`MattingNet`] with random weights.
    ///
    /// # Errors
    ///
    /// Returns `Err(MattingError::InvalidConfiguration)` if the configuration is invalid.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> MattingResult<MattingNet<B>> {
        self.validate()?;

        Ok(MattingNet {
            encoder: Encoder::new(NETWORK_IN_CHANNELS, device),
            decoder: Decoder::new(device),
            refiner: self.refine.enabled.then(|| self.refine.init(device)),
        })
    }
}

/// The matting network.
#[derive(Module, Debug)]
pub struct MattingNet<B: Backend> {
    pub(crate) encoder: Encoder<B>,
    pub(crate) decoder: Decoder<B>,
    pub(crate) refiner: Option<Refiner<B>>,
}

impl<B: Backend> MattingNet<B> {
    /// Whether the refinement head was built.
    pub const fn has_refiner(&self) -> bool {
        self.refiner.is_some()
    }

    /// [`ForwardMode::Refined`] when the refinement head exists, otherwise [`ForwardMode::Coarse`].
    pub const fn default_mode(&self) -> ForwardMode {
        if self.has_refiner() {
            ForwardMode::Refined
        } else {
            ForwardMode::Coarse
        }
    }

    /// Predicts the alpha matte using [`Self::default_mode`].
    ///
    /// # Shapes
    /// - image: `[batch, 3, height, width]`, ImageNet-normalized
    /// - trimap: `[batch, 3, height, width]`, one-hot or soft class scores
    /// - output: `[batch, 1, height, width]` in [0, 1]
    ///
    /// # Errors
    ///
    /// See [`validate_inputs`] and [`Self::predict`].
    pub fn forward(&self, image: Tensor<B, 4>, trimap: Tensor<B, 4>) -> MattingResult<Tensor<B, 4>> {
        self.forward_with_mode(image, trimap, self.default_mode())
    }

    /// Predicts the alpha matte running the passes selected by `mode`.
    ///
    /// # Errors
    ///
    /// See [`Self::predict`].
    pub fn forward_with_mode(
        &self,
        image: Tensor<B, 4>,
        trimap: Tensor<B, 4>,
        mode: ForwardMode,
    ) -> MattingResult<Tensor<B, 4>> {
        Ok(self.predict(image, trimap, mode)?.alpha)
    }

    /// Runs the network and returns every intermediate logit.
    ///
    /// # Errors
    ///
    /// Returns an error when the inputs violate [`validate_inputs`], when a
    /// decoder stage cannot be matched with its encoder stage, or when
    /// [`ForwardMode::Refined`] is requested without a refinement head.
    pub fn predict(
        &self,
        image: Tensor<B, 4>,
        trimap: Tensor<B, 4>,
        mode: ForwardMode,
    ) -> MattingResult<MattingPrediction<B>> {
        validate_inputs(&image, &trimap)?;

        let refiner = match mode {
            ForwardMode::Coarse => None,
            ForwardMode::Refined => Some(
                self.refiner
                    .as_ref()
                    .ok_or(MattingError::RefinementUnavailable)?,
            ),
        };

        let input = Tensor::cat(vec![image.clone(), encode_trimap(trimap)], 1);
        let raw = self.decoder.forward(self.encoder.forward(input))?;
        let coarse = sigmoid(raw.clone());

        let Some(refiner) = refiner else {
            return Ok(MattingPrediction {
                raw,
                refinement: None,
                alpha: coarse,
            });
        };

        let refinement = refiner.forward(image, coarse);
        let alpha = combine_logits(raw.clone(), refinement.clone());

        Ok(MattingPrediction {
            raw,
            refinement: Some(refinement),
            alpha,
        })
    }

    /// Every convolution under its canonical name, with its module path.
    pub(crate) fn named_convs(&self) -> Vec<NamedConv<'_, B>> {
        let mut convs = Vec::new();

        let encoder = self.encoder.named_convs();
        let decoder = self.decoder.named_convs();
        let refiner = self
            .refiner
            .as_ref()
            .map(Refiner::named_convs)
            .unwrap_or_default();

        for (prefix, group) in [("encoder", encoder), ("decoder", decoder), ("refiner", refiner)] {
            convs.extend(group.into_iter().map(|named| named.with_prefix(prefix)));
        }

        convs
    }

    /// Rebuilds the network, passing every convolution through `map` with its canonical name.
    pub(crate) fn map_named_convs<F>(self, map: &mut F) -> Self
    where
        F: FnMut(&str, Conv2d<B>) -> Conv2d<B>,
    {
        Self {
            encoder: self.encoder.map_named_convs(map),
            decoder: self.decoder.map_named_convs(map),
            refiner: self.refiner.map(|refiner| refiner.map_named_convs(map)),
        }
    }
}
