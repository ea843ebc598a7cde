//! Decoder mirroring the encoder.
//!
//! Each stage unpools with the indices recorded by its encoder counterpart,
//! adds the counterpart's skip tensor and applies a 5x5 convolution. The last
//! stage is projected to a single-channel alpha logit.

use burn::{nn::conv::Conv2d, prelude::*};
use matting_extra_ops::max_unpool2d;

use super::{
    encoder::{EncoderOutput, BOTTLENECK_CHANNELS},
    modules::{same_conv2d, ConvRelu},
};
use crate::{
    error::{MattingError, MattingResult},
    migrate::NamedConv,
};

/// Output channels of the 5x5 convolutions of decoder stages 5d to 1d.
pub const DECODER_STAGES: [usize; 5] = [512, 256, 128, 64, 64];

/// Adds a skip tensor to the unpooled decoder activation of the same stage.
///
/// # Errors
///
/// Returns [`MattingError::SkipShapeMismatch`] when the shapes differ.
pub fn fuse_skip<B: Backend>(
    decoded: Tensor<B, 4>,
    skip: Tensor<B, 4>,
    stage: usize,
) -> MattingResult<Tensor<B, 4>> {
    let decoder_dims = decoded.dims();
    let skip_dims = skip.dims();

    if decoder_dims != skip_dims {
        return Err(MattingError::SkipShapeMismatch {
            stage,
            skip: skip_dims,
            decoder: decoder_dims,
        });
    }

    Ok(decoded + skip)
}

/// The decoder.
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    /// Stage 6d, 1x1 channel mixing.
    pub(crate) bottleneck: ConvRelu<B>,
    /// Stages 5d to 1d.
    pub(crate) stages: Vec<ConvRelu<B>>,
    /// Projection to the raw alpha logit.
    pub(crate) predict: Conv2d<B>,
}

impl<B: Backend> Decoder<B> {
    pub fn new(device: &Device<B>) -> Self {
        let mut stages = Vec::with_capacity(DECODER_STAGES.len());
        let mut current_channels = BOTTLENECK_CHANNELS;

        for channels in DECODER_STAGES {
            stages.push(ConvRelu::new(current_channels, channels, 5, device));
            current_channels = channels;
        }

        Self {
            bottleneck: ConvRelu::new(BOTTLENECK_CHANNELS, BOTTLENECK_CHANNELS, 1, device),
            stages,
            predict: same_conv2d(current_channels, 1, 5, device),
        }
    }

    /// Decodes the encoder output into the raw alpha logit.
    ///
    /// # Shapes
    /// - output: `[batch, 1, height, width]` at the encoder input resolution
    ///
    /// # Errors
    ///
    /// Fails when the number of stage records differs from the number of
    /// decoder stages, when a pooling cannot be inverted, or when a skip
    /// tensor does not match its unpooled activation.
    pub fn forward(&self, encoded: EncoderOutput<B>) -> MattingResult<Tensor<B, 4>> {
        let EncoderOutput { features, stages } = encoded;

        if stages.len() != self.stages.len() {
            return Err(MattingError::StageCountMismatch {
                expected: self.stages.len(),
                actual: stages.len(),
            });
        }

        let mut x = self.bottleneck.forward(features);

        for (block, (level, record)) in self
            .stages
            .iter()
            .zip(stages.into_iter().enumerate().rev())
        {
            let stage = level + 1;
            let unpooled = max_unpool2d(x, &record.indices)
                .map_err(|source| MattingError::Unpool { stage, source })?;
            let fused = fuse_skip(unpooled, record.skip, stage)?;
            x = block.forward(fused);
        }

        Ok(self.predict.forward(x))
    }

    fn stage_name(&self, index: usize) -> String {
        format!("deconv{}_1", self.stages.len() - index)
    }

    pub(crate) fn named_convs(&self) -> Vec<NamedConv<'_, B>> {
        let mut convs = Vec::with_capacity(self.stages.len() + 2);

        convs.push(NamedConv::new(
            format!("deconv{}_1", self.stages.len() + 1),
            "bottleneck.conv".to_owned(),
            &self.bottleneck.conv,
        ));
        for (i, stage) in self.stages.iter().enumerate() {
            convs.push(NamedConv::new(
                self.stage_name(i),
                format!("stages.{i}.conv"),
                &stage.conv,
            ));
        }
        convs.push(NamedConv::new(
            "deconv1".to_owned(),
            "predict".to_owned(),
            &self.predict,
        ));

        convs
    }

    pub(crate) fn map_named_convs<F>(self, map: &mut F) -> Self
    where
        F: FnMut(&str, Conv2d<B>) -> Conv2d<B>,
    {
        let names: Vec<String> = (0..self.stages.len()).map(|i| self.stage_name(i)).collect();
        let bottleneck_name = format!("deconv{}_1", self.stages.len() + 1);

        let bottleneck = self
            .bottleneck
            .map_conv(|conv| map(&bottleneck_name, conv));

        let mut stages = Vec::with_capacity(self.stages.len());
        for (stage, name) in self.stages.into_iter().zip(names) {
            stages.push(stage.map_conv(|conv| map(&name, conv)));
        }

        Self {
            bottleneck,
            stages,
            predict: map("deconv1", self.predict),
        }
    }
}
