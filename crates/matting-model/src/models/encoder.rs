//! VGG16-style encoder with index-preserving pooling.
//!
//! Stages 1 to 5 end in a 2x2 max pool and hand their pre-pool activation and
//! pooling indices to the decoder as a [`StageRecord`]. Stage 6 is a single
//! convolution without pooling.

use burn::{nn::conv::Conv2d, prelude::*};
use matting_extra_ops::{MaxPool2dWithIndices, MaxPool2dWithIndicesConfig, PoolIndices};

use super::modules::ConvRelu;
use crate::migrate::NamedConv;

/// Output channels of the 3x3 convolutions of each pooled stage.
pub const ENCODER_STAGES: [&[usize]; 5] = [
    &[64, 64],
    &[128, 128],
    &[256, 256, 256],
    &[512, 512, 512],
    &[512, 512, 512],
];

/// Output channels of the stage-6 convolution.
pub const BOTTLENECK_CHANNELS: usize = 512;

/// Spatial downsampling factor of the encoder.
pub const ENCODER_STRIDE: usize = 1 << ENCODER_STAGES.len();

/// What a pooled encoder stage leaves behind for its decoder counterpart.
#[derive(Debug, Clone)]
pub struct StageRecord<B: Backend> {
    /// Activation before pooling.
    pub skip: Tensor<B, 4>,
    /// Argmax positions of the pooling.
    pub indices: PoolIndices<B>,
}

impl<B: Backend> StageRecord<B> {
    pub const fn new(skip: Tensor<B, 4>, indices: PoolIndices<B>) -> Self {
        Self { skip, indices }
    }
}

/// Encoder output: the stage-6 activation and one record per pooled stage,
/// ordered from the shallowest stage to the deepest.
#[derive(Debug, Clone)]
pub struct EncoderOutput<B: Backend> {
    pub features: Tensor<B, 4>,
    pub stages: Vec<StageRecord<B>>,
}

/// A pooled encoder stage.
#[derive(Module, Debug)]
pub struct EncoderStage<B: Backend> {
    pub(crate) layers: Vec<ConvRelu<B>>,
    pool: MaxPool2dWithIndices,
}

impl<B: Backend> EncoderStage<B> {
    /// Create a stage of 3x3 convolutions followed by a 2x2 pool.
    pub fn new(in_channels: usize, out_channels: &[usize], device: &Device<B>) -> Self {
        let mut layers = Vec::with_capacity(out_channels.len());
        let mut current_channels = in_channels;

        for &channels in out_channels {
            layers.push(ConvRelu::new(current_channels, channels, 3, device));
            current_channels = channels;
        }

        Self {
            layers,
            pool: MaxPool2dWithIndicesConfig::new().init(),
        }
    }

    /// Returns the pooled activation and the record of this stage.
    pub fn forward(&self, mut input: Tensor<B, 4>) -> (Tensor<B, 4>, StageRecord<B>) {
        for layer in &self.layers {
            input = layer.forward(input);
        }

        let (pooled, indices) = self.pool.forward(input.clone());
        (pooled, StageRecord::new(input, indices))
    }
}

/// The encoder.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    pub(crate) stages: Vec<EncoderStage<B>>,
    pub(crate) bottleneck: ConvRelu<B>,
}

impl<B: Backend> Encoder<B> {
    /// Create the encoder for inputs with `in_channels` channels.
    pub fn new(in_channels: usize, device: &Device<B>) -> Self {
        let mut stages = Vec::with_capacity(ENCODER_STAGES.len());
        let mut current_channels = in_channels;

        for out_channels in ENCODER_STAGES {
            stages.push(EncoderStage::new(current_channels, out_channels, device));
            current_channels = out_channels[out_channels.len() - 1];
        }

        Self {
            stages,
            bottleneck: ConvRelu::new(current_channels, BOTTLENECK_CHANNELS, 3, device),
        }
    }

    /// # Shapes
    /// - input: `[batch, in_channels, height, width]`, height and width divisible by [`ENCODER_STRIDE`]
    /// - features: `[batch, 512, height / 32, width / 32]`
    pub fn forward(&self, input: Tensor<B, 4>) -> EncoderOutput<B> {
        let mut x = input;
        let mut records = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let (pooled, record) = stage.forward(x);
            records.push(record);
            x = pooled;
        }

        EncoderOutput {
            features: self.bottleneck.forward(x),
            stages: records,
        }
    }

    fn layer_name(stage: usize, layer: usize) -> String {
        format!("conv{}_{}", stage + 1, layer + 1)
    }

    pub(crate) fn named_convs(&self) -> Vec<NamedConv<'_, B>> {
        let mut convs = Vec::new();

        for (s, stage) in self.stages.iter().enumerate() {
            for (l, layer) in stage.layers.iter().enumerate() {
                convs.push(NamedConv::new(
                    Self::layer_name(s, l),
                    format!("stages.{s}.layers.{l}.conv"),
                    &layer.conv,
                ));
            }
        }
        convs.push(NamedConv::new(
            Self::layer_name(self.stages.len(), 0),
            "bottleneck.conv".to_owned(),
            &self.bottleneck.conv,
        ));

        convs
    }

    pub(crate) fn map_named_convs<F>(self, map: &mut F) -> Self
    where
        F: FnMut(&str, Conv2d<B>) -> Conv2d<B>,
    {
        let bottleneck_name = Self::layer_name(self.stages.len(), 0);
        let mut stages = Vec::with_capacity(self.stages.len());

        for (s, stage) in self.stages.into_iter().enumerate() {
            let mut layers = Vec::with_capacity(stage.layers.len());
            for (l, layer) in stage.layers.into_iter().enumerate() {
                let name = Self::layer_name(s, l);
                layers.push(layer.map_conv(|conv| map(&name, conv)));
            }
            stages.push(EncoderStage {
                layers,
                pool: stage.pool,
            });
        }

        Self {
            stages,
            bottleneck: self.bottleneck.map_conv(|conv| map(&bottleneck_name, conv)),
        }
    }
}
