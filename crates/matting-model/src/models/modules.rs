//! Building blocks shared by the encoder, decoder and refinement head.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d, Relu,
    },
    prelude::*,
};

/// Square convolution with stride 1 and "same" padding.
///
/// Weights use Burn's default initializer, which matches the PyTorch default
/// for convolutions.
pub fn same_conv2d<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    device: &Device<B>,
) -> Conv2d<B> {
    let padding = kernel_size / 2;
    Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
        .with_stride([1, 1])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(true)
        .init(device)
}

/// Convolution followed by ReLU.
#[derive(Module, Debug)]
pub struct ConvRelu<B: Backend> {
    pub(crate) conv: Conv2d<B>,
    relu: Relu,
}

impl<B: Backend> ConvRelu<B> {
    /// Create a new convolution + ReLU layer preserving spatial size.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        device: &Device<B>,
    ) -> Self {
        Self {
            conv: same_conv2d(in_channels, out_channels, kernel_size, device),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.relu.forward(self.conv.forward(input))
    }

    /// Replace the convolution, keeping the activation.
    pub(crate) fn map_conv(self, map: impl FnOnce(Conv2d<B>) -> Conv2d<B>) -> Self {
        Self {
            conv: map(self.conv),
            relu: self.relu,
        }
    }
}
