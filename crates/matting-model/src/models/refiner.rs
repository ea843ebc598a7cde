//! Residual refinement head.
//!
//! Sees the RGB image next to the coarse alpha and predicts a logit-space
//! correction that is added to the raw decoder logit.

use burn::{nn::conv::Conv2d, prelude::*};

use super::modules::{same_conv2d, ConvRelu};
use crate::{config::RefineConfig, migrate::NamedConv};

/// Channels of the refinement input: RGB plus the coarse alpha.
pub const REFINER_IN_CHANNELS: usize = 4;

/// The refinement head.
#[derive(Module, Debug)]
pub struct Refiner<B: Backend> {
    pub(crate) layers: Vec<ConvRelu<B>>,
    pub(crate) predict: Conv2d<B>,
}

impl RefineConfig {
    /// Initialize the refinement head. The `enabled` flag is handled by the caller.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> Refiner<B> {
        let mut layers = Vec::with_capacity(self.depth);
        let mut current_channels = REFINER_IN_CHANNELS;

        for _ in 0..self.depth {
            layers.push(ConvRelu::new(current_channels, self.channels, 3, device));
            current_channels = self.channels;
        }

        Refiner {
            layers,
            predict: same_conv2d(current_channels, 1, 3, device),
        }
    }
}

impl<B: Backend> Refiner<B> {
    /// Predicts the refinement logit.
    ///
    /// # Shapes
    /// - rgb: `[batch, 3, height, width]`
    /// - coarse_alpha: `[batch, 1, height, width]`, already squashed to [0, 1]
    /// - output: `[batch, 1, height, width]`
    pub fn forward(&self, rgb: Tensor<B, 4>, coarse_alpha: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = Tensor::cat(vec![rgb, coarse_alpha], 1);

        for layer in &self.layers {
            x = layer.forward(x);
        }

        self.predict.forward(x)
    }

    pub(crate) fn named_convs(&self) -> Vec<NamedConv<'_, B>> {
        let mut convs: Vec<_> = self
            .layers
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                NamedConv::new(
                    format!("refine_conv{}", i + 1),
                    format!("layers.{i}.conv"),
                    &layer.conv,
                )
            })
            .collect();
        convs.push(NamedConv::new(
            "refine_pred".to_owned(),
            "predict".to_owned(),
            &self.predict,
        ));

        convs
    }

    pub(crate) fn map_named_convs<F>(self, map: &mut F) -> Self
    where
        F: FnMut(&str, Conv2d<B>) -> Conv2d<B>,
    {
        let mut layers = Vec::with_capacity(self.layers.len());
        for (i, layer) in self.layers.into_iter().enumerate() {
            let name = format!("refine_conv{}", i + 1);
            layers.push(layer.map_conv(|conv| map(&name, conv)));
        }

        Self {
            layers,
            predict: map("refine_pred", self.predict),
        }
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::Distribution;

    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn refiner_outputs_single_channel_logit_at_input_resolution() {
        let device = Default::default();
        let refiner = RefineConfig::new().init::<TestBackend>(&device);
        let rgb = Tensor::<TestBackend, 4>::random([2, 3, 16, 24], Distribution::Default, &device);
        let alpha =
            Tensor::<TestBackend, 4>::random([2, 1, 16, 24], Distribution::Default, &device);

        assert_eq!(refiner.forward(rgb, alpha).dims(), [2, 1, 16, 24]);
    }

    #[test]
    fn refiner_depth_controls_hidden_layers() {
        let device = Default::default();
        let refiner = RefineConfig::new()
            .with_depth(5)
            .with_channels(16)
            .init::<TestBackend>(&device);

        let names: Vec<String> = refiner
            .named_convs()
            .into_iter()
            .map(|named| named.name)
            .collect();

        assert_eq!(names.len(), 6);
        assert_eq!(names[4], "refine_conv5");
        assert_eq!(names[5], "refine_pred");
    }
}
