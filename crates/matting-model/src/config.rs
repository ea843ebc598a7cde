//! Configuration structures for the matting network.
//!
//! The encoder and decoder layouts are fixed; only the refinement head is
//! configurable so that a coarse-only network can be trained first and a
//! refined one seeded from it afterwards.

use burn::prelude::*;

use crate::error::{MattingError, MattingResult};

/// Main configuration for [`MattingNet`](crate::MattingNet).
#[derive(Config, Debug)]
pub struct MattingNetConfig {
    /// Refinement head configuration.
    #[config(default = "RefineConfig::new()")]
    pub refine: RefineConfig,
}

/// Refinement head configuration.
#[derive(Config, Debug)]
pub struct RefineConfig {
    /// Build the refinement head. Without it only coarse predictions are available.
    #[config(default = true)]
    pub enabled: bool,
    /// Width of the hidden 3x3 convolutions.
    #[config(default = 64)]
    pub channels: usize,
    /// Number of hidden 3x3 convolution + ReLU layers before the projection.
    #[config(default = 3)]
    pub depth: usize,
}

impl MattingNetConfig {
    /// Configuration of a network without the refinement head.
    pub fn coarse() -> Self {
        Self::new().with_refine(RefineConfig::new().with_enabled(false))
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err(MattingError::InvalidConfiguration)` when an enabled
    /// refinement head has zero width or zero depth.
    pub fn validate(&self) -> MattingResult<()> {
        if !self.refine.enabled {
            return Ok(());
        }

        if self.refine.channels == 0 {
            return Err(MattingError::InvalidConfiguration {
                reason: "refinement width must be positive".to_owned(),
            });
        }

        if self.refine.depth == 0 {
            return Err(MattingError::InvalidConfiguration {
                reason: "refinement head needs at least one hidden layer".to_owned(),
            });
        }

        Ok(())
    }
}
