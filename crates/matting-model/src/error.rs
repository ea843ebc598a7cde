use matting_extra_ops::UnpoolError;
use thiserror::Error;

/// The error type for matting network operations.
///
/// Every variant describes a violated precondition detected before or during
/// a forward pass. None of them are recoverable by retrying the same call.
#[derive(Error, Debug)]
pub enum MattingError {
    /// Error for when an invalid model configuration is provided.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// Error for when an input tensor has an invalid shape.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: String,
    },

    /// Error for when the image and trimap disagree in batch or spatial size.
    #[error("Image {image:?} and trimap {trimap:?} must share batch, height and width")]
    InputSizeMismatch {
        /// Shape of the image tensor.
        image: [usize; 4],
        /// Shape of the trimap tensor.
        trimap: [usize; 4],
    },

    /// Error for when the spatial size cannot be pooled down and unpooled exactly.
    #[error("Spatial size {height}x{width} must be non-zero and divisible by {divisor}")]
    IndivisibleSpatialSize {
        /// Input height.
        height: usize,
        /// Input width.
        width: usize,
        /// Required divisor.
        divisor: usize,
    },

    /// Error for when a skip tensor does not match the unpooled decoder activation.
    #[error("Skip tensor of stage {stage} has shape {skip:?}, decoder activation has {decoder:?}")]
    SkipShapeMismatch {
        /// Encoder stage (1-based) the skip tensor belongs to.
        stage: usize,
        /// Shape of the skip tensor.
        skip: [usize; 4],
        /// Shape of the decoder activation after unpooling.
        decoder: [usize; 4],
    },

    /// Error for when the encoder hands over a different number of stages than the decoder expects.
    #[error("Decoder expects {expected} encoder stages, got {actual}")]
    StageCountMismatch {
        /// Number of decoder stages.
        expected: usize,
        /// Number of encoder stage records received.
        actual: usize,
    },

    /// Error for when a decoder stage cannot invert its pooling.
    #[error("Unpooling stage {stage} failed: {source}")]
    Unpool {
        /// Encoder stage (1-based) whose pooling was inverted.
        stage: usize,
        /// The underlying unpool error.
        #[source]
        source: UnpoolError,
    },

    /// Error for when a refined prediction is requested from a network built without the refinement head.
    #[error("Refined prediction requested but the refinement head is disabled")]
    RefinementUnavailable,
}

/// A specialized `Result` type for matting network operations.
pub type MattingResult<T> = Result<T, MattingError>;
