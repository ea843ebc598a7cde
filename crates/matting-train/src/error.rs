//! Error types of the matting-train crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while indexing or reading a composite dataset.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// A required dataset directory does not exist.
    #[error("Dataset directory not found: {path}")]
    DirectoryNotFound {
        /// The expected directory path.
        path: PathBuf,
    },

    /// Reading a directory failed.
    #[error("Failed to read directory: {path}")]
    DirectoryReadFailed {
        /// The directory path that failed to read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// No foreground has a matching alpha matte.
    #[error("No foreground/alpha pairs found in: {path}")]
    NoValidPairs {
        /// The foreground directory.
        path: PathBuf,
    },

    /// The background directory holds no usable image.
    #[error("No background images found in: {path}")]
    NoBackgrounds {
        /// The background directory.
        path: PathBuf,
    },

    /// Each foreground must be composited over at least one background.
    #[error("Backgrounds per foreground must be at least 1, got {value}")]
    InvalidBackgroundsPerForeground {
        /// The configured value.
        value: usize,
    },

    /// Opening or decoding an image file failed.
    #[error("Failed to open image: {path}")]
    ImageOpenFailed {
        /// The image file path that failed to open.
        path: PathBuf,
        /// The underlying image processing error.
        #[source]
        source: image::ImageError,
    },

    /// A foreground and its alpha matte differ in size.
    #[error("Alpha matte is {alpha:?}, its foreground is {foreground:?}")]
    SizeMismatch {
        /// Foreground `(width, height)`.
        foreground: (u32, u32),
        /// Alpha `(width, height)`.
        alpha: (u32, u32),
    },

    /// A file has no stem (filename without extension).
    #[error("File has no stem: {path}")]
    NoFileStem {
        /// The file path without a stem.
        path: PathBuf,
    },

    /// Path components contain invalid UTF-8.
    #[error("Path contains invalid UTF-8: {path}")]
    InvalidUtf8Path {
        /// The path with invalid UTF-8.
        path: PathBuf,
    },
}

/// A specialized `Result` type for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;
