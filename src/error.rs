//! Custom error types for stylize.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the stylize library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to load an image file.
    #[error("failed to load image from {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to save an image file.
    #[error("failed to save image to {path}: {source}")]
    ImageSave {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The request for the model archive could not be sent or answered.
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The remote answered with a non-success status.
    #[error("failed to fetch {url}: server returned status {status}")]
    FetchStatus { url: String, status: u16 },

    /// The response body broke off or could not be written locally.
    #[error("failed to transfer {url}: {source}")]
    Transfer {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// The downloaded archive is corrupt or could not be unpacked.
    #[error("failed to extract model archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to prepare the local model directory.
    #[error("failed to prepare model directory {path}: {source}")]
    ModelDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The model directory holds no loadable graph.
    #[error("no ONNX model file found under {path}")]
    MissingModelFile { path: PathBuf },

    /// The model directory holds a format ONNX Runtime cannot load.
    #[error("unsupported model format at {path}: {reason}")]
    UnsupportedModelFormat { path: PathBuf, reason: String },

    /// Failed to load an ONNX model.
    #[error("failed to load ONNX model {name}: {source}")]
    ModelLoad {
        name: String,
        #[source]
        source: ort::Error,
    },

    /// Model inference failed.
    #[error("model inference failed: {source}")]
    Inference {
        #[source]
        source: ort::Error,
    },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shape mismatch in tensor operations.
    #[error("tensor shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },
}

impl Error {
    /// Whether the remote model source could not be reached or read.
    #[must_use]
    pub const fn is_fetch(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::FetchStatus { .. } | Self::Transfer { .. }
        )
    }

    /// Whether the model archive could not be unpacked.
    #[must_use]
    pub const fn is_archive(&self) -> bool {
        matches!(self, Self::Archive { .. })
    }

    /// Whether a tensor or image had an unusable shape.
    #[must_use]
    pub const fn is_shape(&self) -> bool {
        matches!(self, Self::ShapeMismatch { .. })
    }

    pub(crate) fn shape(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Result type alias for stylize operations.
pub type Result<T> = std::result::Result<T, Error>;
