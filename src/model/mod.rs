//! Model acquisition and loading.

mod loader;
mod store;

pub use loader::{ModelHandle, OnnxStyleModel, StyleModel, MODEL_FILENAME};
pub use store::{
    is_complete, Download, Fetch, HttpFetcher, ModelStore, ARCHIVE_NAME, COMPLETE_MARKER,
    CONNECT_TIMEOUT,
};

/// Compressed arbitrary-image-stylization model.
///
/// This archive is a TensorFlow SavedModel; loading it fails with
/// [`Error::UnsupportedModelFormat`](crate::Error::UnsupportedModelFormat)
/// until an ONNX archive URL is configured.
pub const DEFAULT_MODEL_URL: &str =
    "https://tfhub.dev/google/magenta/arbitrary-image-stylization-v1-256/2?tf-hub-format=compressed";

/// Local directory the model is unpacked into.
pub const DEFAULT_MODEL_DIR: &str = "model";
