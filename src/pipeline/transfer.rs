//! Style transfer orchestration.

use std::path::PathBuf;

use image::{DynamicImage, RgbImage};

use crate::error::{Error, Result};
use crate::image::{ImageCodec, StyleTensor, DEFAULT_MAX_DIM};
use crate::model::{ModelHandle, DEFAULT_MODEL_DIR, DEFAULT_MODEL_URL};

/// Configuration for the style transfer service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the compressed model archive is downloaded from.
    pub model_url: String,

    /// Local directory holding the unpacked model.
    pub model_dir: PathBuf,

    /// Longer side of every encoded image.
    pub max_dim: u32,

    /// Whether to draw a progress bar during the model download.
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_url: DEFAULT_MODEL_URL.to_string(),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            max_dim: DEFAULT_MAX_DIM,
            show_progress: true,
        }
    }
}

impl Config {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.max_dim == 0 {
            return Err(Error::InvalidParameter {
                name: "max_dim".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.model_url.trim().is_empty() {
            return Err(Error::InvalidParameter {
                name: "model_url".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        if self.model_dir.as_os_str().is_empty() {
            return Err(Error::InvalidParameter {
                name: "model_dir".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Applies the style of one image to the content of another.
#[derive(Debug)]
pub struct StyleTransferService {
    codec: ImageCodec,
    model: ModelHandle,
}

impl StyleTransferService {
    /// Create a service with the given configuration.
    ///
    /// The model is not fetched or loaded until the first [`run`](Self::run)
    /// with both images present.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        tracing::debug!("Initializing style transfer with config: {config:?}");

        let codec = ImageCodec::new(config.max_dim)?;
        let model = ModelHandle::remote(config.model_url, config.model_dir, config.show_progress);

        Ok(Self::with_model(codec, model))
    }

    /// Create a service around an existing codec and model handle.
    #[must_use]
    pub const fn with_model(codec: ImageCodec, model: ModelHandle) -> Self {
        Self { codec, model }
    }

    #[must_use]
    pub const fn codec(&self) -> &ImageCodec {
        &self.codec
    }

    #[must_use]
    pub const fn model(&self) -> &ModelHandle {
        &self.model
    }

    /// Stylize `content` with `style`.
    ///
    /// Returns `Ok(None)` without touching the model when either image is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if model acquisition, inference, or tensor conversion fails.
    pub fn run(
        &self,
        content: Option<&DynamicImage>,
        style: Option<&DynamicImage>,
    ) -> Result<Option<RgbImage>> {
        let (Some(content), Some(style)) = (content, style) else {
            tracing::warn!("Content or style image missing, nothing to do");
            return Ok(None);
        };

        self.stylize(content, style).map(Some)
    }

    /// Stylize two present images.
    ///
    /// # Errors
    ///
    /// Returns an error if model acquisition, inference, or tensor conversion fails.
    pub fn stylize(&self, content: &DynamicImage, style: &DynamicImage) -> Result<RgbImage> {
        tracing::info!("Processing images...");
        let content_tensor = self.codec.encode(content)?;
        let style_tensor = self.codec.encode(style)?;
        tracing::debug!(
            "Content tensor {:?}, style tensor {:?}",
            content_tensor.shape(),
            style_tensor.shape()
        );

        let output = self.infer(&content_tensor, &style_tensor)?;

        tracing::info!("Decoding stylized image...");
        self.codec.decode_raw(output)
    }

    fn infer(&self, content: &StyleTensor, style: &StyleTensor) -> Result<ndarray::ArrayD<f32>> {
        let model = self.model.get()?;

        tracing::info!("Applying style transfer...");
        model
            .infer(content, style)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::shape("stylized image output", "no output"))
    }
}
