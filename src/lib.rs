//! # `stylize`
//!
//! Single-shot artistic style transfer: render the structure of a content image
//! in the visual texture of a style image.
//!
//! The pretrained network is downloaded as a compressed archive on first use,
//! unpacked into a local directory, and loaded once for the life of the process.
//!
//! ## Example
//!
//! ```no_run
//! use stylize::{Config, StyleTransferService};
//!
//! # fn main() -> stylize::Result<()> {
//! let service = StyleTransferService::new(Config::default())?;
//!
//! let content = image::open("content.jpg").expect("content image");
//! let style = image::open("style.jpg").expect("style image");
//!
//! if let Some(stylized) = service.run(Some(&content), Some(&style))? {
//!     stylize::image::save_image(&stylized, "stylized.png", 95)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod image;
pub mod model;
pub mod pipeline;

use ::image::{DynamicImage, RgbImage};
use once_cell::sync::Lazy;

pub use error::{Error, Result};
pub use crate::image::{ImageCodec, StyleTensor};
pub use model::{ModelHandle, ModelStore};
pub use pipeline::{Config, StyleTransferService};

static SERVICE: Lazy<StyleTransferService> = Lazy::new(|| {
    StyleTransferService::with_model(
        ImageCodec::default(),
        ModelHandle::remote(model::DEFAULT_MODEL_URL, model::DEFAULT_MODEL_DIR, true),
    )
});

/// Stylize `content` with `style` using the process-wide default service.
///
/// Returns `Ok(None)` when either image is missing.
///
/// # Errors
///
/// Returns an error if the model cannot be fetched or loaded, or inference fails.
pub fn perform_style_transfer(
    content: Option<&DynamicImage>,
    style: Option<&DynamicImage>,
) -> Result<Option<RgbImage>> {
    SERVICE.run(content, style)
}
