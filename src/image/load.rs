//! Image loading and encoding.

use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array4;

use crate::error::{Error, Result};

use super::{StyleTensor, RGB_CHANNELS};

/// Load an image from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path = path.as_ref();

    image::open(path).map_err(|source| Error::ImageLoad {
        path: path.to_path_buf(),
        source,
    })
}

/// Target `(height, width)` with the longer side equal to `max_dim`.
///
/// Integer arithmetic truncates toward zero; a side never shrinks below one pixel.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn scaled_dims(height: u32, width: u32, max_dim: u32) -> (u32, u32) {
    let longest = u64::from(height.max(width));
    let scale = |side: u32| -> u32 {
        // Safe: side <= longest, so the quotient is <= max_dim
        ((u64::from(side) * u64::from(max_dim)) / longest).max(1) as u32
    };
    (scale(height), scale(width))
}

/// Convert a `DynamicImage` to a normalized NHWC tensor.
pub(crate) fn image_to_tensor(img: &DynamicImage, max_dim: u32) -> Result<StyleTensor> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::shape(
            "non-empty image",
            format!("{width}x{height} image"),
        ));
    }

    let (new_height, new_width) = scaled_dims(height, width, max_dim);
    tracing::debug!("Resizing {width}x{height} -> {new_width}x{new_height}");

    // Alpha and grayscale inputs are coerced to three 8-bit channels
    let rgb = img.to_rgb8();
    let resized = image::imageops::resize(&rgb, new_width, new_height, FilterType::Triangle);

    let (h, w) = (new_height as usize, new_width as usize);
    let data: Vec<f32> = resized
        .into_raw()
        .into_iter()
        .map(|v| f32::from(v) / 255.0)
        .collect();

    let array = Array4::from_shape_vec((1, h, w, RGB_CHANNELS), data)
        .map_err(|e| Error::shape(format!("[1, {h}, {w}, 3]"), e.to_string()))?;

    StyleTensor::new(array)
}
