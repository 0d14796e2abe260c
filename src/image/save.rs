//! Image decoding and saving.

use std::path::Path;

use image::{ImageBuffer, Rgb, RgbImage};

use crate::error::{Error, Result};

use super::StyleTensor;

/// Save a decoded image to disk.
///
/// The format is inferred from the extension; `quality` applies to JPEG only.
///
/// # Errors
///
/// Returns an error if the image cannot be saved.
pub fn save_image<P: AsRef<Path>>(image: &RgbImage, path: P, quality: u8) -> Result<()> {
    let path = path.as_ref();

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png")
        .to_lowercase();

    match extension.as_str() {
        "jpg" | "jpeg" => {
            let mut output = std::fs::File::create(path)?;
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, quality);
            image
                .write_with_encoder(encoder)
                .map_err(|source| Error::ImageSave {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        _ => {
            image.save(path).map_err(|source| Error::ImageSave {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }

    Ok(())
}

/// Convert an NHWC tensor to an RGB image, dropping the batch axis.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn tensor_to_image(tensor: &StyleTensor) -> RgbImage {
    let view = tensor.view();
    let (_, height, width, _) = view.dim();

    // Safe: StyleTensor dimensions come from u32 image sizes or model outputs
    // small enough to address in memory
    ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([
            denormalize(view[[0, y, x, 0]]),
            denormalize(view[[0, y, x, 1]]),
            denormalize(view[[0, y, x, 2]]),
        ])
    })
}

/// Denormalize a value from [0, 1] to [0, 255], rounding half away from zero.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn denormalize(value: f32) -> u8 {
    // Safe: clamped to [0, 255] range before casting; NaN casts to 0
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn test_denormalize() {
        assert_eq!(denormalize(0.0), 0);
        assert_eq!(denormalize(0.5), 128);
        assert_eq!(denormalize(1.0), 255);
        assert_eq!(denormalize(0.2), 51);
    }

    #[test]
    fn test_denormalize_clamp() {
        assert_eq!(denormalize(-2.0), 0);
        assert_eq!(denormalize(2.0), 255);
        assert_eq!(denormalize(f32::NAN), 0);
    }

    #[test]
    fn test_tensor_to_image_layout() {
        let mut data = Array4::<f32>::zeros((1, 2, 3, 3));
        data[[0, 1, 2, 0]] = 1.0;
        data[[0, 0, 1, 2]] = 0.5;
        let img = tensor_to_image(&StyleTensor::new(data).unwrap());

        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 1), &Rgb([255, 0, 0]));
        assert_eq!(img.get_pixel(1, 0), &Rgb([0, 0, 128]));
    }

    #[test]
    fn test_save_png_and_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));

        save_image(&img, dir.path().join("out.png"), 90).unwrap();
        save_image(&img, dir.path().join("out.jpg"), 90).unwrap();

        let back = image::open(dir.path().join("out.png")).unwrap().to_rgb8();
        assert_eq!(back, img);
        assert!(dir.path().join("out.jpg").exists());
    }
}
