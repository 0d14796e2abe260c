//! Conversion between displayable images and the model's tensor format.

mod load;
mod save;

pub use load::load_image;
pub use save::save_image;

use image::{DynamicImage, RgbImage};
use ndarray::{Array4, ArrayD, ArrayView4, Axis, Ix4};

use crate::error::{Error, Result};

/// Default cap on the longer side of an encoded image.
pub const DEFAULT_MAX_DIM: u32 = 512;

/// Number of channels in RGB images.
pub const RGB_CHANNELS: usize = 3;

/// Image tensor in NHWC format (batch, height, width, channel).
///
/// Batch is always 1 and channel always 3. Values produced by
/// [`ImageCodec::encode`] lie in `[0, 1]`; model outputs are clamped on decode.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleTensor {
    data: Array4<f32>,
}

impl StyleTensor {
    /// Wrap an NHWC array.
    ///
    /// # Errors
    ///
    /// Returns a shape mismatch if batch is not 1 or channel is not 3.
    pub fn new(data: Array4<f32>) -> Result<Self> {
        let (batch, height, width, channels) = data.dim();
        if batch != 1 || channels != RGB_CHANNELS || height == 0 || width == 0 {
            return Err(Error::shape(
                "[1, H, W, 3] with H, W > 0",
                format!("[{batch}, {height}, {width}, {channels}]"),
            ));
        }
        Ok(Self { data })
    }

    /// Accept a raw model output of rank 3 (`[H, W, C]`) or rank 4 (`[1, H, W, C]`).
    ///
    /// # Errors
    ///
    /// Returns a shape mismatch for any other rank, a batch axis other than 1,
    /// or a channel count other than 3.
    pub fn from_dyn(data: ArrayD<f32>) -> Result<Self> {
        let data = match data.ndim() {
            3 => data.insert_axis(Axis(0)),
            4 => data,
            n => {
                return Err(Error::shape(
                    "3D or 4D tensor",
                    format!("{n}D tensor {:?}", data.shape()),
                ))
            }
        };
        let data = data
            .into_dimensionality::<Ix4>()
            .map_err(|e| Error::shape("4D tensor", e.to_string()))?;
        Self::new(data)
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    /// Shape as `[batch, height, width, channel]`.
    #[must_use]
    pub fn shape(&self) -> [usize; 4] {
        let (b, h, w, c) = self.data.dim();
        [b, h, w, c]
    }

    #[must_use]
    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    #[must_use]
    pub fn into_array(self) -> Array4<f32> {
        self.data
    }
}

/// Bidirectional image/tensor codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCodec {
    max_dim: u32,
}

impl Default for ImageCodec {
    fn default() -> Self {
        Self {
            max_dim: DEFAULT_MAX_DIM,
        }
    }
}

impl ImageCodec {
    /// Create a codec that scales the longer image side to `max_dim`.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_dim` is zero.
    pub fn new(max_dim: u32) -> Result<Self> {
        if max_dim == 0 {
            return Err(Error::InvalidParameter {
                name: "max_dim".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(Self { max_dim })
    }

    #[must_use]
    pub const fn max_dim(&self) -> u32 {
        self.max_dim
    }

    /// Convert an image into a normalized `[1, H, W, 3]` tensor.
    ///
    /// # Errors
    ///
    /// Returns a shape mismatch if the image has a zero dimension.
    pub fn encode(&self, image: &DynamicImage) -> Result<StyleTensor> {
        load::image_to_tensor(image, self.max_dim)
    }

    /// Convert a tensor back into an 8-bit RGB image.
    #[must_use]
    pub fn decode(&self, tensor: &StyleTensor) -> RgbImage {
        save::tensor_to_image(tensor)
    }

    /// Decode a raw model output of rank 3 or 4.
    ///
    /// # Errors
    ///
    /// Returns a shape mismatch if the output is not a single RGB image.
    pub fn decode_raw(&self, output: ArrayD<f32>) -> Result<RgbImage> {
        let tensor = StyleTensor::from_dyn(output)?;
        Ok(self.decode(&tensor))
    }
}
