//! Image validation and tensor preparation.
//!
//! All functions here are CPU-bound; call them from `spawn_blocking`.

use image::{imageops::FilterType, ImageFormat};
use ndarray::Array4;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("empty image payload")]
    Empty,

    #[error("unsupported or unrecognized image format")]
    UnknownFormat,

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("invalid tensor shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Detects the format from magic bytes and returns its MIME type.
pub fn sniff_mime(bytes: &[u8]) -> Result<&'static str, PreprocessError> {
    Ok(validate_format(bytes)?.to_mime_type())
}

/// Fully decodes the payload to make sure it is a usable image.
pub fn validate_image(bytes: &[u8]) -> Result<ImageFormat, PreprocessError> {
    let format = validate_format(bytes)?;
    image::load_from_memory_with_format(bytes, format)?;
    Ok(format)
}

/// Decodes, converts to RGB, resizes to `size`x`size` and scales to [0,1].
///
/// Output layout is NHWC: `(1, size, size, 3)`.
pub fn image_to_tensor(bytes: &[u8], size: u32) -> Result<Array4<f32>, PreprocessError> {
    let format = validate_format(bytes)?;
    let rgb = image::load_from_memory_with_format(bytes, format)?.to_rgb8();
    let resized = image::imageops::resize(&rgb, size, size, FilterType::Triangle);

    let side = size as usize;
    let data: Vec<f32> = resized
        .into_raw()
        .into_iter()
        .map(|channel| channel as f32 / 255.0)
        .collect();

    Ok(Array4::from_shape_vec((1, side, side, 3), data)?)
}

fn validate_format(bytes: &[u8]) -> Result<ImageFormat, PreprocessError> {
    if bytes.is_empty() {
        return Err(PreprocessError::Empty);
    }
    image::guess_format(bytes).map_err(|_| PreprocessError::UnknownFormat)
}
