//! Image loading and decoding.

use crate::core::errors::TriageResult;
use image::RgbImage;
use std::path::Path;
use tracing::debug;

/// Decodes raster bytes (PNG, JPEG, ...) into an 8-bit RGB image.
///
/// The container format is sniffed from the bytes. Alpha channels and
/// grayscale sources are converted to RGB.
///
/// # Errors
///
/// Returns [`TriageError::Decode`](crate::core::errors::TriageError::Decode)
/// when the bytes are not a supported raster image. This failure is fatal to
/// the request.
pub fn decode_image(bytes: &[u8]) -> TriageResult<RgbImage> {
    let image = image::load_from_memory(bytes)?.to_rgb8();
    debug!(
        width = image.width(),
        height = image.height(),
        "image decoded"
    );
    Ok(image)
}

/// Loads and decodes an image file from disk.
pub fn load_image(path: impl AsRef<Path>) -> TriageResult<RgbImage> {
    let bytes = std::fs::read(path.as_ref())?;
    decode_image(&bytes)
}
