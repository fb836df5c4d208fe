//! Image-to-tensor preparation for the classifier.
//!
//! Composes the foreground crop, resize, and normalization into the exact
//! numeric tensor the classifier expects. The step order is load-bearing:
//! reordering changes numeric results and silently breaks compatibility with
//! the training-time pipeline.

use crate::core::{EngineConfig, Tensor4D, TriageError};
use crate::processors::crop::ForegroundCropper;
use crate::processors::normalization::Normalizer;
use image::imageops::{self, FilterType};
use tracing::debug;

/// Prepares a raw scan for inference.
///
/// Steps, in order: force 3-channel RGB (guaranteed by the `RgbImage` input
/// type), crop to the foreground, resize to the model's input extent with
/// area-style averaging, cast to f32 and normalize channel-wise, then add the
/// leading batch axis. Output invariant: shape `(1, H, W, 3)`, float32.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    cropper: ForegroundCropper,
    normalizer: Normalizer,
}

impl Preprocessor {
    /// Creates a preprocessor from explicit parts.
    pub fn new(cropper: ForegroundCropper, normalizer: Normalizer) -> Self {
        Self {
            cropper,
            normalizer,
        }
    }

    /// Builds a preprocessor from the engine configuration.
    pub fn from_config(config: &EngineConfig) -> Result<Self, TriageError> {
        Ok(Self {
            cropper: ForegroundCropper::new(config.crop_margin),
            normalizer: Normalizer::from_config(&config.normalization)?,
        })
    }

    /// Prepares an image as a model input tensor.
    ///
    /// # Arguments
    ///
    /// * `img` - The full-resolution RGB scan.
    /// * `input_size` - The model's resolved `(height, width)` input extent.
    ///
    /// # Returns
    ///
    /// The normalized input tensor of shape `(1, height, width, 3)`.
    pub fn prepare(&self, img: &image::RgbImage, input_size: (u32, u32)) -> Result<Tensor4D, TriageError> {
        let (height, width) = input_size;
        if height == 0 || width == 0 {
            return Err(TriageError::invalid_input(format!(
                "model input size must be non-zero, got {height}x{width}"
            )));
        }

        let (cropped, region) = self.cropper.crop(img);
        debug!(
            x0 = region.x0,
            y0 = region.y0,
            x1 = region.x1,
            y1 = region.y1,
            "foreground region located"
        );

        // Triangle filtering in the image crate scales its support with the
        // shrink ratio, averaging over the source footprint like INTER_AREA.
        let resized = imageops::resize(&cropped, width, height, FilterType::Triangle);

        self.normalizer.normalize_to(&resized)
    }
}
