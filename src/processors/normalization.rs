//! Channel-wise normalization matching the classifier's training convention.
//!
//! Normalization is precomputed into a per-channel affine transform
//! (`alpha * x + beta`) so the hot loop is a single fused multiply-add per
//! channel value. The convention itself (caffe-style BGR mean subtraction,
//! torch-style scaled standardization, or plain rescaling) is supplied by
//! configuration and tied to whichever weights are loaded.

use crate::core::config::NormalizationConfig;
use crate::core::{Tensor4D, TriageError};
use image::RgbImage;
use rayon::prelude::*;

/// Image sizes above this pixel count use the parallel normalization path.
const PARALLEL_PIXEL_THRESHOLD: usize = 256 * 256;

/// Applies a per-channel affine normalization producing an NHWC tensor.
///
/// `alpha` and `beta` are indexed by *output* channel; when `swap_channels`
/// is set the output channel order is BGR (output channel 0 reads the source
/// blue channel), matching the caffe convention.
#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Scaling factor per output channel (alpha = scale / std).
    alpha: [f32; 3],
    /// Offset per output channel (beta = -mean / std).
    beta: [f32; 3],
    /// Emit channels in BGR order instead of RGB.
    swap_channels: bool,
}

impl Normalizer {
    /// Creates a normalizer with explicit affine parameters.
    ///
    /// # Arguments
    ///
    /// * `alpha` - Per-output-channel scale factors.
    /// * `beta` - Per-output-channel offsets.
    /// * `swap_channels` - Whether output channels are in BGR order.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is not finite.
    pub fn new(alpha: [f32; 3], beta: [f32; 3], swap_channels: bool) -> Result<Self, TriageError> {
        for (i, value) in alpha.iter().chain(beta.iter()).enumerate() {
            if !value.is_finite() {
                return Err(TriageError::config(format!(
                    "normalization parameter {i} is not finite: {value}"
                )));
            }
        }
        Ok(Self {
            alpha,
            beta,
            swap_channels,
        })
    }

    /// Builds a normalizer from the configured convention.
    pub fn from_config(config: &NormalizationConfig) -> Result<Self, TriageError> {
        match config {
            NormalizationConfig::CaffeBgr { mean } => {
                Self::new([1.0; 3], [-mean[0], -mean[1], -mean[2]], true)
            }
            NormalizationConfig::TorchRgb { mean, std } => {
                for (i, &s) in std.iter().enumerate() {
                    if s <= 0.0 {
                        return Err(TriageError::config(format!(
                            "standard deviation at index {i} must be greater than 0, got {s}"
                        )));
                    }
                }
                let scale = 1.0 / 255.0;
                let alpha = [scale / std[0], scale / std[1], scale / std[2]];
                let beta = [-mean[0] / std[0], -mean[1] / std[1], -mean[2] / std[2]];
                Self::new(alpha, beta, false)
            }
            NormalizationConfig::UnitScale { scale } => {
                if *scale <= 0.0 {
                    return Err(TriageError::config(format!(
                        "scale must be greater than 0, got {scale}"
                    )));
                }
                Self::new([*scale; 3], [0.0; 3], false)
            }
        }
    }

    /// Normalizes a single image into a `(1, H, W, 3)` float32 tensor.
    ///
    /// # Arguments
    ///
    /// * `img` - The RGB image to normalize.
    ///
    /// # Returns
    ///
    /// The normalized NHWC tensor with a leading batch axis of size 1.
    pub fn normalize_to(&self, img: &RgbImage) -> Result<Tensor4D, TriageError> {
        let (width, height) = img.dimensions();
        let row_len = width as usize * 3;
        let mut data = vec![0.0f32; height as usize * row_len];

        if (width as usize) * (height as usize) >= PARALLEL_PIXEL_THRESHOLD {
            data.par_chunks_mut(row_len)
                .enumerate()
                .for_each(|(y, row)| self.normalize_row(img, y as u32, row));
        } else {
            for (y, row) in data.chunks_mut(row_len).enumerate() {
                self.normalize_row(img, y as u32, row);
            }
        }

        Tensor4D::from_shape_vec((1, height as usize, width as usize, 3), data).map_err(|e| {
            TriageError::processing(
                crate::core::ProcessingStage::Normalization,
                "failed to assemble NHWC normalization tensor",
                e,
            )
        })
    }

    fn normalize_row(&self, img: &RgbImage, y: u32, row: &mut [f32]) {
        for x in 0..img.width() {
            let pixel = img.get_pixel(x, y);
            let base = x as usize * 3;
            for c in 0..3 {
                let src = if self.swap_channels { 2 - c } else { c };
                row[base + c] = pixel[src] as f32 * self.alpha[c] + self.beta[c];
            }
        }
    }
}
