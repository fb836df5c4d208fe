//! Configuration for the triage pipeline.
//!
//! Everything the surrounding application supplies at startup lives here: the
//! model input-size override, the normalization convention tied to the loaded
//! weights, crop margin, overlay blending, and the class label list. All
//! structures deserialize from JSON so deployments can version them next to
//! the model weights.

use crate::explain::ColorScheme;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-channel means of the ResNet50 `preprocess_input` convention, in BGR
/// order. Only meaningful together with [`NormalizationConfig::CaffeBgr`].
pub const CAFFE_BGR_MEAN: [f32; 3] = [103.939, 116.779, 123.68];

/// ImageNet per-channel means in RGB order, for torch-style normalization.
pub const TORCH_RGB_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet per-channel standard deviations in RGB order.
pub const TORCH_RGB_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Errors that can occur during configuration validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error indicating that a configuration value is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// A message describing the invalid value.
        message: String,
    },

    /// Error indicating that validation failed.
    #[error("validation failed: {message}")]
    ValidationFailed {
        /// A message describing the failed validation.
        message: String,
    },
}

/// The channel-wise normalization convention the classifier was trained with.
///
/// The constants are versioned configuration tied to whichever weights are
/// loaded; mismatched constants silently produce wrong predictions, so they
/// are supplied by the caller rather than hardcoded anywhere in the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "convention", rename_all = "snake_case")]
pub enum NormalizationConfig {
    /// Per-channel mean subtraction in BGR order, no scaling
    /// (the Keras/caffe `preprocess_input` convention).
    CaffeBgr {
        /// Per-channel means, BGR order.
        #[serde(default = "default_caffe_mean")]
        mean: [f32; 3],
    },
    /// Scale to `[0, 1]` then `(x - mean) / std` in RGB order
    /// (the torchvision convention).
    TorchRgb {
        /// Per-channel means, RGB order.
        #[serde(default = "default_torch_mean")]
        mean: [f32; 3],
        /// Per-channel standard deviations, RGB order.
        #[serde(default = "default_torch_std")]
        std: [f32; 3],
    },
    /// Plain multiplicative scaling, for models with a built-in
    /// rescaling/preprocessing layer.
    UnitScale {
        /// The scale factor applied to every channel.
        #[serde(default = "default_unit_scale")]
        scale: f32,
    },
}

fn default_caffe_mean() -> [f32; 3] {
    CAFFE_BGR_MEAN
}

fn default_torch_mean() -> [f32; 3] {
    TORCH_RGB_MEAN
}

fn default_torch_std() -> [f32; 3] {
    TORCH_RGB_STD
}

fn default_unit_scale() -> f32 {
    1.0 / 255.0
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        NormalizationConfig::CaffeBgr {
            mean: CAFFE_BGR_MEAN,
        }
    }
}

/// Configuration surface of the triage engine.
///
/// Supplied by the caller at engine construction; every field has a default
/// matching the reference deployment (binary tumor classifier, ResNet50-style
/// preprocessing).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Overrides the model's declared input resolution as `(height, width)`.
    /// When `None`, the declared shape is used, falling back to 224x224.
    pub input_size: Option<(u32, u32)>,

    /// The normalization convention matching the loaded weights.
    pub normalization: NormalizationConfig,

    /// Padding in pixels added around the detected foreground bounding box.
    pub crop_margin: u32,

    /// Opacity of the colorized saliency map in the overlay, in `[0, 1]`.
    pub blend_weight: f32,

    /// Color lookup applied to the saliency map.
    pub color_scheme: ColorScheme,

    /// Class labels for decoding predictions. For a binary (single-logit)
    /// head this must hold exactly two entries: `[negative, positive]`.
    pub class_labels: Vec<String>,

    /// Graph output names probed first when resolving the last spatial layer.
    /// Seeded with the ResNet50 block-5 names; the rank-4 reverse scan is the
    /// architecture-agnostic fallback when none match.
    pub preferred_spatial_outputs: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_size: None,
            normalization: NormalizationConfig::default(),
            crop_margin: 8,
            blend_weight: 0.35,
            color_scheme: ColorScheme::default(),
            class_labels: vec!["no_tumor".to_string(), "tumor".to_string()],
            preferred_spatial_outputs: vec![
                "conv5_block3_out".to_string(),
                "conv5_block3_3_conv".to_string(),
                "conv5_block3_2_conv".to_string(),
            ],
        }
    }
}

impl EngineConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the blend weight is outside `[0, 1]`, the
    /// label list is empty, an input-size override has a zero extent, or the
    /// normalization constants are unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.blend_weight) {
            return Err(ConfigError::InvalidConfig {
                message: format!(
                    "blend weight must be within [0, 1], got {}",
                    self.blend_weight
                ),
            });
        }

        if self.class_labels.is_empty() {
            return Err(ConfigError::InvalidConfig {
                message: "class label list must not be empty".to_string(),
            });
        }

        if let Some((h, w)) = self.input_size
            && (h == 0 || w == 0)
        {
            return Err(ConfigError::InvalidConfig {
                message: format!("input size override must be non-zero, got {h}x{w}"),
            });
        }

        match &self.normalization {
            NormalizationConfig::TorchRgb { std, .. } => {
                for (i, &s) in std.iter().enumerate() {
                    if s <= 0.0 {
                        return Err(ConfigError::ValidationFailed {
                            message: format!(
                                "standard deviation at index {i} must be greater than 0, got {s}"
                            ),
                        });
                    }
                }
            }
            NormalizationConfig::UnitScale { scale } => {
                if *scale <= 0.0 || !scale.is_finite() {
                    return Err(ConfigError::ValidationFailed {
                        message: format!("scale must be a positive finite value, got {scale}"),
                    });
                }
            }
            NormalizationConfig::CaffeBgr { mean } => {
                for (i, &m) in mean.iter().enumerate() {
                    if !m.is_finite() {
                        return Err(ConfigError::ValidationFailed {
                            message: format!("mean at index {i} is not finite: {m}"),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_blend_weight() {
        let config = EngineConfig {
            blend_weight: 1.5,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_label_list() {
        let config = EngineConfig {
            class_labels: vec![],
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_std() {
        let config = EngineConfig {
            normalization: NormalizationConfig::TorchRgb {
                mean: TORCH_RGB_MEAN,
                std: [0.0, 1.0, 1.0],
            },
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_tagged_normalization() {
        let config: EngineConfig = serde_json::from_str(
            r#"{
                "normalization": { "convention": "torch_rgb" },
                "crop_margin": 12,
                "class_labels": ["glioma", "meningioma", "pituitary"]
            }"#,
        )
        .unwrap();
        assert_eq!(config.crop_margin, 12);
        assert_eq!(config.class_labels.len(), 3);
        assert_eq!(
            config.normalization,
            NormalizationConfig::TorchRgb {
                mean: TORCH_RGB_MEAN,
                std: TORCH_RGB_STD,
            }
        );
    }

    #[test]
    fn default_normalization_is_caffe_bgr() {
        assert_eq!(
            NormalizationConfig::default(),
            NormalizationConfig::CaffeBgr {
                mean: CAFFE_BGR_MEAN
            }
        );
    }
}
