//! Image processing components of the triage pipeline.
//!
//! This module contains the deterministic preprocessing stages that must
//! reproduce the classifier's training-time pipeline bit for bit:
//!
//! - [`crop`] - Foreground localization via thresholding and contour extraction
//! - [`normalization`] - Channel-wise normalization strategies
//! - [`preprocess`] - The composed image-to-tensor preparation

pub mod crop;
pub mod normalization;
pub mod preprocess;

pub use crop::{CropRegion, ForegroundCropper};
pub use normalization::Normalizer;
pub use preprocess::Preprocessor;
