//! # neurocam
//!
//! A Rust inference core for brain-scan tumor triage. Classifies scans with an
//! ONNX convolutional model and explains the prediction with a gradient-weighted
//! class-activation (Grad-CAM) overlay rendered at the original image resolution.
//!
//! ## Features
//!
//! - Deterministic preprocessing that reproduces the training-time pipeline
//!   (foreground crop, area-averaged resize, channel-wise normalization)
//! - Single forward pass shared between classification and explanation
//! - Binary (sigmoid) and multiclass (softmax) heads behind one decision API
//! - Graceful degradation: a failed explanation never blocks the prediction
//! - ONNX Runtime integration for fast inference
//!
//! ## Components
//!
//! * [`core`] - Error handling, configuration, and tensor aliases
//! * [`processors`] - Foreground cropping, normalization, and tensor preparation
//! * [`runtime`] - The classifier backend seam and its ONNX Runtime implementation
//! * [`explain`] - Grad-CAM saliency computation and overlay rendering
//! * [`domain`] - Prediction decoding for sigmoid and softmax heads
//! * [`engine`] - The request-level entry points (`prepare`, `predict`, `explain_and_render`)
//! * [`utils`] - Image loading and decoding helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use neurocam::prelude::*;
//! use neurocam::runtime::OrtClassifier;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load the classifier once at process start; the gradient graph is the
//! // companion model exported alongside it for Grad-CAM.
//! let backend = OrtClassifier::builder("models/classifier.onnx")
//!     .with_gradient_graph("models/classifier.grad.onnx")
//!     .build()?;
//!
//! let engine = TriageEngine::new(Arc::new(backend), EngineConfig::default())?;
//!
//! let original = load_image(std::path::Path::new("scan.jpg"))?;
//! let x = engine.prepare(&original)?;
//! let prediction = engine.predict(&x)?;
//! println!("{} ({:.1}%)", prediction.label, prediction.probability * 100.0);
//!
//! // The same tensor feeds the explanation; a missing overlay is not an error.
//! let overlay = engine.explain_and_render(
//!     &x,
//!     prediction.class_index,
//!     &original,
//!     std::path::Path::new("storage/overlays/scan_cam.png"),
//! );
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod domain;
pub mod engine;
pub mod explain;
pub mod processors;
pub mod runtime;
pub mod utils;

/// Prelude module for convenient imports.
///
/// Bring the essentials into scope with a single use statement:
///
/// ```rust
/// use neurocam::prelude::*;
/// ```
///
/// Included items focus on the most common tasks:
/// - The triage engine and its configuration (`TriageEngine`, `EngineConfig`)
/// - Results (`PredictionResult`, `SaliencyMap`)
/// - Essential error and result types (`TriageError`, `TriageResult`)
/// - Basic image loading (`load_image`, `decode_image`)
///
/// For backend customization (alternative `ClassifierBackend` implementations,
/// geometry resolution), import directly from `neurocam::runtime`.
pub mod prelude {
    pub use crate::core::{EngineConfig, TriageError, TriageResult};
    pub use crate::domain::PredictionResult;
    pub use crate::engine::TriageEngine;
    pub use crate::explain::{ColorScheme, SaliencyMap};
    pub use crate::utils::{decode_image, load_image};
}
