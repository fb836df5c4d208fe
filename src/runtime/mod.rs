//! The classifier runtime.
//!
//! This module owns the loaded network and the seams around it:
//!
//! - [`backend`] - The `ClassifierBackend` trait: the capability triad
//!   (`forward`, `forward_with_activations`, `backward_from_score`) any
//!   runtime must expose for classification and explanation
//! - [`geometry`] - Input-size and last-spatial-layer resolution
//! - [`ort_backend`] - The ONNX Runtime implementation

pub mod backend;
pub mod geometry;
pub mod ort_backend;

#[cfg(test)]
pub(crate) mod fixture;

pub use backend::{ClassifierBackend, ScoreMatrix};
pub use geometry::{DEFAULT_INPUT_SIZE, SpatialLayer};
pub use ort_backend::{OrtClassifier, OrtClassifierBuilder};
