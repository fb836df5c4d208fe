//! The pluggable classifier capability.
//!
//! The pipeline never talks to a concrete inference engine directly; it talks
//! to [`ClassifierBackend`]. Any runtime exposing the triad below — a plain
//! forward pass, a dual-output forward pass surfacing the last spatial
//! activations, and the gradient of one class score with respect to those
//! activations — satisfies the design, whether the gradient comes from a
//! companion graph (the shipped ONNX backend) or native autodiff.

use crate::core::{Tensor2D, Tensor4D, TriageError};
use crate::runtime::geometry::SpatialLayer;

/// A `(batch, classes)` matrix of raw classifier scores.
///
/// Width 1 carries sigmoid (binary) semantics, width greater than 1 carries
/// softmax-like (multiclass) semantics; see [`crate::domain::decide`].
pub type ScoreMatrix = Tensor2D;

/// The capability a classifier runtime must expose.
///
/// Implementations hold the loaded weights as immutable, process-wide shared
/// state (`Send + Sync`); the engine injects them as an `Arc` into each
/// request rather than looking them up ambiently.
pub trait ClassifierBackend: Send + Sync {
    /// Runs a plain forward pass over the input tensor.
    ///
    /// No gradient bookkeeping happens here, keeping steady-state inference
    /// cheap. No side effects beyond hardware dispatch.
    fn forward(&self, x: &Tensor4D) -> Result<ScoreMatrix, TriageError>;

    /// Runs one forward pass yielding both the activations at the last
    /// spatial layer and the final score matrix.
    ///
    /// Both values must come from the same pass over the same tensor; the
    /// explanation must reflect the exact input the classifier scored.
    fn forward_with_activations(
        &self,
        x: &Tensor4D,
    ) -> Result<(Tensor4D, ScoreMatrix), TriageError>;

    /// Computes the gradient of the score at `class_index` with respect to
    /// the last spatial layer's activations, in NHWC layout.
    ///
    /// # Errors
    ///
    /// Returns a recoverable [`TriageError::Geometry`] or
    /// [`TriageError::Explanation`] when gradients are unavailable for this
    /// model; callers skip the explanation and keep the classification.
    fn backward_from_score(
        &self,
        x: &Tensor4D,
        class_index: usize,
    ) -> Result<Tensor4D, TriageError>;

    /// The input `(height, width)` the model declares, when it declares one.
    fn declared_input_size(&self) -> Option<(u32, u32)>;

    /// Resolves the model's last spatial layer, materializing dynamic extents
    /// with a dummy forward pass at `input_size` if necessary.
    fn resolve_spatial_layer(&self, input_size: (u32, u32)) -> Result<SpatialLayer, TriageError>;
}
