//! Gradient-weighted class-activation mapping.
//!
//! Produces a small 2D map over the last spatial layer's extent showing how
//! strongly each location's features contributed, positively, to the score of
//! one class. The computation runs on the same input tensor the classifier
//! scored: one dual-output forward pass yields activations and scores, the
//! backend supplies the gradient of the chosen class score with respect to
//! those activations, gradients are pooled to one weight per channel, and
//! the weighted channel sum is rectified and max-normalized into `[0, 1]`.

use crate::core::{Tensor4D, TriageError};
use crate::runtime::backend::ClassifierBackend;
use crate::runtime::geometry::SpatialLayer;
use ndarray::{Array2, s};
use tracing::debug;

/// Numeric-stability epsilon for max-normalization; keeps an all-zero map
/// from dividing by zero.
const NORM_EPSILON: f32 = 1e-8;

/// A 2D saliency map with values in `[0, 1]`.
///
/// Spatial dimensions equal the last spatial layer's extent (typically much
/// smaller than the model input, e.g. 7x7); upsampling to the original image
/// resolution happens at overlay time.
#[derive(Debug, Clone, PartialEq)]
pub struct SaliencyMap {
    values: Array2<f32>,
}

impl SaliencyMap {
    /// Wraps precomputed values. Intended for the explanation engine and
    /// tests; values are expected to already lie in `[0, 1]`.
    pub fn from_values(values: Array2<f32>) -> Self {
        Self { values }
    }

    /// The map values, row-major `(height, width)`.
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// Spatial width of the map.
    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    /// Spatial height of the map.
    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    /// Renders the map as an 8-bit grayscale image for upsampling and
    /// colorization.
    pub fn to_gray_image(&self) -> image::GrayImage {
        image::GrayImage::from_fn(self.width() as u32, self.height() as u32, |x, y| {
            let v = self.values[[y as usize, x as usize]].clamp(0.0, 1.0);
            image::Luma([(v * 255.0).round() as u8])
        })
    }
}

/// Computes the Grad-CAM saliency map for `class_index`.
///
/// # Arguments
///
/// * `backend` - The classifier runtime.
/// * `x` - The input tensor, identical to the one scored by `predict`.
/// * `class_index` - The class whose positive evidence is visualized.
/// * `layer` - The resolved last spatial layer, used to validate activations.
///
/// # Returns
///
/// A saliency map with the layer's spatial extent and values in `[0, 1]`.
/// Deterministic given fixed weights and input.
///
/// # Errors
///
/// All failures here are recoverable at the engine boundary: the report
/// proceeds without a visual explanation.
pub fn explain(
    backend: &dyn ClassifierBackend,
    x: &Tensor4D,
    class_index: usize,
    layer: &SpatialLayer,
) -> Result<SaliencyMap, TriageError> {
    let (activations, scores) = backend.forward_with_activations(x)?;

    if class_index >= scores.ncols() {
        return Err(TriageError::explanation(format!(
            "class index {class_index} out of range for {} output(s)",
            scores.ncols()
        )));
    }

    let shape = activations.shape().to_vec();
    if shape[0] != 1 {
        return Err(TriageError::explanation(format!(
            "expected a single-item batch of activations, got {shape:?}"
        )));
    }
    if shape[1] != layer.height || shape[2] != layer.width || shape[3] != layer.channels {
        return Err(TriageError::explanation(format!(
            "activations {shape:?} disagree with resolved layer '{}' ({}x{}x{})",
            layer.name, layer.height, layer.width, layer.channels
        )));
    }

    let gradients = backend.backward_from_score(x, class_index)?;
    if gradients.shape() != activations.shape() {
        return Err(TriageError::explanation(format!(
            "gradient shape {:?} disagrees with activation shape {shape:?}",
            gradients.shape()
        )));
    }

    let (height, width, channels) = (shape[1], shape[2], shape[3]);

    // One importance weight per channel: the gradient averaged over both
    // spatial axes.
    let mut map = Array2::<f32>::zeros((height, width));
    for c in 0..channels {
        let pooled = gradients.slice(s![0, .., .., c]).mean().unwrap_or(0.0);
        map.scaled_add(pooled, &activations.slice(s![0, .., .., c]));
    }

    // Keep positive evidence only, then normalize by the peak.
    map.mapv_inplace(|v| v.max(0.0));
    let peak = map.fold(0.0f32, |acc, &v| acc.max(v));
    map.mapv_inplace(|v| v / (peak + NORM_EPSILON));

    debug!(class_index, height, width, peak, "saliency map computed");

    Ok(SaliencyMap::from_values(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fixture::FixtureBackend;
    use ndarray::Array4;

    fn layer_for(backend: &FixtureBackend) -> SpatialLayer {
        use crate::runtime::backend::ClassifierBackend;
        backend.resolve_spatial_layer((8, 8)).unwrap()
    }

    fn input() -> Tensor4D {
        Array4::from_elem((1, 8, 8, 3), 0.25)
    }

    #[test]
    fn values_stay_within_unit_interval() {
        let backend = FixtureBackend::binary(0.9);
        let map = explain(&backend, &input(), 0, &layer_for(&backend)).unwrap();
        assert!(map.values().iter().all(|&v| (0.0..=1.0).contains(&v)));
        let peak = map.values().fold(0.0f32, |acc, &v| acc.max(v));
        assert!(peak > 0.99, "peak = {peak}");
    }

    #[test]
    fn all_negative_contributions_yield_zero_map() {
        let mut backend = FixtureBackend::binary(0.9);
        backend.gradients = Array4::from_elem((1, 2, 2, 2), -1.0);
        let map = explain(&backend, &input(), 0, &layer_for(&backend)).unwrap();
        assert!(map.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn channels_are_weighted_by_pooled_gradients() {
        let mut activations = Array4::<f32>::zeros((1, 2, 2, 2));
        activations[[0, 0, 0, 0]] = 1.0; // channel 0 fires at (0, 0)
        activations[[0, 0, 1, 1]] = 2.0; // channel 1 fires at (0, 1)
        let mut gradients = Array4::<f32>::zeros((1, 2, 2, 2));
        gradients.slice_mut(s![0, .., .., 0]).fill(1.0); // pooled weight +1
        gradients.slice_mut(s![0, .., .., 1]).fill(-1.0); // pooled weight -1
        let scores = crate::runtime::ScoreMatrix::from_shape_vec((1, 1), vec![0.8]).unwrap();

        let backend = FixtureBackend::new(activations, gradients, scores);
        let map = explain(&backend, &input(), 0, &layer_for(&backend)).unwrap();

        // Positive channel survives at (0, 0); the negative channel's
        // location is rectified away.
        assert!(map.values()[[0, 0]] > 0.999);
        assert!(map.values()[[0, 1]] == 0.0);
        assert!(map.values()[[1, 0]] == 0.0);
    }

    #[test]
    fn out_of_range_class_index_is_recoverable() {
        let backend = FixtureBackend::binary(0.9);
        let err = explain(&backend, &input(), 3, &layer_for(&backend)).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn gradient_shape_disagreement_is_recoverable() {
        let mut backend = FixtureBackend::binary(0.9);
        backend.gradients = Array4::from_elem((1, 4, 4, 2), 0.5);
        let err = explain(&backend, &input(), 0, &layer_for(&backend)).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn explanation_is_deterministic() {
        let backend = FixtureBackend::binary(0.6);
        let layer = layer_for(&backend);
        let a = explain(&backend, &input(), 0, &layer).unwrap();
        let b = explain(&backend, &input(), 0, &layer).unwrap();
        assert_eq!(a, b);
    }
}
