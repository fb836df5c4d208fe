//! ONNX Runtime implementation of the classifier capability.
//!
//! The classifier is an ONNX graph exported with its last convolutional
//! feature map as an auxiliary output next to the score head. Gradients come
//! from a companion *gradient graph* exported alongside the classifier: the
//! training framework differentiates the class score with respect to the
//! spatial activations at export time, and this backend merely executes the
//! resulting graph through the same stable runtime interface. A deployment
//! without a gradient graph still classifies; it just cannot explain.

use crate::core::{Tensor4D, TriageError};
use crate::runtime::backend::{ClassifierBackend, ScoreMatrix};
use crate::runtime::geometry::{self, SpatialLayer};
use ndarray::{Array1, ArrayView2, ArrayView4};
use ort::logging::LogLevel;
use ort::session::Session;
use ort::value::{TensorRef, ValueType};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use tracing::debug;

/// The input name a multiclass gradient graph declares for the class
/// selection; binary graphs have the sole logit baked in and omit it.
const CLASS_INDEX_INPUT: &str = "class_index";

struct GradientGraph {
    session: Mutex<Session>,
    input_name: String,
    takes_class_index: bool,
    output_name: String,
}

/// ONNX Runtime classifier with an optional companion gradient graph.
///
/// Sessions are pooled behind mutexes with round-robin dispatch; the weights
/// themselves are immutable after load, so the instance is shared read-only
/// across all inference requests for the life of the process.
pub struct OrtClassifier {
    sessions: Vec<Mutex<Session>>,
    next_idx: AtomicUsize,
    gradient: Option<GradientGraph>,
    input_name: String,
    scores_output: String,
    preferred_spatial_outputs: Vec<String>,
    spatial: OnceLock<SpatialLayer>,
    model_name: String,
    model_path: PathBuf,
}

impl std::fmt::Debug for OrtClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtClassifier")
            .field("sessions", &self.sessions.len())
            .field("has_gradient_graph", &self.gradient.is_some())
            .field("input_name", &self.input_name)
            .field("scores_output", &self.scores_output)
            .field("model_path", &self.model_path)
            .field("model_name", &self.model_name)
            .finish()
    }
}

/// Builder for [`OrtClassifier`].
pub struct OrtClassifierBuilder {
    model_path: PathBuf,
    gradient_path: Option<PathBuf>,
    input_name: Option<String>,
    session_pool_size: usize,
    preferred_spatial_outputs: Vec<String>,
}

impl OrtClassifierBuilder {
    /// Sets the companion gradient graph used for explanation.
    pub fn with_gradient_graph(mut self, path: impl AsRef<Path>) -> Self {
        self.gradient_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Overrides the classifier's input tensor name. Defaults to the first
    /// declared input.
    pub fn with_input_name(mut self, name: impl Into<String>) -> Self {
        self.input_name = Some(name.into());
        self
    }

    /// Sets the number of pooled sessions for concurrent requests.
    pub fn with_session_pool_size(mut self, size: usize) -> Self {
        self.session_pool_size = size.max(1);
        self
    }

    /// Sets the output names probed first when resolving the spatial layer.
    pub fn with_preferred_spatial_outputs(mut self, names: Vec<String>) -> Self {
        self.preferred_spatial_outputs = names;
        self
    }

    /// Loads the session pool and, when configured, the gradient graph.
    ///
    /// # Errors
    ///
    /// Returns an error when a model file cannot be loaded or declares no
    /// usable inputs/outputs.
    pub fn build(self) -> Result<OrtClassifier, TriageError> {
        let mut sessions = Vec::with_capacity(self.session_pool_size);
        for _ in 0..self.session_pool_size {
            sessions.push(Mutex::new(load_session(&self.model_path)?));
        }

        let (input_name, scores_output) = {
            let session = sessions[0]
                .lock()
                .map_err(|_| TriageError::invalid_input("classifier session lock poisoned"))?;

            let input_name = match self.input_name {
                Some(name) => name,
                None => session
                    .inputs
                    .first()
                    .map(|i| i.name.clone())
                    .ok_or_else(|| {
                        TriageError::invalid_input("model declares no inputs; file may be corrupt")
                    })?,
            };

            let scores_output = resolve_scores_output(&session).ok_or_else(|| {
                TriageError::invalid_input("model declares no outputs; file may be corrupt")
            })?;

            (input_name, scores_output)
        };

        let gradient = match self.gradient_path {
            Some(path) => Some(load_gradient_graph(&path)?),
            None => None,
        };

        let model_name = self
            .model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown_model")
            .to_string();

        debug!(
            model = %model_name,
            input = %input_name,
            scores = %scores_output,
            pool = sessions.len(),
            "classifier loaded"
        );

        Ok(OrtClassifier {
            sessions,
            next_idx: AtomicUsize::new(0),
            gradient,
            input_name,
            scores_output,
            preferred_spatial_outputs: self.preferred_spatial_outputs,
            spatial: OnceLock::new(),
            model_name,
            model_path: self.model_path,
        })
    }
}

impl OrtClassifier {
    /// Starts building a classifier from an ONNX model file.
    pub fn builder(model_path: impl AsRef<Path>) -> OrtClassifierBuilder {
        OrtClassifierBuilder {
            model_path: model_path.as_ref().to_path_buf(),
            gradient_path: None,
            input_name: None,
            session_pool_size: 1,
            preferred_spatial_outputs: Vec::new(),
        }
    }

    /// Loads a classifier with default settings and no gradient graph.
    pub fn from_file(model_path: impl AsRef<Path>) -> Result<Self, TriageError> {
        Self::builder(model_path).build()
    }

    /// Returns the model path associated with this classifier.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Returns the model name associated with this classifier.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn with_session<T>(
        &self,
        f: impl FnOnce(&mut Session) -> Result<T, TriageError>,
    ) -> Result<T, TriageError> {
        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut guard = self.sessions[idx]
            .lock()
            .map_err(|_| TriageError::invalid_input("classifier session lock poisoned"))?;
        f(&mut guard)
    }

    /// Runs a dummy zero forward pass to learn the concrete extent of a
    /// spatial output whose declared dims are dynamic.
    fn materialize_layer(
        &self,
        name: &str,
        (height, width): (u32, u32),
    ) -> Result<SpatialLayer, TriageError> {
        let zeros = Tensor4D::zeros((1, height as usize, width as usize, 3));
        self.with_session(|session| {
            let tensor = TensorRef::from_array_view(zeros.view())
                .map_err(|e| TriageError::inference("failed to build dummy input tensor", e))?;
            let outputs = session
                .run(ort::inputs![self.input_name.as_str() => tensor])
                .map_err(|e| {
                    TriageError::inference("dummy forward pass for graph materialization failed", e)
                })?;
            let (shape, _) = outputs[name].try_extract_tensor::<f32>().map_err(|e| {
                TriageError::inference("failed to extract spatial output from dummy pass", e)
            })?;
            let dims: Vec<i64> = shape.iter().copied().collect();
            geometry::layer_from_dims(name, &dims).ok_or_else(|| {
                TriageError::geometry(format!(
                    "spatial output '{name}' produced non-spatial shape {dims:?}"
                ))
            })
        })
    }
}

impl ClassifierBackend for OrtClassifier {
    fn forward(&self, x: &Tensor4D) -> Result<ScoreMatrix, TriageError> {
        let input_shape = x.shape().to_vec();
        self.with_session(|session| {
            let tensor = TensorRef::from_array_view(x.view()).map_err(|e| {
                TriageError::inference(
                    &format!("failed to convert input tensor with shape {input_shape:?}"),
                    e,
                )
            })?;
            let outputs = session
                .run(ort::inputs![self.input_name.as_str() => tensor])
                .map_err(|e| {
                    TriageError::inference(
                        &format!("forward pass failed for input shape {input_shape:?}"),
                        e,
                    )
                })?;
            let (shape, data) = outputs[self.scores_output.as_str()]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    TriageError::inference("failed to extract score tensor as f32", e)
                })?;
            scores_from_raw(shape, data)
        })
    }

    fn forward_with_activations(
        &self,
        x: &Tensor4D,
    ) -> Result<(Tensor4D, ScoreMatrix), TriageError> {
        let layer =
            self.resolve_spatial_layer((x.shape()[1] as u32, x.shape()[2] as u32))?;
        self.with_session(|session| {
            let tensor = TensorRef::from_array_view(x.view())
                .map_err(|e| TriageError::inference("failed to convert input tensor", e))?;
            let outputs = session
                .run(ort::inputs![self.input_name.as_str() => tensor])
                .map_err(|e| TriageError::inference("dual-output forward pass failed", e))?;

            let (act_shape, act_data) = outputs[layer.name.as_str()]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    TriageError::inference("failed to extract spatial activations as f32", e)
                })?;
            let activations = tensor4_from_raw(act_shape, act_data)?;

            let (score_shape, score_data) = outputs[self.scores_output.as_str()]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    TriageError::inference("failed to extract score tensor as f32", e)
                })?;
            let scores = scores_from_raw(score_shape, score_data)?;

            Ok((activations, scores))
        })
    }

    fn backward_from_score(
        &self,
        x: &Tensor4D,
        class_index: usize,
    ) -> Result<Tensor4D, TriageError> {
        let Some(gradient) = &self.gradient else {
            return Err(TriageError::geometry(format!(
                "model '{}' has no gradient graph configured; explanation unavailable",
                self.model_name
            )));
        };

        let mut session = gradient
            .session
            .lock()
            .map_err(|_| TriageError::invalid_input("gradient session lock poisoned"))?;

        let image_tensor = TensorRef::from_array_view(x.view()).map_err(|e| {
            TriageError::explanation_with_source(
                "failed to convert input tensor for gradient graph",
                e,
            )
        })?;

        let outputs = if gradient.takes_class_index {
            let class = Array1::from(vec![class_index as i64]);
            let class_tensor = TensorRef::from_array_view(class.view()).map_err(|e| {
                TriageError::explanation_with_source("failed to build class index tensor", e)
            })?;
            session.run(ort::inputs![
                gradient.input_name.as_str() => image_tensor,
                CLASS_INDEX_INPUT => class_tensor
            ])
        } else {
            if class_index != 0 {
                return Err(TriageError::explanation(format!(
                    "gradient graph has the sole logit baked in, got class index {class_index}"
                )));
            }
            session.run(ort::inputs![gradient.input_name.as_str() => image_tensor])
        }
        .map_err(|e| {
            TriageError::explanation_with_source("gradient graph execution failed", e)
        })?;

        let (shape, data) = outputs[gradient.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                TriageError::explanation_with_source("failed to extract gradient tensor as f32", e)
            })?;
        tensor4_from_raw(shape, data)
    }

    fn declared_input_size(&self) -> Option<(u32, u32)> {
        let session = self.sessions.first()?.lock().ok()?;
        let input = session.inputs.first()?;
        match &input.input_type {
            ValueType::Tensor { shape, .. } => {
                let dims: Vec<i64> = shape.iter().copied().collect();
                geometry::declared_input_hw(&dims)
            }
            _ => None,
        }
    }

    fn resolve_spatial_layer(&self, input_size: (u32, u32)) -> Result<SpatialLayer, TriageError> {
        if let Some(layer) = self.spatial.get() {
            return Ok(layer.clone());
        }

        let candidates = {
            let session = self.sessions[0]
                .lock()
                .map_err(|_| TriageError::invalid_input("classifier session lock poisoned"))?;
            output_metadata(&session)
        };

        let (name, dims) =
            geometry::select_spatial_output(&candidates, &self.preferred_spatial_outputs)
                .cloned()
                .ok_or_else(|| {
                    TriageError::geometry(format!(
                        "model '{}' declares no rank-4 output; no spatial layer to explain from",
                        self.model_name
                    ))
                })?;

        let layer = match geometry::layer_from_dims(&name, &dims) {
            Some(layer) => layer,
            None => self.materialize_layer(&name, input_size)?,
        };

        debug!(
            layer = %layer.name,
            height = layer.height,
            width = layer.width,
            channels = layer.channels,
            "spatial layer resolved"
        );

        Ok(self.spatial.get_or_init(|| layer).clone())
    }
}

fn load_session(path: &Path) -> Result<Session, TriageError> {
    Session::builder()?
        .with_log_level(LogLevel::Error)?
        .commit_from_file(path)
        .map_err(|e| {
            TriageError::inference(
                &format!("failed to create ONNX session for '{}'", path.display()),
                e,
            )
        })
}

fn load_gradient_graph(path: &Path) -> Result<GradientGraph, TriageError> {
    let session = load_session(path)?;

    let input_name = session
        .inputs
        .iter()
        .map(|i| i.name.clone())
        .find(|n| n != CLASS_INDEX_INPUT)
        .ok_or_else(|| {
            TriageError::invalid_input("gradient graph declares no image input")
        })?;
    let takes_class_index = session.inputs.iter().any(|i| i.name == CLASS_INDEX_INPUT);

    // The gradient lives in the first rank-4 output; a well-formed graph has
    // exactly one.
    let output_name = output_metadata(&session)
        .into_iter()
        .find(|(_, dims)| dims.len() == 4)
        .map(|(name, _)| name)
        .or_else(|| session.outputs.first().map(|o| o.name.clone()))
        .ok_or_else(|| {
            TriageError::invalid_input("gradient graph declares no outputs")
        })?;

    Ok(GradientGraph {
        session: Mutex::new(session),
        input_name,
        takes_class_index,
        output_name,
    })
}

/// Declared `(name, dims)` pairs of all tensor outputs, in declaration order.
fn output_metadata(session: &Session) -> Vec<(String, Vec<i64>)> {
    session
        .outputs
        .iter()
        .filter_map(|o| match &o.output_type {
            ValueType::Tensor { shape, .. } => {
                Some((o.name.clone(), shape.iter().copied().collect()))
            }
            _ => None,
        })
        .collect()
}

/// Picks the score output: the first declared rank-2 output, else the last
/// declared output (covers graphs that only declare the score head).
fn resolve_scores_output(session: &Session) -> Option<String> {
    let meta = output_metadata(session);
    meta.iter()
        .find(|(_, dims)| dims.len() == 2)
        .map(|(name, _)| name.clone())
        .or_else(|| meta.last().map(|(name, _)| name.clone()))
}

fn scores_from_raw(shape: &[i64], data: &[f32]) -> Result<ScoreMatrix, TriageError> {
    let (rows, cols) = match shape.len() {
        2 => (shape[0] as usize, shape[1] as usize),
        // Some exports flatten the batch axis away for a single logit.
        1 => (1, shape[0] as usize),
        _ => {
            return Err(TriageError::shape_mismatch(
                "score tensor",
                &[1, 0],
                &shape.iter().map(|&d| d as usize).collect::<Vec<_>>(),
            ));
        }
    };
    if data.len() != rows * cols {
        return Err(TriageError::invalid_input(format!(
            "score data size mismatch: expected {}, got {}",
            rows * cols,
            data.len()
        )));
    }
    Ok(ArrayView2::from_shape((rows, cols), data)?.to_owned())
}

fn tensor4_from_raw(shape: &[i64], data: &[f32]) -> Result<Tensor4D, TriageError> {
    if shape.len() != 4 {
        return Err(TriageError::shape_mismatch(
            "spatial tensor",
            &[4],
            &[shape.len()],
        ));
    }
    let dims = (
        shape[0] as usize,
        shape[1] as usize,
        shape[2] as usize,
        shape[3] as usize,
    );
    if data.len() != dims.0 * dims.1 * dims.2 * dims.3 {
        return Err(TriageError::invalid_input(format!(
            "spatial data size mismatch: expected {}, got {}",
            dims.0 * dims.1 * dims.2 * dims.3,
            data.len()
        )));
    }
    Ok(ArrayView4::from_shape(dims, data)?.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_from_rank_two_raw() {
        let scores = scores_from_raw(&[1, 3], &[0.1, 0.6, 0.3]).unwrap();
        assert_eq!(scores.shape(), &[1, 3]);
        assert!((scores[[0, 1]] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn scores_from_rank_one_raw_gains_batch_axis() {
        let scores = scores_from_raw(&[1], &[0.7]).unwrap();
        assert_eq!(scores.shape(), &[1, 1]);
    }

    #[test]
    fn score_data_length_must_match_shape() {
        assert!(scores_from_raw(&[1, 3], &[0.1, 0.6]).is_err());
    }

    #[test]
    fn rank_four_raw_roundtrip() {
        let data: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let tensor = tensor4_from_raw(&[1, 2, 3, 4], &data).unwrap();
        assert_eq!(tensor.shape(), &[1, 2, 3, 4]);
        assert!((tensor[[0, 1, 2, 3]] - 23.0).abs() < 1e-6);
    }

    #[test]
    fn non_spatial_raw_is_rejected() {
        assert!(tensor4_from_raw(&[1, 2048], &[0.0; 2048]).is_err());
    }
}
