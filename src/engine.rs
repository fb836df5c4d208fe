//! Request-level orchestration.
//!
//! [`TriageEngine`] wires preprocessing, classification, and explanation
//! together behind three entry points: `prepare` builds the input tensor from
//! a decoded scan, `predict` classifies it, and `explain_and_render` writes a
//! saliency overlay for the predicted class. The same tensor must feed
//! `predict` and `explain_and_render`; the engine never re-preprocesses.
//!
//! Classification failures surface to the caller. Explanation failures are
//! logged and degrade to "no overlay" so a broken gradient graph can never
//! block a triage result.

use crate::core::config::EngineConfig;
use crate::core::errors::{TriageError, TriageResult};
use crate::core::Tensor4D;
use crate::domain::{decide, PredictionResult};
use crate::explain::{gradcam, overlay, SaliencyMap};
use crate::processors::Preprocessor;
use crate::runtime::backend::ClassifierBackend;
use crate::runtime::geometry::{self, SpatialLayer};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// The triage pipeline: preprocessing, classification, and explanation over
/// one injected classifier backend.
///
/// Construction is cheap; the expensive work (model loading) happens in the
/// backend, once, before the engine exists. The engine is `Send + Sync` and
/// meant to be shared across request handlers.
pub struct TriageEngine {
    backend: Arc<dyn ClassifierBackend>,
    config: EngineConfig,
    preprocessor: Preprocessor,
    input_size: (u32, u32),
    layer: OnceLock<SpatialLayer>,
}

impl TriageEngine {
    /// Creates an engine over `backend` with the given configuration.
    ///
    /// The effective input size is resolved here: a configured override wins,
    /// then the model's declared shape, then the 224x224 default.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `config` fails validation.
    pub fn new(backend: Arc<dyn ClassifierBackend>, config: EngineConfig) -> TriageResult<Self> {
        config.validate()?;
        let input_size = geometry::input_size(config.input_size, backend.declared_input_size());
        let preprocessor = Preprocessor::from_config(&config)?;
        debug!(
            height = input_size.0,
            width = input_size.1,
            "triage engine initialized"
        );
        Ok(Self {
            backend,
            config,
            preprocessor,
            input_size,
            layer: OnceLock::new(),
        })
    }

    /// The effective `(height, width)` the model is fed.
    pub fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    /// Builds the model input tensor from a decoded scan.
    ///
    /// Runs the deterministic preprocessing chain (foreground crop, resize,
    /// normalization) at the resolved input size. The returned tensor is the
    /// single artifact both `predict` and `explain_and_render` consume.
    pub fn prepare(&self, original: &RgbImage) -> TriageResult<Tensor4D> {
        self.preprocessor.prepare(original, self.input_size)
    }

    /// Classifies a prepared input tensor.
    ///
    /// Pure with respect to engine state: no files are written and nothing is
    /// cached per request.
    ///
    /// # Errors
    ///
    /// Returns a shape mismatch when `x` doesn't have the resolved
    /// `(1, height, width, 3)` extent, and surfaces any inference failure.
    pub fn predict(&self, x: &Tensor4D) -> TriageResult<PredictionResult> {
        let expected = [1, self.input_size.0 as usize, self.input_size.1 as usize, 3];
        if x.shape() != expected {
            return Err(TriageError::shape_mismatch(
                "input tensor",
                &expected,
                x.shape(),
            ));
        }
        let scores = self.backend.forward(x)?;
        decide(&scores, &self.config.class_labels)
    }

    /// Computes the saliency map for `class_index` on a prepared tensor.
    ///
    /// `x` must be the exact tensor `predict` scored; reusing it keeps the
    /// explanation faithful to the prediction.
    pub fn explain(&self, x: &Tensor4D, class_index: usize) -> TriageResult<SaliencyMap> {
        let layer = self.spatial_layer()?;
        gradcam::explain(self.backend.as_ref(), x, class_index, layer)
    }

    /// Explains a prediction and writes the colorized overlay to
    /// `output_path`, creating parent directories as needed.
    ///
    /// Returns the written path, or `None` after a `warn` log when any step
    /// of the explanation fails. Callers deliver the classification result
    /// either way.
    pub fn explain_and_render(
        &self,
        x: &Tensor4D,
        class_index: usize,
        original: &RgbImage,
        output_path: &Path,
    ) -> Option<PathBuf> {
        match self.try_explain_and_render(x, class_index, original, output_path) {
            Ok(()) => Some(output_path.to_path_buf()),
            Err(error) => {
                warn!(
                    class_index,
                    path = %output_path.display(),
                    %error,
                    "explanation skipped"
                );
                None
            }
        }
    }

    fn try_explain_and_render(
        &self,
        x: &Tensor4D,
        class_index: usize,
        original: &RgbImage,
        output_path: &Path,
    ) -> TriageResult<()> {
        let map = self.explain(x, class_index)?;
        let image = overlay::render_overlay(
            original,
            &map,
            self.config.blend_weight,
            self.config.color_scheme,
        )?;
        overlay::save_overlay(output_path, &image)
    }

    /// Resolves (and caches) the last spatial layer used for explanation.
    fn spatial_layer(&self) -> TriageResult<&SpatialLayer> {
        if let Some(layer) = self.layer.get() {
            return Ok(layer);
        }
        let layer = self.backend.resolve_spatial_layer(self.input_size)?;
        debug!(
            name = %layer.name,
            height = layer.height,
            width = layer.width,
            channels = layer.channels,
            "spatial layer resolved"
        );
        Ok(self.layer.get_or_init(|| layer))
    }
}

impl std::fmt::Debug for TriageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriageEngine")
            .field("input_size", &self.input_size)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
