//! A deterministic in-memory backend for pipeline tests.
//!
//! Returns canned activations, gradients, and scores, and records every
//! tensor it is handed so tests can assert the exact same input feeds both
//! classification and explanation.

use crate::core::{Tensor4D, TriageError};
use crate::runtime::backend::{ClassifierBackend, ScoreMatrix};
use crate::runtime::geometry::SpatialLayer;
use std::sync::Mutex;

pub(crate) struct FixtureBackend {
    pub activations: Tensor4D,
    pub gradients: Tensor4D,
    pub scores: ScoreMatrix,
    pub input_size: (u32, u32),
    pub fail_backward: bool,
    pub forward_inputs: Mutex<Vec<Tensor4D>>,
    pub backward_inputs: Mutex<Vec<Tensor4D>>,
}

impl FixtureBackend {
    pub fn new(activations: Tensor4D, gradients: Tensor4D, scores: ScoreMatrix) -> Self {
        Self {
            activations,
            gradients,
            scores,
            input_size: (8, 8),
            fail_backward: false,
            forward_inputs: Mutex::new(Vec::new()),
            backward_inputs: Mutex::new(Vec::new()),
        }
    }

    /// A binary-head fixture: 2x2x2 activations, matching gradients, one
    /// sigmoid score.
    pub fn binary(score: f32) -> Self {
        let activations = Tensor4D::from_elem((1, 2, 2, 2), 1.0);
        let gradients = Tensor4D::from_elem((1, 2, 2, 2), 0.5);
        let scores = ScoreMatrix::from_shape_vec((1, 1), vec![score]).unwrap();
        Self::new(activations, gradients, scores)
    }

    pub fn failing_backward(mut self) -> Self {
        self.fail_backward = true;
        self
    }
}

impl ClassifierBackend for FixtureBackend {
    fn forward(&self, x: &Tensor4D) -> Result<ScoreMatrix, TriageError> {
        self.forward_inputs.lock().unwrap().push(x.clone());
        Ok(self.scores.clone())
    }

    fn forward_with_activations(
        &self,
        x: &Tensor4D,
    ) -> Result<(Tensor4D, ScoreMatrix), TriageError> {
        self.forward_inputs.lock().unwrap().push(x.clone());
        Ok((self.activations.clone(), self.scores.clone()))
    }

    fn backward_from_score(
        &self,
        x: &Tensor4D,
        _class_index: usize,
    ) -> Result<Tensor4D, TriageError> {
        if self.fail_backward {
            return Err(TriageError::explanation("gradient graph unavailable"));
        }
        self.backward_inputs.lock().unwrap().push(x.clone());
        Ok(self.gradients.clone())
    }

    fn declared_input_size(&self) -> Option<(u32, u32)> {
        Some(self.input_size)
    }

    fn resolve_spatial_layer(&self, _input_size: (u32, u32)) -> Result<SpatialLayer, TriageError> {
        let shape = self.activations.shape();
        Ok(SpatialLayer {
            name: "fixture_conv".to_string(),
            height: shape[1],
            width: shape[2],
            channels: shape[3],
        })
    }
}
