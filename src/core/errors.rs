//! Error types for the triage pipeline.
//!
//! This module defines the error taxonomy of the inference-and-explanation
//! pipeline. Classification failures (decode, shape mismatch, inference) are
//! always surfaced to the caller; geometry and explanation failures are
//! recoverable and only degrade the visual explanation, never the numeric
//! result. Utility constructors mirror the variants so call sites stay short.

use thiserror::Error;

/// Enum representing different stages of processing in the triage pipeline.
///
/// This enum is used to identify which stage of the pipeline an error
/// occurred in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcessingStage {
    /// Error occurred during foreground cropping.
    Crop,
    /// Error occurred during image normalization.
    Normalization,
    /// Error occurred during image resizing.
    Resize,
    /// Error occurred during tensor operations.
    TensorOperation,
    /// Error occurred during overlay rendering.
    Overlay,
    /// Generic processing error.
    Generic,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::Crop => write!(f, "foreground crop"),
            ProcessingStage::Normalization => write!(f, "normalization"),
            ProcessingStage::Resize => write!(f, "resize"),
            ProcessingStage::TensorOperation => write!(f, "tensor operation"),
            ProcessingStage::Overlay => write!(f, "overlay rendering"),
            ProcessingStage::Generic => write!(f, "processing"),
        }
    }
}

/// Convenient result alias for pipeline operations.
pub type TriageResult<T> = Result<T, TriageError>;

/// Enum representing the errors that can occur in the triage pipeline.
#[derive(Error, Debug)]
pub enum TriageError {
    /// Image bytes are not a valid raster image. Fatal to the request.
    #[error("image decode")]
    Decode(#[source] image::ImageError),

    /// No usable spatial layer (or gradient graph) found for the model.
    /// Explanation is skipped; classification proceeds.
    #[error("model geometry: {message}")]
    Geometry {
        /// A message describing what could not be resolved.
        message: String,
    },

    /// The model's expected tensor rank or extents don't match what was
    /// produced. Fatal, surfaced to the caller.
    #[error("shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Where the mismatch was detected.
        context: String,
        /// The expected shape.
        expected: Vec<usize>,
        /// The shape actually observed.
        actual: Vec<usize>,
    },

    /// Anything failing during gradient computation or saliency aggregation.
    /// Logged and swallowed at the engine boundary.
    #[error("explanation: {context}")]
    Explanation {
        /// Additional context about the failure.
        context: String,
        /// The underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Error occurred during a preprocessing stage.
    #[error("{kind} failed: {context}")]
    Processing {
        /// The stage of processing where the error occurred.
        kind: ProcessingStage,
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error occurred during the forward pass.
    #[error("inference: {context}")]
    Inference {
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error indicating invalid input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error indicating a configuration problem.
    #[error("configuration: {message}")]
    Config {
        /// A message describing the configuration error.
        message: String,
    },

    /// Error from the ONNX Runtime session.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error from tensor operations.
    #[error("tensor operation")]
    Tensor(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

impl TriageError {
    /// Creates a TriageError for an unresolvable model geometry.
    pub fn geometry(message: impl Into<String>) -> Self {
        Self::Geometry {
            message: message.into(),
        }
    }

    /// Creates a TriageError for a tensor whose shape doesn't match the
    /// model's expectation.
    pub fn shape_mismatch(context: &str, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            context: context.to_string(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Creates a TriageError for a failed explanation without an underlying
    /// source error.
    pub fn explanation(context: impl Into<String>) -> Self {
        Self::Explanation {
            context: context.into(),
            source: None,
        }
    }

    /// Creates a TriageError for a failed explanation with an underlying
    /// source error.
    pub fn explanation_with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Explanation {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a TriageError for a failed processing stage.
    pub fn processing(
        kind: ProcessingStage,
        context: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.to_string(),
            source: Box::new(error),
        }
    }

    /// Creates a TriageError for a failed forward pass.
    pub fn inference(
        context: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Inference {
            context: context.to_string(),
            source: Box::new(error),
        }
    }

    /// Creates a TriageError for invalid input.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a TriageError for configuration errors.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true when the failure only affects the visual explanation and
    /// the classification result remains deliverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TriageError::Geometry { .. } | TriageError::Explanation { .. }
        )
    }
}

impl From<image::ImageError> for TriageError {
    fn from(error: image::ImageError) -> Self {
        Self::Decode(error)
    }
}

impl From<crate::core::config::ConfigError> for TriageError {
    fn from(error: crate::core::config::ConfigError) -> Self {
        Self::Config {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classes() {
        assert!(TriageError::geometry("no spatial output").is_recoverable());
        assert!(TriageError::explanation("disconnected graph").is_recoverable());
        assert!(!TriageError::shape_mismatch("input", &[1, 224, 224, 3], &[1, 3]).is_recoverable());
        assert!(!TriageError::invalid_input("empty scores").is_recoverable());
    }

    #[test]
    fn shape_mismatch_display_names_both_shapes() {
        let err = TriageError::shape_mismatch("input tensor", &[1, 224, 224, 3], &[1, 128, 128, 3]);
        let text = err.to_string();
        assert!(text.contains("[1, 224, 224, 3]"));
        assert!(text.contains("[1, 128, 128, 3]"));
    }
}
