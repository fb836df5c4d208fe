//! The core module of the triage pipeline.
//!
//! This module contains the fundamental components shared across the pipeline:
//! - Configuration management
//! - Error handling
//! - Tensor type aliases
//!
//! It also provides re-exports of commonly used types for convenience.

pub mod config;
pub mod errors;

pub use config::{ConfigError, EngineConfig, NormalizationConfig};
pub use errors::{ProcessingStage, TriageError, TriageResult};

/// A 2D tensor of 32-bit floats, typically `(batch, classes)` score matrices.
pub type Tensor2D = ndarray::Array2<f32>;

/// A 4D tensor of 32-bit floats in NHWC layout: `(batch, height, width, channels)`.
pub type Tensor4D = ndarray::Array4<f32>;

/// Initializes the tracing subscriber for logging.
///
/// This function sets up the tracing subscriber with environment filter and
/// formatting layer. It's typically called at the start of an application to
/// enable logging.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
