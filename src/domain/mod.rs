//! Clinical decision types.
//!
//! Turns raw classifier scores into a labeled, confidence-scored prediction
//! and carries the final report returned to callers.

pub mod decision;

pub use decision::{PredictionResult, decide};
