//! Visual explanation of classifier predictions.
//!
//! - [`gradcam`] - Gradient-weighted class-activation mapping over the last
//!   spatial layer
//! - [`overlay`] - Colorized blending of the saliency map onto the original
//!   full-resolution image

pub mod gradcam;
pub mod overlay;

pub use gradcam::{SaliencyMap, explain};
pub use overlay::{ColorScheme, render_overlay, save_overlay};
