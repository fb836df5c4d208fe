//! Model geometry resolution.
//!
//! Resolves two facts about a loaded classifier: the spatial input extent it
//! expects, and which graph output carries the last high-dimensional
//! (spatial) feature map used for explanation. Name-based introspection is
//! configuration-supplied; the rank-4 reverse scan is the architecture-
//! agnostic fallback.

use serde::{Deserialize, Serialize};

/// Input extent assumed when the model declares no concrete spatial shape.
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (224, 224);

/// The last layer of the network whose output retains two spatial axes.
///
/// Identified by its graph output name; extents are concrete (dynamic
/// dimensions have been materialized by a dummy forward pass).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialLayer {
    /// The graph output name carrying the activations.
    pub name: String,
    /// Spatial height of the feature map.
    pub height: usize,
    /// Spatial width of the feature map.
    pub width: usize,
    /// Number of feature channels.
    pub channels: usize,
}

/// Resolves the effective model input size as `(height, width)`.
///
/// Precedence: configuration override, then the model's declared shape, then
/// [`DEFAULT_INPUT_SIZE`].
pub fn input_size(
    config_override: Option<(u32, u32)>,
    declared: Option<(u32, u32)>,
) -> (u32, u32) {
    config_override.or(declared).unwrap_or(DEFAULT_INPUT_SIZE)
}

/// Selects the graph output carrying the last spatial feature map.
///
/// Candidates are `(name, declared dims)` pairs in declaration order.
/// Preferred names matching the expected architecture's deepest block win;
/// otherwise the scan runs in reverse declaration order and returns the first
/// output with four axes (batch, height, width, channels) — the last layer
/// before spatial information is flattened.
pub fn select_spatial_output<'a>(
    outputs: &'a [(String, Vec<i64>)],
    preferred: &[String],
) -> Option<&'a (String, Vec<i64>)> {
    for name in preferred {
        if let Some(output) = outputs
            .iter()
            .find(|(n, dims)| n == name && dims.len() == 4)
        {
            return Some(output);
        }
    }
    outputs.iter().rev().find(|(_, dims)| dims.len() == 4)
}

/// Builds a [`SpatialLayer`] from concrete NHWC dims.
///
/// Returns `None` when any spatial or channel extent is dynamic (non-positive
/// in the declared shape), in which case the caller must materialize the
/// graph with a dummy forward pass first.
pub fn layer_from_dims(name: &str, dims: &[i64]) -> Option<SpatialLayer> {
    if dims.len() != 4 {
        return None;
    }
    let (h, w, c) = (dims[1], dims[2], dims[3]);
    if h <= 0 || w <= 0 || c <= 0 {
        return None;
    }
    Some(SpatialLayer {
        name: name.to_string(),
        height: h as usize,
        width: w as usize,
        channels: c as usize,
    })
}

/// Reads a concrete `(height, width)` from a declared NHWC input shape.
pub fn declared_input_hw(dims: &[i64]) -> Option<(u32, u32)> {
    if dims.len() != 4 {
        return None;
    }
    let (h, w) = (dims[1], dims[2]);
    if h <= 0 || w <= 0 {
        return None;
    }
    Some((h as u32, w as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs() -> Vec<(String, Vec<i64>)> {
        vec![
            ("conv4_out".to_string(), vec![1, 14, 14, 1024]),
            ("conv5_block3_out".to_string(), vec![1, 7, 7, 2048]),
            ("predictions".to_string(), vec![1, 1]),
        ]
    }

    #[test]
    fn preferred_name_wins() {
        let outs = outputs();
        let preferred = vec!["conv5_block3_out".to_string()];
        let (name, _) = select_spatial_output(&outs, &preferred).unwrap();
        assert_eq!(name, "conv5_block3_out");
    }

    #[test]
    fn fallback_scans_in_reverse_declaration_order() {
        let outs = outputs();
        let (name, _) = select_spatial_output(&outs, &[]).unwrap();
        // The last rank-4 output, not the rank-2 score head.
        assert_eq!(name, "conv5_block3_out");
    }

    #[test]
    fn no_spatial_output_yields_none() {
        let outs = vec![("predictions".to_string(), vec![1i64, 3])];
        assert!(select_spatial_output(&outs, &[]).is_none());
    }

    #[test]
    fn preferred_name_must_still_be_spatial() {
        let outs = vec![
            ("flat".to_string(), vec![1i64, 2048]),
            ("conv".to_string(), vec![1, 7, 7, 512]),
        ];
        let preferred = vec!["flat".to_string()];
        let (name, _) = select_spatial_output(&outs, &preferred).unwrap();
        assert_eq!(name, "conv");
    }

    #[test]
    fn input_size_precedence() {
        assert_eq!(input_size(Some((256, 256)), Some((224, 224))), (256, 256));
        assert_eq!(input_size(None, Some((192, 160))), (192, 160));
        assert_eq!(input_size(None, None), DEFAULT_INPUT_SIZE);
    }

    #[test]
    fn dynamic_dims_are_not_concrete() {
        assert!(layer_from_dims("conv", &[1, -1, -1, 2048]).is_none());
        let layer = layer_from_dims("conv", &[1, 7, 7, 2048]).unwrap();
        assert_eq!((layer.height, layer.width, layer.channels), (7, 7, 2048));
    }

    #[test]
    fn declared_input_requires_concrete_spatial_dims() {
        assert_eq!(declared_input_hw(&[-1, 224, 224, 3]), Some((224, 224)));
        assert_eq!(declared_input_hw(&[-1, -1, -1, 3]), None);
        assert_eq!(declared_input_hw(&[1, 2048]), None);
    }
}
