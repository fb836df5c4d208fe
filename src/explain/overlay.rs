//! Colorized saliency overlays.
//!
//! Upsamples a low-resolution saliency map to the original image's extent,
//! maps intensities through a color scheme, and blends the result additively
//! onto the source scan. The overlay is rendered at the ORIGINAL resolution,
//! not the model input resolution.

use crate::core::errors::{ProcessingStage, TriageError, TriageResult};
use crate::explain::gradcam::SaliencyMap;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Color mapping applied to saliency intensities before blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorScheme {
    /// Blue through green to red, the conventional heatmap palette.
    #[default]
    Jet,
    /// Black through red and yellow to white.
    Hot,
}

impl ColorScheme {
    /// Maps a unit-interval intensity to an RGB color.
    pub fn color(&self, t: f32) -> Rgb<u8> {
        let t = t.clamp(0.0, 1.0);
        let (r, g, b) = match self {
            ColorScheme::Jet => (
                (1.5 - (4.0 * t - 3.0).abs()).clamp(0.0, 1.0),
                (1.5 - (4.0 * t - 2.0).abs()).clamp(0.0, 1.0),
                (1.5 - (4.0 * t - 1.0).abs()).clamp(0.0, 1.0),
            ),
            ColorScheme::Hot => (
                (3.0 * t).clamp(0.0, 1.0),
                (3.0 * t - 1.0).clamp(0.0, 1.0),
                (3.0 * t - 2.0).clamp(0.0, 1.0),
            ),
        };
        Rgb([
            (r * 255.0).round() as u8,
            (g * 255.0).round() as u8,
            (b * 255.0).round() as u8,
        ])
    }
}

/// Blends a colorized saliency map onto the original image.
///
/// The map is bilinearly upsampled to the original's dimensions, colorized
/// through `scheme`, and alpha-blended onto the source pixels with
/// `blend_weight` as the heatmap's opacity. `blend_weight` of `0.0` returns
/// the original unchanged; `1.0` yields the pure colormap.
///
/// # Errors
///
/// Rejects empty images and maps, and a `blend_weight` outside `[0, 1]`.
pub fn render_overlay(
    original: &RgbImage,
    map: &SaliencyMap,
    blend_weight: f32,
    scheme: ColorScheme,
) -> TriageResult<RgbImage> {
    if original.width() == 0 || original.height() == 0 {
        return Err(TriageError::invalid_input("original image has zero extent"));
    }
    if map.width() == 0 || map.height() == 0 {
        return Err(TriageError::invalid_input("saliency map has zero extent"));
    }
    if !(0.0..=1.0).contains(&blend_weight) {
        return Err(TriageError::invalid_input(format!(
            "blend weight {blend_weight} outside [0, 1]"
        )));
    }

    let heat = imageops::resize(
        &map.to_gray_image(),
        original.width(),
        original.height(),
        FilterType::Triangle,
    );

    let mut out = original.clone();
    for (pixel, heat_pixel) in out.pixels_mut().zip(heat.pixels()) {
        let color = scheme.color(heat_pixel.0[0] as f32 / 255.0);
        for c in 0..3 {
            let blended =
                (1.0 - blend_weight) * pixel.0[c] as f32 + blend_weight * color.0[c] as f32;
            pixel.0[c] = blended.round() as u8;
        }
    }

    debug!(
        width = out.width(),
        height = out.height(),
        blend_weight,
        "overlay rendered"
    );

    Ok(out)
}

/// Writes an overlay image to `path`, creating missing parent directories.
///
/// The output format follows the path's extension (PNG for `.png`, and so on).
pub fn save_overlay(path: impl AsRef<Path>, overlay: &RgbImage) -> TriageResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    overlay
        .save(path)
        .map_err(|e| TriageError::processing(ProcessingStage::Overlay, "saving overlay image", e))?;
    debug!(path = %path.display(), "overlay saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn uniform_map(value: f32) -> SaliencyMap {
        SaliencyMap::from_values(Array2::from_elem((2, 2), value))
    }

    #[test]
    fn jet_endpoints() {
        // Low intensity maps toward blue, high toward red.
        let low = ColorScheme::Jet.color(0.0);
        assert!(low.0[2] > low.0[0]);
        let high = ColorScheme::Jet.color(1.0);
        assert!(high.0[0] > high.0[2]);
        let mid = ColorScheme::Jet.color(0.5);
        assert!(mid.0[1] >= mid.0[0] && mid.0[1] >= mid.0[2]);
    }

    #[test]
    fn hot_starts_black_and_ends_white() {
        assert_eq!(ColorScheme::Hot.color(0.0), Rgb([0, 0, 0]));
        assert_eq!(ColorScheme::Hot.color(1.0), Rgb([255, 255, 255]));
    }

    #[test]
    fn overlay_matches_original_dimensions() {
        let original = RgbImage::from_pixel(64, 48, Rgb([10, 10, 10]));
        let overlay = render_overlay(&original, &uniform_map(1.0), 0.35, ColorScheme::Jet).unwrap();
        assert_eq!((overlay.width(), overlay.height()), (64, 48));
    }

    #[test]
    fn zero_blend_weight_leaves_original_untouched() {
        let original = RgbImage::from_pixel(8, 8, Rgb([42, 17, 99]));
        let overlay = render_overlay(&original, &uniform_map(1.0), 0.0, ColorScheme::Jet).unwrap();
        assert_eq!(overlay, original);
    }

    #[test]
    fn full_blend_weight_yields_the_pure_colormap() {
        let original = RgbImage::from_pixel(8, 8, Rgb([250, 250, 250]));
        let overlay = render_overlay(&original, &uniform_map(0.0), 1.0, ColorScheme::Hot).unwrap();
        // Zero saliency under hot maps to black, regardless of the source.
        assert_eq!(*overlay.get_pixel(4, 4), Rgb([0, 0, 0]));
    }

    #[test]
    fn heatmap_opacity_darkens_bright_regions_under_low_saliency() {
        let original = RgbImage::from_pixel(8, 8, Rgb([255, 255, 255]));
        let overlay =
            render_overlay(&original, &uniform_map(0.0), 0.35, ColorScheme::Hot).unwrap();
        // 0.65 * 255 + 0.35 * 0, rounded.
        assert_eq!(*overlay.get_pixel(4, 4), Rgb([166, 166, 166]));
    }

    #[test]
    fn out_of_range_blend_weight_is_rejected() {
        let original = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        assert!(render_overlay(&original, &uniform_map(0.5), 1.5, ColorScheme::Jet).is_err());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("scan_overlay.png");
        let overlay = RgbImage::from_pixel(4, 4, Rgb([128, 64, 32]));
        save_overlay(&path, &overlay).unwrap();
        assert!(path.exists());
    }
}
