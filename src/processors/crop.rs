//! Foreground localization for brain scans.
//!
//! Scans are usually a bright brain region on a mostly black background.
//! Cropping to the foreground before resizing removes dead border pixels and
//! reproduces the crop used when the classifier was trained, so the operation
//! must stay deterministic: grayscale, Gaussian blur, Otsu binarization, one
//! morphological opening pass, then the bounding box of the largest external
//! contour padded by a fixed margin.

use image::{GrayImage, RgbImage, imageops};
use imageproc::contours::{BorderType, find_contours};
use imageproc::contrast::{ThresholdType, otsu_level, threshold};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{dilate, erode};
use imageproc::point::Point;

/// Sigma equivalent to a 5x5 Gaussian kernel with auto sigma
/// (0.3 * ((5 - 1) * 0.5 - 1) + 0.8).
const BLUR_SIGMA: f32 = 1.1;

/// A rectangular sub-region of an image, with exclusive right/bottom bounds.
///
/// Invariant: always clamped within the bounds of the image it was derived
/// from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    /// Left edge, inclusive.
    pub x0: u32,
    /// Top edge, inclusive.
    pub y0: u32,
    /// Right edge, exclusive.
    pub x1: u32,
    /// Bottom edge, exclusive.
    pub y1: u32,
}

impl CropRegion {
    /// Returns the region covering the whole image.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: width,
            y1: height,
        }
    }

    /// Width of the region in pixels.
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    /// Height of the region in pixels.
    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    /// Returns true when the region covers the whole image of the given size.
    pub fn is_full(&self, width: u32, height: u32) -> bool {
        *self == Self::full(width, height)
    }
}

/// Locates the dominant foreground region of a scan.
///
/// A pure, side-effect-free operation: the same image always yields the same
/// region. When no contour is found, or the padded rectangle degenerates, the
/// full image is returned unchanged.
#[derive(Debug, Clone)]
pub struct ForegroundCropper {
    /// Padding in pixels added on all sides of the detected bounding box,
    /// clamped to the image bounds.
    pub margin: u32,
}

impl Default for ForegroundCropper {
    fn default() -> Self {
        Self { margin: 8 }
    }
}

impl ForegroundCropper {
    /// Creates a cropper with the given bounding-box margin.
    pub fn new(margin: u32) -> Self {
        Self { margin }
    }

    /// Locates the foreground bounding box of the image.
    ///
    /// # Arguments
    ///
    /// * `img` - The RGB image to analyze.
    ///
    /// # Returns
    ///
    /// The padded, clamped bounding box of the largest external contour, or
    /// the full image when no usable contour exists.
    pub fn locate(&self, img: &RgbImage) -> CropRegion {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return CropRegion::full(width, height);
        }

        let gray: GrayImage = imageops::grayscale(img);
        let blurred = gaussian_blur_f32(&gray, BLUR_SIGMA);
        let level = otsu_level(&blurred);
        let binary = threshold(&blurred, level, ThresholdType::Binary);

        // Opening: one erosion then one dilation with a 3x3 structuring
        // element removes speckle while keeping the main blob intact.
        let opened = dilate(&erode(&binary, Norm::LInf, 1), Norm::LInf, 1);

        let contours = find_contours::<i32>(&opened);
        let largest = contours
            .iter()
            .filter(|c| c.border_type == BorderType::Outer && !c.points.is_empty())
            .fold(None::<(&Vec<Point<i32>>, f64)>, |best, c| {
                let area = contour_area(&c.points);
                match best {
                    // Strict comparison keeps the first contour on ties.
                    Some((_, best_area)) if area <= best_area => best,
                    _ => Some((&c.points, area)),
                }
            });

        let Some((points, _)) = largest else {
            return CropRegion::full(width, height);
        };

        let (bx0, by0, bx1, by1) = bounding_box(points);
        let x0 = bx0.saturating_sub(self.margin);
        let y0 = by0.saturating_sub(self.margin);
        let x1 = (bx1 + self.margin).min(width);
        let y1 = (by1 + self.margin).min(height);

        if x1 <= x0 || y1 <= y0 {
            return CropRegion::full(width, height);
        }

        CropRegion { x0, y0, x1, y1 }
    }

    /// Crops the image to its located foreground region.
    ///
    /// # Arguments
    ///
    /// * `img` - The RGB image to crop.
    ///
    /// # Returns
    ///
    /// A new image containing only the foreground region, and the region it
    /// was taken from.
    pub fn crop(&self, img: &RgbImage) -> (RgbImage, CropRegion) {
        let region = self.locate(img);
        let cropped = imageops::crop_imm(img, region.x0, region.y0, region.width(), region.height())
            .to_image();
        (cropped, region)
    }
}

/// Absolute polygon area of a closed contour via the shoelace formula.
fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut doubled: i64 = 0;
    for i in 0..points.len() {
        let p = points[i];
        let q = points[(i + 1) % points.len()];
        doubled += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    doubled.abs() as f64 / 2.0
}

/// Axis-aligned bounding box of contour points, exclusive right/bottom.
fn bounding_box(points: &[Point<i32>]) -> (u32, u32, u32, u32) {
    let mut min_x = i32::MAX;
    let mut min_y = i32::MAX;
    let mut max_x = i32::MIN;
    let mut max_y = i32::MIN;
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    (
        min_x.max(0) as u32,
        min_y.max(0) as u32,
        (max_x.max(0) as u32) + 1,
        (max_y.max(0) as u32) + 1,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn image_with_blob(
        width: u32,
        height: u32,
        bx: u32,
        by: u32,
        bw: u32,
        bh: u32,
    ) -> RgbImage {
        let mut img = RgbImage::new(width, height);
        for y in by..(by + bh).min(height) {
            for x in bx..(bx + bw).min(width) {
                img.put_pixel(x, y, Rgb([230, 230, 230]));
            }
        }
        img
    }

    #[test]
    fn blob_is_contained_in_padded_region() {
        let cropper = ForegroundCropper::new(8);
        let img = image_with_blob(64, 64, 20, 20, 20, 20);
        let region = cropper.locate(&img);

        // The detected region must fully contain the blob...
        assert!(region.x0 <= 20, "x0 = {}", region.x0);
        assert!(region.y0 <= 20, "y0 = {}", region.y0);
        assert!(region.x1 >= 40, "x1 = {}", region.x1);
        assert!(region.y1 >= 40, "y1 = {}", region.y1);

        // ...expanded by the margin but not the whole image.
        assert!(!region.is_full(64, 64));
        assert!(region.x1 <= 64 && region.y1 <= 64);
    }

    #[test]
    fn blank_image_degrades_to_full_region() {
        let cropper = ForegroundCropper::default();
        let img = RgbImage::new(48, 32);
        let region = cropper.locate(&img);
        assert!(region.is_full(48, 32));
    }

    #[test]
    fn margin_is_clamped_at_image_bounds() {
        let cropper = ForegroundCropper::new(8);
        let img = image_with_blob(40, 40, 0, 0, 10, 10);
        let region = cropper.locate(&img);
        assert_eq!(region.x0, 0);
        assert_eq!(region.y0, 0);
        assert!(region.x1 <= 40 && region.y1 <= 40);
    }

    #[test]
    fn crop_returns_region_sized_image() {
        let cropper = ForegroundCropper::new(4);
        let img = image_with_blob(64, 64, 24, 24, 16, 16);
        let (cropped, region) = cropper.crop(&img);
        assert_eq!(cropped.dimensions(), (region.width(), region.height()));
    }

    #[test]
    fn same_image_yields_same_region() {
        let cropper = ForegroundCropper::default();
        let img = image_with_blob(64, 64, 10, 14, 30, 22);
        assert_eq!(cropper.locate(&img), cropper.locate(&img));
    }
}
