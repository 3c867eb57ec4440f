// THEORY:
// The `BlobDetector` is the spatial engine of the census. Given one cropped
// region and one label's `ColorProfile`, it finds every ball-sized blob of
// that color. It is a stateless utility: a single call sees a single frame
// and remembers nothing afterwards.
//
// Algorithm steps:
// 1.  **Smoothing**: a 5x5-equivalent Gaussian blur suppresses sensor noise
//     so single hot pixels do not pass the threshold on their own.
// 2.  **Color conversion**: pixels are re-expressed in the profile's color
//     space (raw RGB, or 8-bit HSV).
// 3.  **Thresholding**: every channel must fall inside the profile's inclusive
//     bounds for the pixel to join the binary mask.
// 4.  **Morphological opening**: one erosion pass then one dilation pass with
//     a 3x3 structuring element removes isolated speckles while leaving
//     ball-sized regions with their outline intact.
// 5.  **Contour extraction**: only outer borders without a parent are kept,
//     so a highlight hole inside a ball never becomes a second candidate.
// 6.  **Circle fitting**: each border is summarized by its minimum enclosing
//     circle and its area centroid (see `circle`). Zero-area borders are
//     dropped.
// 7.  **Acceptance band**: only circles whose radius lies strictly inside the
//     band survive. The band is the primary false-positive control: below it
//     are noise specks, above it are merged clusters or table features.

use crate::core_modules::circle::{DetectedCircle, fit_contour};
use crate::core_modules::color_profile::{ColorProfile, ColorSpace};
use crate::core_modules::pixel::pixel::Pixel;
use serde::{Deserialize, Serialize};

/// Radius limits, in working-resolution pixels, for a blob to count as a ball.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceBand {
    pub min_radius: f64,
    pub max_radius: f64,
}

impl AcceptanceBand {
    pub const DEFAULT_MIN_RADIUS: f64 = 3.0;
    pub const DEFAULT_MAX_RADIUS: f64 = 15.0;

    /// Both limits are exclusive.
    pub fn accepts(&self, radius: f64) -> bool {
        radius > self.min_radius && radius < self.max_radius
    }
}

impl Default for AcceptanceBand {
    fn default() -> Self {
        Self {
            min_radius: Self::DEFAULT_MIN_RADIUS,
            max_radius: Self::DEFAULT_MAX_RADIUS,
        }
    }
}

pub mod blob_detector {
    use super::*;
    use image::{GrayImage, Luma, RgbImage};
    use imageproc::contours::{BorderType, find_contours};
    use imageproc::distance_transform::Norm;
    use imageproc::filter::gaussian_blur_f32;
    use imageproc::morphology;

    /// Sigma matching a 5x5 Gaussian kernel.
    pub const BLUR_SIGMA: f32 = 1.1;
    /// L-infinity radius of the opening element (1 => 3x3 square).
    pub const OPENING_RADIUS: u8 = 1;

    const FOREGROUND: Luma<u8> = Luma([255]);
    const BACKGROUND: Luma<u8> = Luma([0]);

    /// Full detector contract: smooth, threshold, open, fit, filter.
    pub fn find_circles(
        region: &RgbImage,
        profile: &ColorProfile,
        color_space: ColorSpace,
        band: AcceptanceBand,
    ) -> Vec<DetectedCircle> {
        let smoothed = smooth(region);
        find_circles_in_smoothed(&smoothed, profile, color_space, band)
    }

    /// Same as `find_circles` for a region that has already been blurred. The
    /// census smooths each crop once and runs every label against it.
    pub fn find_circles_in_smoothed(
        smoothed: &RgbImage,
        profile: &ColorProfile,
        color_space: ColorSpace,
        band: AcceptanceBand,
    ) -> Vec<DetectedCircle> {
        let mask = open(&threshold(smoothed, profile, color_space));
        let candidates = fit_blobs(&mask);
        let total = candidates.len();

        let accepted: Vec<DetectedCircle> = candidates
            .into_iter()
            .filter(|circle| band.accepts(circle.radius))
            .collect();

        tracing::trace!(
            label = %profile.label,
            candidates = total,
            accepted = accepted.len(),
            "Blob detection finished"
        );
        accepted
    }

    pub fn smooth(region: &RgbImage) -> RgbImage {
        gaussian_blur_f32(region, BLUR_SIGMA)
    }

    /// Binary mask of the pixels inside the profile's bounds.
    pub fn threshold(region: &RgbImage, profile: &ColorProfile, color_space: ColorSpace) -> GrayImage {
        GrayImage::from_fn(region.width(), region.height(), |x, y| {
            let pixel = Pixel::from(region.get_pixel(x, y));
            let channels = match color_space {
                ColorSpace::Rgb => pixel.channels(),
                ColorSpace::Hsv => pixel.to_hsv(),
            };
            if profile.contains(channels) {
                FOREGROUND
            } else {
                BACKGROUND
            }
        })
    }

    /// One erosion followed by one dilation.
    pub fn open(mask: &GrayImage) -> GrayImage {
        morphology::open(mask, Norm::LInf, OPENING_RADIUS)
    }

    /// Fits every external contour of `mask`, before the acceptance band.
    pub fn fit_blobs(mask: &GrayImage) -> Vec<DetectedCircle> {
        find_contours::<i32>(mask)
            .into_iter()
            .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
            .filter_map(|contour| {
                let fitted = fit_contour(&contour.points);
                if fitted.is_none() {
                    tracing::trace!(points = contour.points.len(), "Skipping zero-area contour");
                }
                fitted
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::blob_detector;
    use super::*;
    use crate::core_modules::color_profile::BallLabel;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    fn white_profile() -> ColorProfile {
        ColorProfile::new(BallLabel::White, [200, 200, 200], [255, 255, 255]).unwrap()
    }

    fn frame_with_disk(radius: i32) -> RgbImage {
        let mut frame = RgbImage::new(100, 100);
        draw_filled_circle_mut(&mut frame, (50, 50), radius, WHITE);
        frame
    }

    fn detect(frame: &RgbImage) -> Vec<DetectedCircle> {
        blob_detector::find_circles(frame, &white_profile(), ColorSpace::Rgb, AcceptanceBand::default())
    }

    #[test]
    fn blob_inside_band_yields_one_circle() {
        let circles = detect(&frame_with_disk(8));
        assert_eq!(circles.len(), 1);
        let circle = circles[0];
        assert!((circle.centroid.0 - 50.0).abs() < 1.5);
        assert!((circle.centroid.1 - 50.0).abs() < 1.5);
        assert!(circle.radius > 5.0 && circle.radius < 10.0);
    }

    #[test]
    fn blob_below_band_is_rejected() {
        assert!(detect(&frame_with_disk(2)).is_empty());
    }

    #[test]
    fn blob_above_band_is_rejected() {
        assert!(detect(&frame_with_disk(25)).is_empty());
    }

    #[test]
    fn empty_region_yields_nothing() {
        assert!(detect(&RgbImage::new(40, 30)).is_empty());
    }

    #[test]
    fn separate_blobs_are_counted_separately() {
        let mut frame = RgbImage::new(120, 60);
        draw_filled_circle_mut(&mut frame, (25, 30), 7, WHITE);
        draw_filled_circle_mut(&mut frame, (90, 30), 7, WHITE);
        assert_eq!(detect(&frame).len(), 2);
    }

    #[test]
    fn hsv_profile_selects_by_hue() {
        let mut frame = RgbImage::new(100, 60);
        draw_filled_circle_mut(&mut frame, (25, 30), 8, Rgb([230, 200, 20]));
        draw_filled_circle_mut(&mut frame, (75, 30), 8, Rgb([200, 20, 20]));

        let yellow = ColorProfile::new(BallLabel::Yellow, [20, 150, 150], [35, 255, 255]).unwrap();
        let circles = blob_detector::find_circles(&frame, &yellow, ColorSpace::Hsv, AcceptanceBand::default());

        assert_eq!(circles.len(), 1);
        assert!(circles[0].centroid.0 < 50.0);
    }

    #[test]
    fn opening_removes_isolated_pixels() {
        let mut mask = GrayImage::new(20, 20);
        mask.put_pixel(5, 5, Luma([255]));
        draw_filled_rect_mut(&mut mask, Rect::at(10, 10).of_size(6, 6), Luma([255]));

        let opened = blob_detector::open(&mask);

        assert_eq!(opened.get_pixel(5, 5), &Luma([0]));
        assert_eq!(opened.get_pixel(12, 12), &Luma([255]));
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut frame = RgbImage::new(3, 1);
        frame.put_pixel(0, 0, Rgb([200, 200, 200]));
        frame.put_pixel(1, 0, Rgb([199, 255, 255]));
        frame.put_pixel(2, 0, Rgb([255, 255, 255]));

        let mask = blob_detector::threshold(&frame, &white_profile(), ColorSpace::Rgb);

        assert_eq!(mask.get_pixel(0, 0), &Luma([255]));
        assert_eq!(mask.get_pixel(1, 0), &Luma([0]));
        assert_eq!(mask.get_pixel(2, 0), &Luma([255]));
    }

    #[test]
    fn band_limits_are_exclusive() {
        let band = AcceptanceBand::default();
        assert!(!band.accepts(3.0));
        assert!(band.accepts(3.01));
        assert!(band.accepts(14.99));
        assert!(!band.accepts(15.0));
    }
}
