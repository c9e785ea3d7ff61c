use image::GrayImage;
use imageproc::{
    edges::canny,
    hough::{detect_lines, LineDetectionOptions},
};
use tracing::instrument;

use crate::{
    util::{median, rotate_about_center},
    NormalizeOptions,
};

/// Candidate skew angles must lie strictly inside this bound (degrees). Steeper lines are
/// margins, table rules or a sideways photo, not text baselines.
pub const SKEW_LIMIT_DEGREES: f32 = 45.0;

/// Smallest side for which edge detection is attempted.
const MIN_SIDE: u32 = 3;

/// Estimates the dominant skew of text lines, in degrees, positive meaning the lines run
/// clockwise (downhill to the right) from horizontal.
///
/// Returns `None` when the image has no strong lines or none of them is within
/// [`SKEW_LIMIT_DEGREES`] of horizontal.
#[instrument(level = "debug", skip(image, options))]
pub fn estimate_skew(image: &GrayImage, options: &NormalizeOptions) -> Option<f32> {
    if image.width() < MIN_SIDE || image.height() < MIN_SIDE {
        log::debug!("Image too small for line detection, skipping skew estimate.");
        return None;
    }

    let edges = canny(image, options.canny_low, options.canny_high);
    let lines = detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold: options.hough_vote_threshold,
            suppression_radius: options.hough_suppression_radius,
        },
    );

    // Hough angles are those of the line normal, so a horizontal line sits at 90 degrees.
    let candidates = lines
        .iter()
        .map(|line| line.angle_in_degrees as f32 - 90.0)
        .filter(|angle| angle.abs() < SKEW_LIMIT_DEGREES)
        .collect::<Vec<_>>();
    log::debug!(
        "Found {} lines, {} usable as skew candidates.",
        lines.len(),
        candidates.len()
    );

    median(&candidates)
}

/// Straightens text lines by rotating against the estimated skew. Images without a
/// usable estimate are returned unchanged.
#[instrument(level = "debug", skip(image, options))]
pub fn deskew(image: &GrayImage, options: &NormalizeOptions) -> GrayImage {
    match estimate_skew(image, options) {
        Some(angle) if angle != 0.0 => {
            log::debug!("Correcting skew of {angle} degrees.");
            rotate_about_center(image, -angle)
        }
        Some(_) => image.clone(),
        None => {
            log::debug!("No skew estimate, leaving image unrotated.");
            image.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    fn ruled_page() -> GrayImage {
        GrayImage::from_fn(400, 300, |_, y| {
            Luma([if y % 60 >= 30 && y % 60 < 40 { 0 } else { 255 }])
        })
    }

    #[test]
    fn featureless_image_has_no_estimate() {
        let image = GrayImage::from_pixel(120, 80, Luma([200]));
        let options = NormalizeOptions::default();
        assert_eq!(estimate_skew(&image, &options), None);
        assert_eq!(deskew(&image, &options), image);
    }

    #[test]
    fn tiny_image_is_left_alone() {
        let image = GrayImage::from_pixel(2, 2, Luma([10]));
        assert_eq!(deskew(&image, &NormalizeOptions::default()), image);
    }

    #[test]
    fn horizontal_rules_have_no_skew() {
        let skew = estimate_skew(&ruled_page(), &NormalizeOptions::default());
        assert_eq!(skew, Some(0.0));
    }

    #[test]
    fn rotated_rules_report_their_angle() {
        let rotated = rotate_about_center(&ruled_page(), 7.0);
        let skew = estimate_skew(&rotated, &NormalizeOptions::default()).unwrap();
        assert!((skew - 7.0).abs() <= 1.0, "estimated {skew}");

        let rotated = rotate_about_center(&ruled_page(), -12.0);
        let skew = estimate_skew(&rotated, &NormalizeOptions::default()).unwrap();
        assert!((skew + 12.0).abs() <= 1.0, "estimated {skew}");
    }

    #[test]
    fn vertical_rules_are_not_skew_candidates() {
        let image = GrayImage::from_fn(300, 300, |x, _| {
            Luma([if x % 60 >= 30 && x % 60 < 40 { 0 } else { 255 }])
        });
        assert_eq!(estimate_skew(&image, &NormalizeOptions::default()), None);
    }
}
