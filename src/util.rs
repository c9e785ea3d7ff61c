use float_ord::FloatOrd;
use image::{GrayImage, ImageBuffer, Luma};
use nalgebra::{Rotation2, Vector2};
use tracing::instrument;

/// Coefficient of the cubic convolution kernel, same as the common bicubic warp.
const CUBIC_A: f32 = -0.75;

/// Target dimensions for scaling an image to a fixed width, preserving aspect ratio.
/// The height is floored and never drops below one pixel.
pub fn scale_to_width(width: u32, height: u32, target_width: u32) -> (u32, u32) {
    let target_height = (height as u64 * target_width as u64 / width as u64) as u32;
    if target_height == 0 {
        log::debug!(
            "Target height for (w: {width}, h: {height}) rounds to zero, clamping to one row."
        );
    }
    let target_height = target_height.max(1);
    log::debug!("Resize will change image dimensions from (w: {width}, h: {height}) to (w: {target_width}, h: {target_height}).");
    (target_width, target_height)
}

/// Median of the values, averaging the two middle values for an even count.
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by_key(|it| FloatOrd(*it));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Rotates the image about its center by `angle_degrees`, positive meaning clockwise as
/// displayed (y axis pointing down). The output keeps the input dimensions; samples that
/// fall outside the source frame repeat the nearest edge pixel.
#[instrument(level = "debug", skip(image))]
pub fn rotate_about_center(image: &GrayImage, angle_degrees: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    let inverse = Rotation2::new(-angle_degrees.to_radians());
    let center = Vector2::new((width / 2) as f32, (height / 2) as f32);
    ImageBuffer::from_fn(width, height, |x, y| {
        let source = inverse * (Vector2::new(x as f32, y as f32) - center) + center;
        Luma([sample_bicubic(image, source.x, source.y)])
    })
}

fn cubic_weight(t: f32) -> f32 {
    let t = t.abs();
    if t <= 1.0 {
        ((CUBIC_A + 2.0) * t - (CUBIC_A + 3.0)) * t * t + 1.0
    } else if t < 2.0 {
        ((CUBIC_A * t - 5.0 * CUBIC_A) * t + 8.0 * CUBIC_A) * t - 4.0 * CUBIC_A
    } else {
        0.0
    }
}

fn sample_bicubic(image: &GrayImage, x: f32, y: f32) -> u8 {
    let max_x = image.width() as i64 - 1;
    let max_y = image.height() as i64 - 1;
    let x0 = x.floor();
    let y0 = y.floor();
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let mut value = 0.0;
    for j in -1..=2i64 {
        let wy = cubic_weight(fy - j as f32);
        if wy == 0.0 {
            continue;
        }
        let sy = (y0 + j).clamp(0, max_y) as u32;
        let mut row = 0.0;
        for i in -1..=2i64 {
            let wx = cubic_weight(fx - i as f32);
            if wx == 0.0 {
                continue;
            }
            let sx = (x0 + i).clamp(0, max_x) as u32;
            row += wx * image.get_pixel(sx, sy)[0] as f32;
        }
        value += wy * row;
    }
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_odd_and_even_counts() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0, -1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn scale_to_width_floors_height() {
        assert_eq!(scale_to_width(300, 500, 1024), (1024, 1706));
        assert_eq!(scale_to_width(2048, 1000, 1024), (1024, 500));
        assert_eq!(scale_to_width(5000, 1, 1024), (1024, 1));
    }

    #[test]
    fn zero_rotation_is_identity() {
        let image = GrayImage::from_fn(17, 9, |x, y| Luma([((x * 13 + y * 7) % 256) as u8]));
        assert_eq!(rotate_about_center(&image, 0.0), image);
    }

    #[test]
    fn rotation_replicates_edges_of_uniform_image() {
        let image = GrayImage::from_pixel(40, 30, Luma([77]));
        let rotated = rotate_about_center(&image, 12.5);
        assert!(rotated.pixels().all(|p| p[0] == 77));
    }

    #[test]
    fn quarter_turn_moves_right_edge_to_bottom() {
        let image = GrayImage::from_fn(21, 21, |x, _| Luma([if x >= 15 { 255 } else { 0 }]));
        let rotated = rotate_about_center(&image, 90.0);
        assert_eq!(rotated.get_pixel(10, 19)[0], 255);
        assert_eq!(rotated.get_pixel(10, 1)[0], 0);
    }
}
