use image::{imageops::FilterType, DynamicImage, GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::filter::separable_filter_equal;
use tracing::instrument;

use crate::{clahe, deskew::deskew, util::scale_to_width, Error, Result};

/// 3-tap Gaussian used for noise smoothing, applied horizontally and vertically.
const SMOOTHING_KERNEL: [f32; 3] = [0.25, 0.5, 0.25];

/// Tuning for [`normalize`]. The defaults are what receipts photographed on a phone need.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    pub target_width: u32,
    /// Histogram clip limit for contrast enhancement; zero or less disables clipping.
    pub clip_limit: f32,
    pub tile_grid: (u32, u32),
    pub canny_low: f32,
    pub canny_high: f32,
    pub hough_vote_threshold: u32,
    pub hough_suppression_radius: u32,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            target_width: 1024,
            clip_limit: 3.0,
            tile_grid: (8, 8),
            canny_low: 50.0,
            canny_high: 150.0,
            hough_vote_threshold: 150,
            hough_suppression_radius: 1,
        }
    }
}

impl NormalizeOptions {
    pub fn validate(&self) -> Result<()> {
        if self.target_width == 0 {
            return Err(Error::InvalidOptions("target width must be positive".into()));
        }
        if self.tile_grid.0 == 0 || self.tile_grid.1 == 0 {
            return Err(Error::InvalidOptions(format!(
                "tile grid {:?} must have at least one tile per axis",
                self.tile_grid
            )));
        }
        if self.clip_limit.is_nan() {
            return Err(Error::InvalidOptions("clip limit must be a number".into()));
        }
        if self.canny_low.is_nan()
            || self.canny_high.is_nan()
            || self.canny_low < 0.0
            || self.canny_low > self.canny_high
        {
            return Err(Error::InvalidOptions(format!(
                "canny thresholds {}/{} must satisfy 0 <= low <= high",
                self.canny_low, self.canny_high
            )));
        }
        Ok(())
    }
}

/// Turns a color photo into a recognition-ready image.
///
/// Returns the untouched input next to the processed image, which is `target_width`
/// pixels wide and carries the same luminance in all three channels.
#[instrument(skip(image, options))]
pub fn normalize(image: &RgbImage, options: &NormalizeOptions) -> Result<(RgbImage, RgbImage)> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::InvalidInput(format!(
            "image must not be empty, got {width}x{height}"
        )));
    }
    options.validate()?;

    let gray = to_grayscale(image);
    dump_stage("1_grayscale", &gray);
    let enhanced = clahe::equalize(&gray, options.clip_limit, options.tile_grid);
    dump_stage("2_enhanced", &enhanced);
    let deskewed = deskew(&enhanced, options);
    dump_stage("3_deskewed", &deskewed);
    let smoothed = smooth(&deskewed);
    dump_stage("4_smoothed", &smoothed);
    let resized = resize_to_width(&smoothed, options.target_width);
    dump_stage("5_resized", &resized);

    Ok((image.clone(), broadcast_channels(resized)))
}

/// Accepts any 3-channel image, converting higher bit depths to 8 bits per channel.
pub fn normalize_dynamic(
    image: &DynamicImage,
    options: &NormalizeOptions,
) -> Result<(RgbImage, RgbImage)> {
    let channels = image.color().channel_count();
    if channels != 3 {
        return Err(Error::InvalidInput(format!(
            "expected 3 color channels, got {channels}"
        )));
    }
    match image {
        DynamicImage::ImageRgb8(rgb) => normalize(rgb, options),
        other => normalize(&other.to_rgb8(), options),
    }
}

/// ITU-R BT.601 luma in 14-bit fixed point, so gray inputs map to themselves.
pub fn to_grayscale(image: &RgbImage) -> GrayImage {
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let luma = (r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13)) >> 14;
        Luma([luma as u8])
    })
}

pub fn smooth(image: &GrayImage) -> GrayImage {
    separable_filter_equal(image, &SMOOTHING_KERNEL)
}

pub fn resize_to_width(image: &GrayImage, target_width: u32) -> GrayImage {
    let (width, height) = scale_to_width(image.width(), image.height(), target_width);
    image::imageops::resize(image, width, height, FilterType::Triangle)
}

pub fn broadcast_channels(image: GrayImage) -> RgbImage {
    DynamicImage::ImageLuma8(image).into_rgb8()
}

#[cfg(feature = "debug")]
fn dump_stage(name: &str, image: &GrayImage) {
    let dir = std::path::Path::new("debug_stages");
    let result = std::fs::create_dir_all(dir).map_err(image::ImageError::IoError);
    if let Err(err) = result.and_then(|_| image.save(dir.join(format!("{name}.png")))) {
        log::warn!("Failed to dump {name} stage: {err}");
    }
}

#[cfg(not(feature = "debug"))]
fn dump_stage(_name: &str, _image: &GrayImage) {}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn gray_pixels_keep_their_value() {
        let image = RgbImage::from_fn(4, 1, |x, _| {
            let v = (x * 85) as u8;
            Rgb([v, v, v])
        });
        let gray = to_grayscale(&image);
        assert_eq!(gray.as_raw(), &vec![0, 85, 170, 255]);
    }

    #[test]
    fn luma_weights_favour_green() {
        let image = RgbImage::from_fn(3, 1, |x, _| match x {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            _ => Rgb([0, 0, 255]),
        });
        let gray = to_grayscale(&image);
        assert_eq!(gray.as_raw(), &vec![76, 150, 29]);
    }

    #[test]
    fn smoothing_keeps_flat_regions() {
        let image = GrayImage::from_pixel(9, 7, Luma([123]));
        assert_eq!(smooth(&image), image);
    }

    #[test]
    fn smoothing_softens_a_spike() {
        let mut image = GrayImage::from_pixel(5, 5, Luma([0]));
        image.put_pixel(2, 2, Luma([160]));
        let smoothed = smooth(&image);
        assert_eq!(smoothed.get_pixel(2, 2)[0], 40);
        assert_eq!(smoothed.get_pixel(1, 2)[0], 20);
        assert_eq!(smoothed.get_pixel(1, 1)[0], 10);
    }

    #[test]
    fn broadcast_replicates_luminance() {
        let gray = GrayImage::from_fn(3, 2, |x, y| Luma([(x * 40 + y * 7) as u8]));
        let rgb = broadcast_channels(gray.clone());
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let v = gray.get_pixel(x, y)[0];
            assert_eq!(pixel.0, [v, v, v]);
        }
    }

    #[test]
    fn rejects_bad_options() {
        let image = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        let options = NormalizeOptions {
            target_width: 0,
            ..Default::default()
        };
        assert!(matches!(
            normalize(&image, &options),
            Err(Error::InvalidOptions(_))
        ));
        let options = NormalizeOptions {
            canny_low: 200.0,
            ..Default::default()
        };
        assert!(matches!(
            normalize(&image, &options),
            Err(Error::InvalidOptions(_))
        ));
    }

    #[test]
    fn rejects_nan_canny_thresholds() {
        let low = NormalizeOptions {
            canny_low: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(low.validate(), Err(Error::InvalidOptions(_))));
        let high = NormalizeOptions {
            canny_high: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(high.validate(), Err(Error::InvalidOptions(_))));
    }
}
