//! Contrast-limited adaptive histogram equalization.
//!
//! The image is split into a grid of equally sized tiles (the last row and column of
//! tiles are padded by repeating edge pixels). Each tile gets its own equalization
//! lookup table built from a clipped histogram, and every output pixel bilinearly
//! blends the tables of the four nearest tile centers.

use image::{GrayImage, ImageBuffer, Luma};
use tracing::instrument;

const BINS: usize = 256;

#[instrument(level = "debug", skip(image))]
pub fn equalize(image: &GrayImage, clip_limit: f32, grid: (u32, u32)) -> GrayImage {
    let (width, height) = image.dimensions();
    let (cols, rows) = grid;
    let tile_width = width.div_ceil(cols);
    let tile_height = height.div_ceil(rows);
    let tile_area = tile_width * tile_height;

    let limit = if clip_limit > 0.0 {
        Some(((clip_limit * tile_area as f32 / BINS as f32) as u32).max(1))
    } else {
        None
    };
    log::debug!(
        "Equalizing {cols}x{rows} tiles of {tile_width}x{tile_height}, histogram clip limit {limit:?}."
    );

    let luts = (0..rows)
        .flat_map(|ty| (0..cols).map(move |tx| (tx, ty)))
        .map(|(tx, ty)| {
            let mut histogram = tile_histogram(
                image,
                tx * tile_width,
                ty * tile_height,
                tile_width,
                tile_height,
            );
            if let Some(limit) = limit {
                clip_histogram(&mut histogram, limit);
            }
            lookup_table(&histogram, tile_area)
        })
        .collect::<Vec<_>>();

    let inv_tile_width = 1.0 / tile_width as f32;
    let inv_tile_height = 1.0 / tile_height as f32;
    ImageBuffer::from_fn(width, height, |x, y| {
        let (tx1, tx2, xa) = neighbours(x as f32 * inv_tile_width - 0.5, cols);
        let (ty1, ty2, ya) = neighbours(y as f32 * inv_tile_height - 0.5, rows);
        let value = image.get_pixel(x, y)[0] as usize;
        let lut = |tx: usize, ty: usize| luts[ty * cols as usize + tx][value] as f32;

        let top = lut(tx1, ty1) * (1.0 - xa) + lut(tx2, ty1) * xa;
        let bottom = lut(tx1, ty2) * (1.0 - xa) + lut(tx2, ty2) * xa;
        Luma([(top * (1.0 - ya) + bottom * ya).round().clamp(0.0, 255.0) as u8])
    })
}

/// Indices of the two tiles whose centers bracket `position` (in tile units) and the
/// blend weight of the second one.
fn neighbours(position: f32, count: u32) -> (usize, usize, f32) {
    let first = position.floor();
    let weight = position - first;
    let first = first as i64;
    let last = count as i64 - 1;
    (
        first.clamp(0, last) as usize,
        (first + 1).clamp(0, last) as usize,
        weight,
    )
}

fn tile_histogram(image: &GrayImage, x0: u32, y0: u32, width: u32, height: u32) -> [u32; BINS] {
    let max_x = image.width() - 1;
    let max_y = image.height() - 1;
    let mut histogram = [0u32; BINS];
    for y in y0..y0 + height {
        for x in x0..x0 + width {
            let value = image.get_pixel(x.min(max_x), y.min(max_y))[0];
            histogram[value as usize] += 1;
        }
    }
    histogram
}

/// Caps every bin at `limit` and spreads the excess evenly over all bins.
fn clip_histogram(histogram: &mut [u32; BINS], limit: u32) {
    let mut excess = 0;
    for bin in histogram.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }

    let batch = excess / BINS as u32;
    let residual = (excess - batch * BINS as u32) as usize;
    for bin in histogram.iter_mut() {
        *bin += batch;
    }
    if residual != 0 {
        let step = (BINS / residual).max(1);
        for bin in histogram.iter_mut().step_by(step).take(residual) {
            *bin += 1;
        }
    }
}

fn lookup_table(histogram: &[u32; BINS], area: u32) -> [u8; BINS] {
    let scale = (BINS - 1) as f32 / area as f32;
    let mut lut = [0u8; BINS];
    let mut sum = 0;
    for (entry, count) in lut.iter_mut().zip(histogram) {
        sum += count;
        *entry = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_image_stays_uniform() {
        let image = GrayImage::from_pixel(50, 37, Luma([140]));
        let equalized = equalize(&image, 3.0, (8, 8));
        let first = equalized.get_pixel(0, 0)[0];
        assert!(equalized.pixels().all(|p| p[0] == first));
    }

    #[test]
    fn single_pixel_image_is_supported() {
        let image = GrayImage::from_pixel(1, 1, Luma([9]));
        let equalized = equalize(&image, 3.0, (8, 8));
        assert_eq!(equalized.dimensions(), (1, 1));
    }

    #[test]
    fn faint_stripes_gain_contrast() {
        let image = GrayImage::from_fn(256, 256, |x, _| {
            Luma([if (x / 2) % 2 == 0 { 100 } else { 110 }])
        });
        let equalized = equalize(&image, 3.0, (8, 8));
        let dark = equalized.get_pixel(0, 0)[0];
        let light = equalized.get_pixel(2, 0)[0];
        assert!(light > dark);
        assert!(light - dark > 10);
    }

    #[test]
    fn clipping_preserves_total_count() {
        let mut histogram = [0u32; BINS];
        histogram[10] = 1000;
        histogram[200] = 24;
        clip_histogram(&mut histogram, 12);
        assert_eq!(histogram.iter().sum::<u32>(), 1024);
        assert!(histogram[10] <= 12 + 1000 / BINS as u32 + 1);
    }

    #[test]
    fn lookup_table_ends_at_full_scale() {
        let mut histogram = [0u32; BINS];
        histogram[0] = 32;
        histogram[255] = 32;
        let lut = lookup_table(&histogram, 64);
        assert_eq!(lut[255], 255);
        assert_eq!(lut[0], 128);
    }
}
