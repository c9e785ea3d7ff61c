//! Overlay of recognition results for human review.
//!
//! Every detection is drawn as the axis-aligned bounding box of its quadrilateral with a
//! label panel sitting directly on top of the box. Label glyphs need a font; without one
//! the panels are still laid out from fixed glyph metrics and the text itself is skipped.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_antialiased_line_segment_mut, draw_filled_rect_mut, draw_text_mut, text_size},
    pixelops::interpolate,
    rect::Rect,
};
use tracing::{debug, info, instrument};

use crate::{Detection, Error, Result};

const ACCENT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const LABEL_BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

const LABEL_PADDING_X: u32 = 20;
const LABEL_PADDING_Y: u32 = 12;

/// Glyph height in pixels at a font scale of 1.
const GLYPH_HEIGHT: f32 = 22.0;
/// Glyph advance in pixels at a font scale of 1, used when no font is loaded.
const GLYPH_ADVANCE: f32 = 20.0;

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotationStyle {
    /// Magnification of the label text.
    pub font_scale: f32,
    /// Stroke width of label glyphs.
    pub text_thickness: u32,
    /// Stroke width of bounding boxes, growing inwards from the box edge.
    pub box_thickness: u32,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            font_scale: 1.3,
            text_thickness: 3,
            box_thickness: 2,
        }
    }
}

impl AnnotationStyle {
    pub fn validate(&self) -> Result<()> {
        if !(self.font_scale.is_finite() && self.font_scale > 0.0) {
            return Err(Error::InvalidOptions(format!(
                "font scale {} must be positive",
                self.font_scale
            )));
        }
        if self.box_thickness == 0 {
            return Err(Error::InvalidOptions("box thickness must be positive".into()));
        }
        Ok(())
    }
}

pub struct Annotator {
    style: AnnotationStyle,
    font: Option<FontVec>,
}

impl Annotator {
    /// An annotator without a font. Label panels are drawn, label text is not.
    pub fn new(style: AnnotationStyle) -> Self {
        Self { style, font: None }
    }

    pub fn with_font(style: AnnotationStyle, font: FontVec) -> Self {
        Self {
            style,
            font: Some(font),
        }
    }

    pub fn with_font_path(style: AnnotationStyle, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let font = FontVec::try_from_vec(data).map_err(|_| Error::Font {
            path: path.to_path_buf(),
        })?;
        Ok(Self::with_font(style, font))
    }

    /// Uses the first readable font from a few well-known system locations, or none.
    pub fn with_system_font(style: AnnotationStyle) -> Self {
        for path in SYSTEM_FONTS {
            if let Ok(annotator) = Self::with_font_path(style, path) {
                info!("Loaded system font: {}", path);
                return annotator;
            }
        }
        debug!("No system font found, label text will be skipped");
        Self::new(style)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draws the detections onto a copy of `image`, later detections over earlier ones.
    #[instrument(skip_all, fields(detections = detections.len()))]
    pub fn annotate(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut annotated = image.clone();
        for detection in detections {
            self.draw_detection(&mut annotated, detection);
        }
        annotated
    }

    fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
        let bounds = detection.quad.bounding_rect();
        let left = bounds.min().x.round() as i32;
        let top = bounds.min().y.round() as i32;
        let right = bounds.max().x.round() as i32;
        let bottom = bounds.max().y.round() as i32;

        draw_box(image, (left, top, right, bottom), self.style.box_thickness);

        let (text_width, text_height) = self.label_size(&detection.text);
        let panel = label_panel(left, top, text_width, text_height);
        draw_filled_rect_mut(image, panel, LABEL_BACKGROUND);

        let Some(font) = &self.font else { return };
        let x = left + (LABEL_PADDING_X / 2) as i32;
        let y = panel.top() + (LABEL_PADDING_Y / 2) as i32;
        let scale = self.px_scale();
        let text = detection.text.as_str();
        let thickness = self.style.text_thickness;
        draw_stroked_text(image, OUTLINE_COLOR, (x, y), thickness + 2, scale, font, text);
        draw_stroked_text(image, ACCENT_COLOR, (x, y), thickness, scale, font, text);
    }

    fn px_scale(&self) -> PxScale {
        PxScale::from(self.style.font_scale * GLYPH_HEIGHT)
    }

    /// Pixel size of a rendered label, stroke included.
    pub fn label_size(&self, text: &str) -> (u32, u32) {
        let stroke = stroke_radius(self.style.text_thickness) * 2;
        let (width, height) = match &self.font {
            Some(font) => text_size(self.px_scale(), font, text),
            None => {
                let advance = (GLYPH_ADVANCE * self.style.font_scale).round() as u32;
                let height = (GLYPH_HEIGHT * self.style.font_scale).round() as u32;
                (advance * text.chars().count() as u32, height)
            }
        };
        (width + stroke, height + stroke)
    }
}

/// Panel spanning the rows directly above `top`, anchored at `left`.
fn label_panel(left: i32, top: i32, text_width: u32, text_height: u32) -> Rect {
    let height = text_height + LABEL_PADDING_Y;
    Rect::at(left, top - height as i32).of_size(text_width + LABEL_PADDING_X, height)
}

/// Outline of the inclusive box `(left, top, right, bottom)` with strokes grown inwards, so
/// the outermost pixels sit exactly on the bounds.
fn draw_box(image: &mut RgbImage, bounds: (i32, i32, i32, i32), thickness: u32) {
    let (left, top, right, bottom) = bounds;
    for inset in 0..thickness as i32 {
        let (l, t, r, b) = (left + inset, top + inset, right - inset, bottom - inset);
        if l > r || t > b {
            break;
        }
        draw_edge(image, (l, t), (r, t));
        draw_edge(image, (l, b), (r, b));
        draw_edge(image, (l, t), (l, b));
        draw_edge(image, (r, t), (r, b));
    }
}

fn draw_edge(image: &mut RgbImage, start: (i32, i32), end: (i32, i32)) {
    if start != end {
        draw_antialiased_line_segment_mut(image, start, end, ACCENT_COLOR, interpolate);
        return;
    }
    let (x, y) = start;
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, ACCENT_COLOR);
    }
}

fn stroke_radius(thickness: u32) -> u32 {
    thickness / 2
}

/// Fakes a heavier weight by stamping the glyphs over a square of offsets.
fn draw_stroked_text(
    image: &mut RgbImage,
    color: Rgb<u8>,
    (x, y): (i32, i32),
    thickness: u32,
    scale: PxScale,
    font: &FontVec,
    text: &str,
) {
    let radius = stroke_radius(thickness) as i32;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            draw_text_mut(image, color, x + dx, y + dy, scale, font, text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_sits_above_the_box() {
        let panel = label_panel(10, 60, 100, 30);
        assert_eq!(panel.left(), 10);
        assert_eq!(panel.bottom(), 59);
        assert_eq!(panel.top(), 60 - 42);
        assert_eq!(panel.width(), 120);
    }

    #[test]
    fn fallback_metrics_scale_with_text() {
        let annotator = Annotator::new(AnnotationStyle::default());
        let (short, height) = annotator.label_size("ab");
        let (long, _) = annotator.label_size("abcd");
        assert_eq!(height, 29 + 2);
        assert_eq!(long - short, 2 * 26);
    }

    #[test]
    fn style_validation() {
        assert!(AnnotationStyle::default().validate().is_ok());
        let style = AnnotationStyle {
            box_thickness: 0,
            ..Default::default()
        };
        assert!(style.validate().is_err());
        let style = AnnotationStyle {
            font_scale: f32::NAN,
            ..Default::default()
        };
        assert!(style.validate().is_err());
    }
}
