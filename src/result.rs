use geo::{BoundingRect, Coord, Polygon, Rect};
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Four corner points of a recognized region in pixel coordinates. Not necessarily
/// axis-aligned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad(pub [Coord<f32>; 4]);

impl Quad {
    pub fn bounding_rect(&self) -> Rect<f32> {
        let [first, rest @ ..] = self.0;
        rest.iter().fold(Rect::new(first, first), |rect, point| {
            Rect::new(
                Coord {
                    x: rect.min().x.min(point.x),
                    y: rect.min().y.min(point.y),
                },
                Coord {
                    x: rect.max().x.max(point.x),
                    y: rect.max().y.max(point.y),
                },
            )
        })
    }

    /// Takes the first four exterior points of a polygon, falling back to its bounding box
    /// when the ring has a different number of corners.
    pub fn from_polygon(polygon: &Polygon<f32>) -> Option<Self> {
        let rect = polygon.bounding_rect()?;
        let coords = polygon.exterior().0.as_slice();
        match coords {
            [a, b, c, d] | [a, b, c, d, _] => Some(Quad([*a, *b, *c, *d])),
            _ => {
                log::trace!("Polygon with {} points reduced to its bounds.", coords.len());
                let (min, max) = (rect.min(), rect.max());
                Some(Quad([
                    min,
                    Coord { x: max.x, y: min.y },
                    max,
                    Coord { x: min.x, y: max.y },
                ]))
            }
        }
    }
}

impl From<[(f32, f32); 4]> for Quad {
    fn from(points: [(f32, f32); 4]) -> Self {
        Self(points.map(|(x, y)| Coord { x, y }))
    }
}

/// One recognized region, as produced by a [`Recognizer`](crate::Recognizer).
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub quad: Quad,
    pub text: String,
    /// In `[0.0, 1.0]`.
    pub confidence: f32,
}

impl Detection {
    pub fn new(quad: impl Into<Quad>, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            quad: quad.into(),
            text: text.into(),
            confidence,
        }
    }
}

/// Serialized form of a detection. Coordinates are left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRecord {
    pub text: String,
    pub confidence: f64,
}

/// Recognized texts, one per line, in recognition order.
pub fn to_text(detections: &[Detection]) -> String {
    detections
        .iter()
        .map(|it| it.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn to_records(detections: &[Detection]) -> Vec<TextRecord> {
    detections
        .iter()
        .map(|it| TextRecord {
            text: it.text.clone(),
            confidence: it.confidence as f64,
        })
        .collect()
}

/// Pretty-printed JSON array of [`TextRecord`]s.
pub fn to_json(detections: &[Detection]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&to_records(detections))
}

/// Everything one pass of the pipeline produces for the presentation layer.
#[derive(Debug, Clone)]
pub struct ReceiptScan {
    pub original: RgbImage,
    pub processed: RgbImage,
    pub annotated: RgbImage,
    pub detections: Vec<Detection>,
}

impl ReceiptScan {
    pub fn text(&self) -> String {
        to_text(&self.detections)
    }

    pub fn records(&self) -> Vec<TextRecord> {
        to_records(&self.detections)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        to_json(&self.detections)
    }
}
