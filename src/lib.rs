use std::path::PathBuf;

use image::{DynamicImage, RgbImage};
use tracing::instrument;

pub mod annotate;
pub mod clahe;
pub mod deskew;
mod error;
pub mod normalize;
mod result;
pub mod util;

pub use annotate::{AnnotationStyle, Annotator};
pub use error::*;
pub use normalize::{normalize, normalize_dynamic, NormalizeOptions};
pub use result::*;

pub use image;

/// Text recognition capability the pipeline delegates to.
///
/// Recognizers are expensive to set up, so one instance is built up front and reused for
/// every image. [`ReceiptOcr`] is `Sync` exactly when its recognizer is, so only
/// recognizers that tolerate concurrent `recognize` calls should be shared across threads.
pub trait Recognizer {
    /// Returns detections in recognition order. Errors are handed to the caller untouched.
    fn recognize(&self, image: &RgbImage) -> Result<Vec<Detection>, BoxError>;
}

impl<F> Recognizer for F
where
    F: Fn(&RgbImage) -> Result<Vec<Detection>, BoxError>,
{
    fn recognize(&self, image: &RgbImage) -> Result<Vec<Detection>, BoxError> {
        self(image)
    }
}

pub struct ReceiptOcrBuilder {
    normalize: NormalizeOptions,
    style: AnnotationStyle,
    font_path: Option<PathBuf>,
    system_font: bool,
}

impl ReceiptOcrBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize_options(mut self, options: NormalizeOptions) -> Self {
        self.normalize = options;
        self
    }

    pub fn target_width(mut self, width: u32) -> Self {
        self.normalize.target_width = width;
        self
    }

    pub fn annotation_style(mut self, style: AnnotationStyle) -> Self {
        self.style = style;
        self
    }

    /// Font used for label text. Takes precedence over [`Self::system_font`].
    pub fn font(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_path = Some(path.into());
        self
    }

    /// Look for a label font in common system locations when no font path is given.
    pub fn system_font(mut self, enabled: bool) -> Self {
        self.system_font = enabled;
        self
    }

    #[instrument(skip(self, recognizer))]
    pub fn build<R: Recognizer>(self, recognizer: R) -> Result<ReceiptOcr<R>> {
        self.normalize.validate()?;
        self.style.validate()?;
        let annotator = match &self.font_path {
            Some(path) => Annotator::with_font_path(self.style, path)?,
            None if self.system_font => Annotator::with_system_font(self.style),
            None => Annotator::new(self.style),
        };
        Ok(ReceiptOcr {
            recognizer,
            annotator,
            options: self.normalize,
        })
    }
}

impl Default for ReceiptOcrBuilder {
    fn default() -> Self {
        Self {
            normalize: NormalizeOptions::default(),
            style: AnnotationStyle::default(),
            font_path: None,
            system_font: true,
        }
    }
}

pub struct ReceiptOcr<R> {
    recognizer: R,
    annotator: Annotator,
    options: NormalizeOptions,
}

impl<R: Recognizer> ReceiptOcr<R> {
    /// Normalizes the photo, recognizes text on the normalized image and annotates it.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn process(&self, image: &DynamicImage) -> Result<ReceiptScan> {
        let (original, processed) = normalize_dynamic(image, &self.options)?;
        let detections = self
            .recognizer
            .recognize(&processed)
            .map_err(Error::Recognizer)?;
        log::debug!("Recognized {} regions.", detections.len());
        let annotated = self.annotator.annotate(&processed, &detections);
        Ok(ReceiptScan {
            original,
            processed,
            annotated,
            detections,
        })
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }
}
