use std::{path::PathBuf, time::Instant};

use image::DynamicImage;
use receipt_ocr::{normalize_dynamic, NormalizeOptions};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

fn main() {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args_os().skip(1);
    let input = PathBuf::from(args.next().expect("Usage: receipt-ocr <image> [output]"));
    let output = args.next().map(PathBuf::from).unwrap_or_else(|| {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        input.with_file_name(format!("{stem}_preprocessed.png"))
    });

    // Alpha carries nothing for a photographed receipt.
    let image = image::open(&input).expect("Failed to load input image");
    let image = DynamicImage::ImageRgb8(image.into_rgb8());
    let start = Instant::now();
    let (_, processed) =
        normalize_dynamic(&image, &NormalizeOptions::default()).expect("Failed to normalize image");
    log::debug!("{:?}", start.elapsed());
    processed.save(&output).expect("Failed to save processed image");
    println!(
        "{} -> {} ({}x{})",
        input.display(),
        output.display(),
        processed.width(),
        processed.height()
    );
}
