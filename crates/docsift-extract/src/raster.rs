//! Image documents: grayscale, contrast stretch and median denoise, then OCR.

use std::io::Cursor;
use std::sync::Arc;

use docsift_core::{Error, ExtractionMethod, ExtractionResult, RawDocument, Result};
use image::{GrayImage, ImageFormat, Luma};
use tracing::debug;

use crate::extractor::ContentExtractor;
use crate::ocr::OcrEngine;

/// Percentiles clipped before stretching to the full range.
const LOW_PERCENTILE: f64 = 0.01;
const HIGH_PERCENTILE: f64 = 0.99;

pub struct ImageOcrExtractor {
    engine: Arc<dyn OcrEngine>,
}

impl ImageOcrExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }
}

impl ContentExtractor for ImageOcrExtractor {
    fn name(&self) -> &str {
        "image_ocr"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Ocr
    }

    fn extract(&self, document: &RawDocument) -> Result<ExtractionResult> {
        if document.bytes.is_empty() {
            return Err(Error::extraction("empty payload"));
        }
        let prepared = preprocess(&document.bytes)?;
        let png = encode_png(&prepared)?;
        let output = self.engine.recognize(&png)?;

        let text = output.text.trim().to_string();
        let confidence = match output.mean_confidence() {
            Some(c) if !text.is_empty() => c,
            _ => return Err(Error::extraction("OCR produced no text")),
        };
        debug!(
            "OCR {} via {}: {} words, mean confidence {:.2}",
            document.filename,
            self.engine.name(),
            output.words.len(),
            confidence
        );

        Ok(ExtractionResult::new(text, ExtractionMethod::Ocr, confidence)
            .with_metadata("ocr_engine", self.engine.name())
            .with_metadata("ocr_words", output.words.len())
            .with_metadata("image_size", format!("{}x{}", prepared.width(), prepared.height())))
    }
}

/// Decode, convert to grayscale, normalize contrast and denoise.
pub fn preprocess(bytes: &[u8]) -> Result<GrayImage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| Error::extraction(format!("unreadable image: {}", e)))?;
    let mut gray = decoded.to_luma8();
    stretch_contrast(&mut gray);
    Ok(median_filter(&gray))
}

fn encode_png(image: &GrayImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| Error::extraction(format!("image encoding failed: {}", e)))?;
    Ok(buffer.into_inner())
}

/// Linear stretch between the low and high intensity percentiles.
fn stretch_contrast(image: &mut GrayImage) {
    let total = (image.width() as u64) * (image.height() as u64);
    if total == 0 {
        return;
    }
    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let percentile = |fraction: f64| -> u8 {
        let target = (fraction * total as f64).ceil().max(1.0) as u64;
        let mut seen = 0;
        for (value, count) in histogram.iter().enumerate() {
            seen += count;
            if seen >= target {
                return value as u8;
            }
        }
        255
    };
    let low = percentile(LOW_PERCENTILE) as f64;
    let high = percentile(HIGH_PERCENTILE) as f64;
    if high <= low {
        return;
    }

    for pixel in image.pixels_mut() {
        let scaled = (pixel[0] as f64 - low) * 255.0 / (high - low);
        pixel[0] = scaled.round().clamp(0.0, 255.0) as u8;
    }
}

/// 3×3 median filter with edge clamping.
fn median_filter(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let mut window = [0u8; 9];
        let mut i = 0;
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let nx = (x as i64 + dx).clamp(0, width as i64 - 1) as u32;
                let ny = (y as i64 + dy).clamp(0, height as i64 - 1) as u32;
                window[i] = image.get_pixel(nx, ny)[0];
                i += 1;
            }
        }
        window.sort_unstable();
        Luma([window[4]])
    })
}
