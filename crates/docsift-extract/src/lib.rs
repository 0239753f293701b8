//! DocSift Extract — format detection and per-format content extraction.
//!
//! Every extractor implements [`ContentExtractor`]; the [`ExtractorRegistry`]
//! maps each detected [`DocumentFormat`](docsift_core::DocumentFormat) to one.

pub mod detect;
pub mod docx;
pub mod extractor;
pub mod ocr;
pub mod pdf;
pub mod raster;
pub mod spreadsheet;
pub mod structured;
pub mod tabular;
pub mod text;

pub use detect::{detect_format, DetectedFormat, DetectionSource};
pub use docx::WordExtractor;
pub use extractor::{ContentExtractor, ExtractorRegistry};
pub use ocr::{
    create_ocr_engine, run_with_deadline, OcrEngine, OcrOutput, OcrWord, TesseractCli,
    UnavailableOcr,
};
pub use pdf::PdfExtractor;
pub use raster::ImageOcrExtractor;
pub use spreadsheet::{CsvExtractor, SpreadsheetExtractor};
pub use structured::{JsonExtractor, XmlExtractor};
pub use text::{decode_text, DecodedText, PlainTextExtractor};
