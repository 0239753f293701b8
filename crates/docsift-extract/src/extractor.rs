//! Extractor contract and the format → strategy table.

use std::collections::HashMap;
use std::sync::Arc;

use docsift_core::{DocumentFormat, ExtractionMethod, ExtractionResult, PipelineConfig, RawDocument, Result};
use tracing::info;

use crate::docx::WordExtractor;
use crate::ocr::create_ocr_engine;
use crate::pdf::PdfExtractor;
use crate::raster::ImageOcrExtractor;
use crate::spreadsheet::{CsvExtractor, SpreadsheetExtractor};
use crate::structured::{JsonExtractor, XmlExtractor};
use crate::text::PlainTextExtractor;

/// One extraction strategy.
///
/// Implementations fail with [`docsift_core::Error::ExtractionFailed`] when the
/// payload is corrupted, unsupported or empty; they never fabricate a result.
pub trait ContentExtractor: Send + Sync {
    fn name(&self) -> &str;

    fn method(&self) -> ExtractionMethod;

    fn extract(&self, document: &RawDocument) -> Result<ExtractionResult>;
}

/// Strategy table keyed by detected format, plus the plain-text fallback.
#[derive(Clone)]
pub struct ExtractorRegistry {
    strategies: HashMap<DocumentFormat, Arc<dyn ContentExtractor>>,
    fallback: Arc<dyn ContentExtractor>,
}

impl ExtractorRegistry {
    /// An empty table that routes everything to `fallback`.
    pub fn new(fallback: Arc<dyn ContentExtractor>) -> Self {
        Self {
            strategies: HashMap::new(),
            fallback,
        }
    }

    /// All builtin strategies. OCR uses Tesseract when it can be found.
    pub fn with_defaults(config: &PipelineConfig) -> Self {
        let mut registry = Self::new(Arc::new(PlainTextExtractor));
        registry.register(DocumentFormat::Pdf, Arc::new(PdfExtractor));
        let ocr = create_ocr_engine(&config.ocr, config.extraction_timeout);
        registry.register(DocumentFormat::Image, Arc::new(ImageOcrExtractor::new(ocr)));
        registry.register(DocumentFormat::Word, Arc::new(WordExtractor));
        registry.register(DocumentFormat::Spreadsheet, Arc::new(SpreadsheetExtractor));
        registry.register(DocumentFormat::Csv, Arc::new(CsvExtractor));
        registry.register(DocumentFormat::PlainText, Arc::new(PlainTextExtractor));
        registry.register(DocumentFormat::Json, Arc::new(JsonExtractor));
        registry.register(DocumentFormat::Xml, Arc::new(XmlExtractor));
        info!(
            "Extractor registry ready: {} strategies",
            registry.strategies.len()
        );
        registry
    }

    /// Install or replace the strategy for one format, returning the previous one.
    pub fn register(
        &mut self,
        format: DocumentFormat,
        extractor: Arc<dyn ContentExtractor>,
    ) -> Option<Arc<dyn ContentExtractor>> {
        self.strategies.insert(format, extractor)
    }

    pub fn set_fallback(&mut self, extractor: Arc<dyn ContentExtractor>) {
        self.fallback = extractor;
    }

    pub fn get(&self, format: DocumentFormat) -> Option<Arc<dyn ContentExtractor>> {
        self.strategies.get(&format).cloned()
    }

    /// The strategy for `format`, or the fallback when none is registered.
    pub fn resolve(&self, format: DocumentFormat) -> Arc<dyn ContentExtractor> {
        self.get(format).unwrap_or_else(|| self.fallback.clone())
    }

    pub fn fallback(&self) -> Arc<dyn ContentExtractor> {
        self.fallback.clone()
    }

    /// Registered formats in a stable order.
    pub fn formats(&self) -> Vec<DocumentFormat> {
        let mut formats: Vec<DocumentFormat> = self.strategies.keys().copied().collect();
        formats.sort();
        formats
    }
}
