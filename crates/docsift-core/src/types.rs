//! Data model shared by every pipeline stage.
//!
//! Everything that ends up in a [`PipelineResult`] uses ordered collections
//! (`BTreeMap`, `BTreeSet`, `Vec`) so that serializing the same result twice
//! yields identical bytes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// An uploaded document as handed to the pipeline.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: Option<String>,
}

impl RawDocument {
    pub fn new(bytes: impl Into<Vec<u8>>, filename: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Lowercased extension of the declared filename, if any.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }
}

/// Format families the pipeline knows how to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Image,
    Word,
    Spreadsheet,
    Csv,
    PlainText,
    Json,
    Xml,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 8] = [
        DocumentFormat::Pdf,
        DocumentFormat::Image,
        DocumentFormat::Word,
        DocumentFormat::Spreadsheet,
        DocumentFormat::Csv,
        DocumentFormat::PlainText,
        DocumentFormat::Json,
        DocumentFormat::Xml,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Image => "image",
            DocumentFormat::Word => "word",
            DocumentFormat::Spreadsheet => "spreadsheet",
            DocumentFormat::Csv => "csv",
            DocumentFormat::PlainText => "plain_text",
            DocumentFormat::Json => "json",
            DocumentFormat::Xml => "xml",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    PdfLayout,
    Ocr,
    Docx,
    Spreadsheet,
    PlainText,
    Structured,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::PdfLayout => "pdf_layout",
            ExtractionMethod::Ocr => "ocr",
            ExtractionMethod::Docx => "docx",
            ExtractionMethod::Spreadsheet => "spreadsheet",
            ExtractionMethod::PlainText => "plain_text",
            ExtractionMethod::Structured => "structured",
        }
    }
}

/// Count of whitespace-delimited tokens.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Output of a successful extractor run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub text: String,
    pub word_count: usize,
    pub method: ExtractionMethod,
    pub extraction_confidence: f64,
    pub structured_data: Option<StructuredData>,
    /// Extractor-specific facts (page counts, detected encoding, OCR engine).
    pub metadata: BTreeMap<String, String>,
}

impl ExtractionResult {
    /// Build a result; `word_count` is always derived from `text`.
    pub fn new(text: String, method: ExtractionMethod, confidence: f64) -> Self {
        let word_count = count_words(&text);
        Self {
            text,
            word_count,
            method,
            extraction_confidence: clamp_unit(confidence),
            structured_data: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_structured_data(mut self, data: StructuredData) -> Self {
        self.structured_data = Some(data);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Summary statistics for a column whose every non-empty cell is numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetrics {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// One header row plus keyed data rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub row_count: usize,
    pub column_metrics: BTreeMap<String, ColumnMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchicalFormat {
    Json,
    Xml,
}

/// Tabular or key-value data carried next to the flattened text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuredData {
    Table(TableData),
    Workbook {
        sheets: Vec<TableData>,
        total_rows: usize,
    },
    Hierarchical {
        format: HierarchicalFormat,
        root: Value,
        field_count: usize,
    },
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Structural, statistical and vocabulary signals derived from extracted text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSignals {
    pub has_headers: bool,
    pub has_lists: bool,
    pub has_tables: bool,
    pub word_count: usize,
    pub sentence_count: usize,
    pub avg_sentence_length: f64,
    pub avg_word_length: f64,
    pub readability_score: f64,
    pub detected_vocabularies: BTreeSet<String>,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Fixed catalog of classification outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    MedicalReport,
    LabResult,
    Prescription,
    ClinicalTrial,
    Insurance,
    Billing,
    Administrative,
    ConsentForm,
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::MedicalReport => "medical_report",
            DocumentType::LabResult => "lab_result",
            DocumentType::Prescription => "prescription",
            DocumentType::ClinicalTrial => "clinical_trial",
            DocumentType::Insurance => "insurance",
            DocumentType::Billing => "billing",
            DocumentType::Administrative => "administrative",
            DocumentType::ConsentForm => "consent_form",
            DocumentType::Other => "other",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub document_type: DocumentType,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub document_type: DocumentType,
    pub confidence: f64,
    pub reasoning: Vec<String>,
    pub alternatives: Vec<Alternative>,
    /// Set when no type cleared the minimum confidence.
    pub degraded: bool,
}

impl ClassificationResult {
    /// Safe default used when the classifier itself fails.
    pub fn unavailable() -> Self {
        Self {
            document_type: DocumentType::Other,
            confidence: 0.0,
            reasoning: vec!["classification unavailable".to_string()],
            alternatives: Vec::new(),
            degraded: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Dates,
    Names,
    Organizations,
    DomainTerms,
    Amounts,
    Emails,
    Phones,
    Identifiers,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 8] = [
        EntityCategory::Dates,
        EntityCategory::Names,
        EntityCategory::Organizations,
        EntityCategory::DomainTerms,
        EntityCategory::Amounts,
        EntityCategory::Emails,
        EntityCategory::Phones,
        EntityCategory::Identifiers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityCategory::Dates => "dates",
            EntityCategory::Names => "names",
            EntityCategory::Organizations => "organizations",
            EntityCategory::DomainTerms => "domain_terms",
            EntityCategory::Amounts => "amounts",
            EntityCategory::Emails => "emails",
            EntityCategory::Phones => "phones",
            EntityCategory::Identifiers => "identifiers",
        }
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category → ordered matches. Every category is always present and
/// `entity_count` always equals the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityBundle {
    entities: BTreeMap<EntityCategory, Vec<String>>,
    entity_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    partial: Vec<EntityCategory>,
}

impl Default for EntityBundle {
    fn default() -> Self {
        Self::empty()
    }
}

impl EntityBundle {
    pub fn empty() -> Self {
        Self {
            entities: EntityCategory::ALL.iter().map(|c| (*c, Vec::new())).collect(),
            entity_count: 0,
            partial: Vec::new(),
        }
    }

    /// Replace the matches of one category.
    pub fn set(&mut self, category: EntityCategory, values: Vec<String>) {
        self.entities.insert(category, values);
        self.entity_count = self.entities.values().map(Vec::len).sum();
    }

    /// Record a category whose matcher failed; its list stays empty.
    pub fn mark_partial(&mut self, category: EntityCategory) {
        self.set(category, Vec::new());
        if !self.partial.contains(&category) {
            self.partial.push(category);
        }
    }

    pub fn get(&self, category: EntityCategory) -> &[String] {
        self.entities
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn entities(&self) -> &BTreeMap<EntityCategory, Vec<String>> {
        &self.entities
    }

    pub fn entity_count(&self) -> usize {
        self.entity_count
    }

    pub fn partial(&self) -> &[EntityCategory] {
        &self.partial
    }

    pub fn into_entities(self) -> BTreeMap<EntityCategory, Vec<String>> {
        self.entities
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryType {
    Template,
    Extractive,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub summary: String,
    pub summary_type: SummaryType,
    pub word_count: usize,
}

impl SummaryResult {
    pub fn new(summary: String, summary_type: SummaryType) -> Self {
        let word_count = count_words(&summary);
        Self {
            summary,
            summary_type,
            word_count,
        }
    }

    pub fn empty() -> Self {
        Self::new(String::new(), SummaryType::None)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    Extracting,
    Analyzing,
    Classifying,
    ExtractingEntities,
    Summarizing,
    Completed,
}

impl PipelineStage {
    /// The stage that follows this one, `None` once completed.
    pub fn next(&self) -> Option<PipelineStage> {
        match self {
            PipelineStage::Received => Some(PipelineStage::Extracting),
            PipelineStage::Extracting => Some(PipelineStage::Analyzing),
            PipelineStage::Analyzing => Some(PipelineStage::Classifying),
            PipelineStage::Classifying => Some(PipelineStage::ExtractingEntities),
            PipelineStage::ExtractingEntities => Some(PipelineStage::Summarizing),
            PipelineStage::Summarizing => Some(PipelineStage::Completed),
            PipelineStage::Completed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Received => "received",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Analyzing => "analyzing",
            PipelineStage::Classifying => "classifying",
            PipelineStage::ExtractingEntities => "extracting_entities",
            PipelineStage::Summarizing => "summarizing",
            PipelineStage::Completed => "completed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal or in-flight state of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineState {
    Running { stage: PipelineStage },
    Completed,
    Failed { stage: PipelineStage },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    ExtractionFailed,
    ExtractionFallback,
    ExtractionTimeout,
    AnalysisFailed,
    ClassificationFailed,
    EntityExtractionPartial,
    EntityExtractionFailed,
    SummarizationFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageError {
    pub stage: PipelineStage,
    pub kind: StageErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: PipelineStage,
    pub success: bool,
}

/// Extraction facts surfaced in the final result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub method: ExtractionMethod,
    pub confidence: f64,
    pub word_count: usize,
    pub fallback_used: bool,
    pub low_confidence_format: bool,
    pub metadata: BTreeMap<String, String>,
}

/// Everything one invocation produced, handed immutably to collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub success: bool,
    pub filename: String,
    pub content_hash: String,
    pub format: Option<DocumentFormat>,
    pub document_type: DocumentType,
    pub confidence: f64,
    pub classification: ClassificationResult,
    pub entities: BTreeMap<EntityCategory, Vec<String>>,
    pub entity_count: usize,
    pub summary: String,
    pub summary_type: SummaryType,
    pub structured_data: Option<StructuredData>,
    pub extraction: Option<ExtractionSummary>,
    pub analysis: AnalysisSignals,
    pub word_count: usize,
    pub processing_time_ms: u64,
    pub state: PipelineState,
    pub stages: Vec<StageRecord>,
    pub stage_errors: Option<Vec<StageError>>,
    pub error: Option<String>,
    pub catalog_version: String,
}

impl PipelineResult {
    /// A result for a document that has been received and not yet processed:
    /// every field holds its safe default.
    pub fn received(
        filename: impl Into<String>,
        content_hash: impl Into<String>,
        catalog_version: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            filename: filename.into(),
            content_hash: content_hash.into(),
            format: None,
            document_type: DocumentType::Other,
            confidence: 0.0,
            classification: ClassificationResult::unavailable(),
            entities: EntityBundle::empty().into_entities(),
            entity_count: 0,
            summary: String::new(),
            summary_type: SummaryType::None,
            structured_data: None,
            extraction: None,
            analysis: AnalysisSignals::default(),
            word_count: 0,
            processing_time_ms: 0,
            state: PipelineState::Running {
                stage: PipelineStage::Received,
            },
            stages: Vec::new(),
            stage_errors: None,
            error: None,
            catalog_version: catalog_version.into(),
        }
    }
}

/// Clamp to [0, 1], mapping NaN to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_word_count_tracks_text() {
        let result = ExtractionResult::new(
            "  one two\tthree\nfour  ".to_string(),
            ExtractionMethod::PlainText,
            0.9,
        );
        assert_eq!(result.word_count, 4);
    }

    #[test]
    fn test_extraction_confidence_clamped() {
        let high = ExtractionResult::new("a".into(), ExtractionMethod::Ocr, 1.7);
        let nan = ExtractionResult::new("a".into(), ExtractionMethod::Ocr, f64::NAN);
        assert_eq!(high.extraction_confidence, 1.0);
        assert_eq!(nan.extraction_confidence, 0.0);
    }

    #[test]
    fn test_entity_bundle_has_every_category() {
        let bundle = EntityBundle::empty();
        assert_eq!(bundle.entities().len(), EntityCategory::ALL.len());
        assert_eq!(bundle.entity_count(), 0);
    }

    #[test]
    fn test_entity_bundle_count_invariant() {
        let mut bundle = EntityBundle::empty();
        bundle.set(EntityCategory::Names, vec!["John Doe".into(), "Dr. Chen".into()]);
        bundle.set(EntityCategory::Emails, vec!["a@b.org".into()]);
        assert_eq!(bundle.entity_count(), 3);
        bundle.mark_partial(EntityCategory::Names);
        assert_eq!(bundle.entity_count(), 1);
        assert_eq!(bundle.partial(), &[EntityCategory::Names]);
    }

    #[test]
    fn test_entity_bundle_json_keys() {
        let mut bundle = EntityBundle::empty();
        bundle.set(EntityCategory::DomainTerms, vec!["hypertension".into()]);
        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["entities"]["domain_terms"][0], "hypertension");
        assert!(json["entities"]["phones"].as_array().unwrap().is_empty());
        assert_eq!(json["entity_count"], 1);
    }

    #[test]
    fn test_structured_data_tagging() {
        let table = StructuredData::Table(TableData {
            sheet: None,
            headers: vec!["Month".into()],
            rows: Vec::new(),
            row_count: 0,
            column_metrics: BTreeMap::new(),
        });
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["kind"], "table");
        assert_eq!(json["headers"][0], "Month");
        assert!(json.get("sheet").is_none());
    }

    #[test]
    fn test_stage_sequence() {
        let mut stage = PipelineStage::Received;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(seen.len(), 7);
        assert_eq!(seen.last(), Some(&PipelineStage::Completed));
    }

    #[test]
    fn test_pipeline_state_json() {
        let state = PipelineState::Failed {
            stage: PipelineStage::Extracting,
        };
        let json = serde_json::to_value(state).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["stage"], "extracting");
    }

    #[test]
    fn test_raw_document_extension() {
        let doc = RawDocument::new(Vec::new(), "Report.PDF");
        assert_eq!(doc.extension().as_deref(), Some("pdf"));
        assert_eq!(RawDocument::new(Vec::new(), "README").extension(), None);
    }
}
