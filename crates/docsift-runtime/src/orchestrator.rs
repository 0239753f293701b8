//! Orchestrator — runs one document through extraction, analysis,
//! classification, entity extraction and summarization.
//!
//! Only extraction can fail a document. Every later stage is guarded and
//! falls back to a safe default, recording what went wrong in `stage_errors`.

use std::sync::Arc;
use std::time::Instant;

use docsift_analyze::Ruleset;
use docsift_core::{
    AnalysisSignals, Catalog, ClassificationResult, EntityBundle, ExtractionResult,
    ExtractionSummary, PipelineConfig, PipelineResult, PipelineStage, PipelineState, RawDocument,
    Result, StageError, StageErrorKind, StageRecord, SummaryResult,
};
use docsift_extract::{DetectedFormat, ExtractorRegistry};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::handle::RulesetHandle;
use crate::stage::{guard, run_extractor, ExtractionError};

/// Hex SHA-256 of the raw upload.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub struct Orchestrator {
    config: PipelineConfig,
    rules: RulesetHandle,
    registry: ExtractorRegistry,
}

impl Orchestrator {
    /// Load the catalog, compile it and build the default extractors.
    /// A missing or invalid catalog is fatal.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let ruleset = Ruleset::compile(config.load_catalog()?)?;
        let registry = ExtractorRegistry::with_defaults(&config);
        Ok(Self::with_parts(config, ruleset, registry))
    }

    /// Assemble from prebuilt parts (custom extractors or matchers).
    pub fn with_parts(
        config: PipelineConfig,
        ruleset: Ruleset,
        registry: ExtractorRegistry,
    ) -> Self {
        info!(
            "Orchestrator initialized: catalog v{}, timeout={:?}, max_document_bytes={}",
            ruleset.version(),
            config.extraction_timeout,
            config.max_document_bytes
        );
        Self {
            config,
            rules: RulesetHandle::new(ruleset),
            registry,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Snapshot of the active rules.
    pub fn ruleset(&self) -> Arc<Ruleset> {
        self.rules.current()
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    /// Compile `catalog` and swap it in. In-flight documents finish on the
    /// rules they started with; on error the active rules are untouched.
    pub fn reload_catalog(&self, catalog: Catalog) -> Result<()> {
        let ruleset = Ruleset::compile(catalog)?;
        self.rules.swap(ruleset);
        Ok(())
    }

    pub fn process(&self, bytes: Vec<u8>, filename: &str) -> PipelineResult {
        self.process_document(RawDocument::new(bytes, filename))
    }

    /// Run the full pipeline. Never returns an error and never panics:
    /// failures are reported in the result.
    pub fn process_document(&self, document: RawDocument) -> PipelineResult {
        let hash = content_hash(&document.bytes);
        self.run(document, hash)
    }

    /// Process independent documents concurrently on blocking workers.
    /// Results come back in input order.
    pub async fn process_batch(
        self: &Arc<Self>,
        documents: Vec<RawDocument>,
    ) -> Vec<PipelineResult> {
        let handles: Vec<_> = documents
            .into_iter()
            .map(|document| {
                let filename = document.filename.clone();
                let hash = content_hash(&document.bytes);
                let this = Arc::clone(self);
                let task_hash = hash.clone();
                let handle = tokio::task::spawn_blocking(move || this.run(document, task_hash));
                (filename, hash, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (filename, hash, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!("Pipeline worker for {} failed: {}", filename, e);
                    let mut result =
                        PipelineResult::received(filename, hash, self.rules.current().version());
                    result.state = PipelineState::Failed {
                        stage: PipelineStage::Received,
                    };
                    result.error = Some(format!("worker failed: {}", e));
                    results.push(result);
                }
            }
        }
        results
    }

    fn run(&self, document: RawDocument, hash: String) -> PipelineResult {
        let started = Instant::now();
        let rules = self.rules.current();
        let mut run = Run::new(PipelineResult::received(
            document.filename.clone(),
            hash,
            rules.version(),
        ));

        let text = match self.extract(document, &mut run) {
            Some(text) => text,
            None => return run.finish(started),
        };

        run.enter(PipelineStage::Analyzing);
        let signals = match guard(|| Ok(rules.analyzer().analyze(&text))) {
            Ok(signals) => {
                run.record(true);
                signals
            }
            Err(msg) => {
                run.recover(StageErrorKind::AnalysisFailed, msg);
                AnalysisSignals::default()
            }
        };

        // Only the text and its signals; the filename never reaches the classifier.
        run.enter(PipelineStage::Classifying);
        let classification = match guard(|| Ok(rules.classifier().classify(&text, &signals))) {
            Ok(classification) => {
                run.record(true);
                classification
            }
            Err(msg) => {
                run.recover(StageErrorKind::ClassificationFailed, msg);
                ClassificationResult::unavailable()
            }
        };

        run.enter(PipelineStage::ExtractingEntities);
        let entities = match guard(|| Ok(rules.entities().extract(&text))) {
            Ok(bundle) if bundle.partial().is_empty() => {
                run.record(true);
                bundle
            }
            Ok(bundle) => {
                let skipped: Vec<&str> = bundle.partial().iter().map(|c| c.as_str()).collect();
                run.recover(
                    StageErrorKind::EntityExtractionPartial,
                    format!("matchers skipped: {}", skipped.join(", ")),
                );
                bundle
            }
            Err(msg) => {
                run.recover(StageErrorKind::EntityExtractionFailed, msg);
                EntityBundle::empty()
            }
        };

        run.enter(PipelineStage::Summarizing);
        let document_type = classification.document_type;
        let summarized = guard(|| {
            Ok(rules
                .summarizer()
                .summarize(&text, document_type, &entities))
        });
        let summary = match summarized {
            Ok(summary) => {
                run.record(true);
                summary
            }
            Err(msg) => {
                run.recover(StageErrorKind::SummarizationFailed, msg);
                SummaryResult::empty()
            }
        };

        let result = &mut run.result;
        result.analysis = signals;
        result.document_type = classification.document_type;
        result.confidence = classification.confidence;
        result.classification = classification;
        result.entity_count = entities.entity_count();
        result.entities = entities.into_entities();
        result.summary = summary.summary;
        result.summary_type = summary.summary_type;
        result.success = true;
        result.state = PipelineState::Completed;

        let result = run.finish(started);
        info!(
            "Processed {}: {} ({:.2}), {} entities, {}ms",
            result.filename,
            result.document_type,
            result.confidence,
            result.entity_count,
            result.processing_time_ms
        );
        result
    }

    /// Extraction stage. Returns the text on success; on failure the run is
    /// already marked failed.
    fn extract(&self, document: RawDocument, run: &mut Run) -> Option<String> {
        run.enter(PipelineStage::Extracting);

        if document.bytes.is_empty() {
            run.fail(StageErrorKind::ExtractionFailed, "empty payload".into());
            return None;
        }
        if document.bytes.len() > self.config.max_document_bytes {
            run.fail(
                StageErrorKind::ExtractionFailed,
                format!(
                    "document is {} bytes, limit is {}",
                    document.bytes.len(),
                    self.config.max_document_bytes
                ),
            );
            return None;
        }

        let detected = DetectedFormat::of(&document);
        run.result.format = Some(detected.format);
        let primary = self.registry.resolve(detected.format);
        let fallback = self.registry.fallback();
        let document = Arc::new(document);
        let timeout = self.config.extraction_timeout;

        let mut fallback_used = false;
        let extraction: ExtractionResult =
            match run_extractor(primary.clone(), document.clone(), timeout) {
                Ok(extraction) => extraction,
                Err(ExtractionError::Timeout) => {
                    run.fail(StageErrorKind::ExtractionTimeout, "timeout".into());
                    return None;
                }
                Err(ExtractionError::Failed(reason)) if primary.name() == fallback.name() => {
                    run.fail(StageErrorKind::ExtractionFailed, reason);
                    return None;
                }
                Err(ExtractionError::Failed(reason)) => {
                    warn!(
                        "{} extractor failed for {}: {}; retrying as plain text",
                        primary.name(),
                        run.result.filename,
                        reason
                    );
                    run.note(
                        StageErrorKind::ExtractionFallback,
                        format!("{} extractor failed: {}", primary.name(), reason),
                    );
                    match run_extractor(fallback, document, timeout) {
                        Ok(extraction) => {
                            fallback_used = true;
                            extraction
                        }
                        Err(ExtractionError::Timeout) => {
                            run.fail(StageErrorKind::ExtractionTimeout, "timeout".into());
                            return None;
                        }
                        Err(ExtractionError::Failed(fallback_reason)) => {
                            run.fail(
                                StageErrorKind::ExtractionFailed,
                                format!("{}; plain text fallback: {}", reason, fallback_reason),
                            );
                            return None;
                        }
                    }
                }
            };

        run.record(true);
        let result = &mut run.result;
        result.word_count = extraction.word_count;
        result.extraction = Some(ExtractionSummary {
            method: extraction.method,
            confidence: extraction.extraction_confidence,
            word_count: extraction.word_count,
            fallback_used,
            low_confidence_format: detected.low_confidence,
            metadata: extraction.metadata,
        });
        result.structured_data = extraction.structured_data;
        Some(extraction.text)
    }
}

/// Mutable state of one invocation.
struct Run {
    result: PipelineResult,
    stage: PipelineStage,
    errors: Vec<StageError>,
}

impl Run {
    fn new(result: PipelineResult) -> Self {
        Self {
            result,
            stage: PipelineStage::Received,
            errors: Vec::new(),
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        debug!("{}: entering {}", self.result.filename, stage);
        self.stage = stage;
        self.result.state = PipelineState::Running { stage };
    }

    fn record(&mut self, success: bool) {
        self.result.stages.push(StageRecord {
            stage: self.stage,
            success,
        });
    }

    fn note(&mut self, kind: StageErrorKind, message: String) {
        self.errors.push(StageError {
            stage: self.stage,
            kind,
            message,
        });
    }

    /// Stage failed but the pipeline carries on with a default.
    fn recover(&mut self, kind: StageErrorKind, message: String) {
        warn!(
            "{}: {} recovered with default: {}",
            self.result.filename, self.stage, message
        );
        self.record(false);
        self.note(kind, message);
    }

    /// Stage failed and the pipeline stops here.
    fn fail(&mut self, kind: StageErrorKind, message: String) {
        error!(
            "{}: failed during {}: {}",
            self.result.filename, self.stage, message
        );
        self.record(false);
        self.note(kind, message.clone());
        self.result.success = false;
        self.result.error = Some(message);
        self.result.state = PipelineState::Failed { stage: self.stage };
    }

    fn finish(mut self, started: Instant) -> PipelineResult {
        self.result.processing_time_ms = started.elapsed().as_millis() as u64;
        if !self.errors.is_empty() {
            self.result.stage_errors = Some(self.errors);
        }
        self.result
    }
}
