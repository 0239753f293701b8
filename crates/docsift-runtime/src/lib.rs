//! Runtime — the pipeline orchestrator.
//!
//! Runs one document through extraction, analysis, classification, entity
//! extraction and summarization, and always hands back a `PipelineResult`.

pub mod handle;
pub mod orchestrator;
pub mod stage;

pub use handle::RulesetHandle;
pub use orchestrator::{content_hash, Orchestrator};
pub use stage::{guard, run_extractor, ExtractionError};
