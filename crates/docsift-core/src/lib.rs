//! DocSift Core — shared data model, versioned catalog, configuration and errors.

pub mod catalog;
pub mod config;
pub mod error;
pub mod types;

pub use catalog::{
    Catalog, DocumentTypeSpec, EntityDictionaries, Thresholds, Vocabulary, WeightedPattern,
    WeightedTerm,
};
pub use config::{OcrSettings, PipelineConfig};
pub use error::{Error, Result};
pub use types::*;
