//! Error types for DocSift.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Extraction failed: {reason}")]
    ExtractionFailed { reason: String },

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Entity extraction error: {0}")]
    EntityExtraction(String),

    #[error("Summarization error: {0}")]
    Summarization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for `Error::ExtractionFailed`.
    pub fn extraction(reason: impl Into<String>) -> Self {
        Error::ExtractionFailed {
            reason: reason.into(),
        }
    }

    /// The bare reason carried by an extraction failure, or the display form otherwise.
    pub fn reason(&self) -> String {
        match self {
            Error::ExtractionFailed { reason } => reason.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
