//! Pipeline configuration from environment and defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::Catalog;
use crate::error::{Error, Result};

pub const DEFAULT_EXTRACTION_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_DOCUMENT_MB: usize = 100;

/// External OCR engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrSettings {
    /// Tesseract executable name or path.
    pub tesseract_path: String,
    /// Tesseract language codes, `+`-joined (e.g. `eng+deu`).
    pub languages: String,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            tesseract_path: "tesseract".into(),
            languages: "eng".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Catalog file; `None` uses the builtin catalog.
    pub catalog_path: Option<PathBuf>,
    /// Per-document extraction bound; `None` disables it.
    pub extraction_timeout: Option<Duration>,
    pub max_document_bytes: usize,
    pub ocr: OcrSettings,
    /// Where the command-line driver keeps its result store.
    pub data_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            catalog_path: None,
            extraction_timeout: Some(Duration::from_secs(DEFAULT_EXTRACTION_TIMEOUT_SECS)),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_MB * 1024 * 1024,
            ocr: OcrSettings::default(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl PipelineConfig {
    /// Create configuration from `DOCSIFT_*` environment variables and defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let catalog_path = std::env::var("DOCSIFT_CATALOG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let extraction_timeout = match std::env::var("DOCSIFT_EXTRACTION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.extraction_timeout,
        };

        let max_document_bytes = match std::env::var("DOCSIFT_MAX_DOCUMENT_MB")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            Some(mb) => megabytes_to_bytes(mb)?,
            None => defaults.max_document_bytes,
        };

        let ocr = OcrSettings {
            tesseract_path: std::env::var("DOCSIFT_TESSERACT")
                .unwrap_or(defaults.ocr.tesseract_path),
            languages: std::env::var("DOCSIFT_OCR_LANG").unwrap_or(defaults.ocr.languages),
        };

        let data_dir = std::env::var("DOCSIFT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        Ok(Self {
            catalog_path,
            extraction_timeout,
            max_document_bytes,
            ocr,
            data_dir,
        })
    }

    /// Load the configured catalog, or the builtin one when none is configured.
    pub fn load_catalog(&self) -> Result<Catalog> {
        match &self.catalog_path {
            Some(path) => Catalog::load(path),
            None => {
                let catalog = Catalog::builtin()?;
                info!("Using builtin catalog v{}", catalog.version);
                Ok(catalog)
            }
        }
    }
}

fn megabytes_to_bytes(mb: usize) -> Result<usize> {
    mb.checked_mul(1024 * 1024).ok_or_else(|| {
        Error::InvalidConfiguration(format!(
            "DOCSIFT_MAX_DOCUMENT_MB={} overflows a byte count",
            mb
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(config.catalog_path.is_none());
        assert_eq!(config.extraction_timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.max_document_bytes, 100 * 1024 * 1024);
        assert_eq!(config.ocr.tesseract_path, "tesseract");
    }

    #[test]
    fn test_document_limit_overflow_is_invalid() {
        assert_eq!(megabytes_to_bytes(100).unwrap(), 100 * 1024 * 1024);
        assert_eq!(megabytes_to_bytes(0).unwrap(), 0);
        assert!(matches!(
            megabytes_to_bytes(usize::MAX / 1024),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            megabytes_to_bytes(usize::MAX),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_load_builtin_catalog() {
        let catalog = PipelineConfig::default().load_catalog().unwrap();
        assert!(!catalog.document_types.is_empty());
    }

    #[test]
    fn test_missing_catalog_is_fatal() {
        let config = PipelineConfig {
            catalog_path: Some(PathBuf::from("/definitely/not/here.json")),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.load_catalog(),
            Err(Error::ConfigurationMissing(_))
        ));
    }
}
