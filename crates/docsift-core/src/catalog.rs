//! Versioned document-type catalog: keywords, patterns, weights, thresholds
//! and entity dictionaries.
//!
//! The catalog is read-only after load. A builtin copy ships with the crate
//! (`config/catalog.json`); deployments point `DOCSIFT_CATALOG` at their own.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::DocumentType;

const BUILTIN_CATALOG: &str = include_str!("../config/catalog.json");

/// Confidence thresholds and scoring constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Below this the winner is reported as `other`.
    pub minimum_confidence: f64,
    pub medium_confidence: f64,
    pub high_confidence: f64,
    /// `confidence = raw / (raw + smoothing_constant)`.
    pub smoothing_constant: f64,
    pub vocabulary_bonus: f64,
    /// Alternatives must score strictly above this.
    pub alternative_floor: f64,
    pub max_alternatives: usize,
    /// Distinct vocabulary terms needed before a vocabulary counts as detected.
    pub vocabulary_min_hits: usize,
    pub summary_max_words: usize,
    pub summary_max_sentences: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            minimum_confidence: 0.3,
            medium_confidence: 0.5,
            high_confidence: 0.75,
            smoothing_constant: 4.0,
            vocabulary_bonus: 0.75,
            alternative_floor: 0.1,
            max_alternatives: 3,
            vocabulary_min_hits: 2,
            summary_max_words: 40,
            summary_max_sentences: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedTerm {
    pub term: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedPattern {
    pub pattern: String,
    pub weight: f64,
}

/// One classifiable document type, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTypeSpec {
    pub document_type: DocumentType,
    #[serde(default)]
    pub keywords: Vec<WeightedTerm>,
    #[serde(default)]
    pub patterns: Vec<WeightedPattern>,
    /// Name of the vocabulary whose detection adds the vocabulary bonus.
    #[serde(default)]
    pub vocabulary: Option<String>,
    #[serde(default)]
    pub summary_template: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub name: String,
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityDictionaries {
    pub domain_terms: Vec<String>,
    /// Capitalized words that never start or end a person name.
    pub name_stopwords: Vec<String>,
    pub person_titles: Vec<String>,
    pub organization_suffixes: Vec<String>,
    /// Labels that introduce an identifier, e.g. `MRN`, `Policy Number`.
    pub identifier_labels: Vec<String>,
    /// Labels whose value is a person name, e.g. `Patient`, `Physician`.
    pub name_labels: Vec<String>,
}

/// The full catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub version: String,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub document_types: Vec<DocumentTypeSpec>,
    #[serde(default)]
    pub vocabularies: Vec<Vocabulary>,
    #[serde(default)]
    pub entity_dictionaries: EntityDictionaries,
}

impl Catalog {
    /// The catalog shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CATALOG)
    }

    /// Load and validate a catalog file. A missing or empty file is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigurationMissing(format!(
                "catalog not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigurationMissing(format!("catalog unreadable: {}: {}", path.display(), e))
        })?;
        if content.trim().is_empty() {
            return Err(Error::ConfigurationMissing(format!(
                "catalog is empty: {}",
                path.display()
            )));
        }
        let catalog = Self::from_json(&content)?;
        info!(
            "Loaded catalog v{} from {} ({} document types)",
            catalog.version,
            path.display(),
            catalog.document_types.len()
        );
        Ok(catalog)
    }

    /// Parse and validate catalog JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfiguration(format!("catalog: {}", e)))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn type_spec(&self, document_type: DocumentType) -> Option<&DocumentTypeSpec> {
        self.document_types
            .iter()
            .find(|spec| spec.document_type == document_type)
    }

    pub fn vocabulary(&self, name: &str) -> Option<&Vocabulary> {
        self.vocabularies.iter().find(|v| v.name == name)
    }

    /// Check structure, value ranges and the keyword > pattern > vocabulary
    /// contribution ordering of every type.
    pub fn validate(&self) -> Result<()> {
        if self.document_types.is_empty() {
            return Err(Error::ConfigurationMissing(
                "catalog declares no document types".into(),
            ));
        }
        if self.entity_dictionaries.domain_terms.is_empty() {
            return Err(Error::ConfigurationMissing(
                "catalog declares no domain-term dictionary".into(),
            ));
        }

        let t = &self.thresholds;
        for (name, value) in [
            ("minimum_confidence", t.minimum_confidence),
            ("medium_confidence", t.medium_confidence),
            ("high_confidence", t.high_confidence),
            ("alternative_floor", t.alternative_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidConfiguration(format!(
                    "threshold {} out of range: {}",
                    name, value
                )));
            }
        }
        if t.minimum_confidence > t.medium_confidence || t.medium_confidence > t.high_confidence {
            return Err(Error::InvalidConfiguration(
                "thresholds must satisfy minimum <= medium <= high".into(),
            ));
        }
        if !(t.smoothing_constant > 0.0) || !t.smoothing_constant.is_finite() {
            return Err(Error::InvalidConfiguration(
                "smoothing_constant must be positive".into(),
            ));
        }
        if !(t.vocabulary_bonus >= 0.0) {
            return Err(Error::InvalidConfiguration(
                "vocabulary_bonus must not be negative".into(),
            ));
        }
        if t.summary_max_words == 0 || t.summary_max_sentences == 0 {
            return Err(Error::InvalidConfiguration(
                "summary bounds must be positive".into(),
            ));
        }

        let vocab_names: HashSet<&str> = self.vocabularies.iter().map(|v| v.name.as_str()).collect();
        let mut seen = HashSet::new();
        for spec in &self.document_types {
            let ty = spec.document_type;
            if ty == DocumentType::Other {
                return Err(Error::InvalidConfiguration(
                    "`other` is the fallback type and cannot be declared".into(),
                ));
            }
            if !seen.insert(ty) {
                return Err(Error::InvalidConfiguration(format!(
                    "document type declared twice: {}",
                    ty
                )));
            }
            if spec.keywords.is_empty() {
                return Err(Error::InvalidConfiguration(format!("{} has no keywords", ty)));
            }
            let weights = spec
                .keywords
                .iter()
                .map(|k| k.weight)
                .chain(spec.patterns.iter().map(|p| p.weight));
            for weight in weights {
                if !(weight > 0.0) || !weight.is_finite() {
                    return Err(Error::InvalidConfiguration(format!(
                        "{} has a non-positive weight",
                        ty
                    )));
                }
            }

            // Strict ordering: every keyword outweighs every pattern, and every
            // pattern outweighs the vocabulary bonus.
            let min_keyword = spec
                .keywords
                .iter()
                .map(|k| k.weight)
                .fold(f64::INFINITY, f64::min);
            let max_pattern = spec.patterns.iter().map(|p| p.weight).fold(0.0, f64::max);
            if max_pattern >= min_keyword {
                return Err(Error::InvalidConfiguration(format!(
                    "{}: pattern weight {} must be below keyword weight {}",
                    ty, max_pattern, min_keyword
                )));
            }
            if let Some(vocab) = &spec.vocabulary {
                if !vocab_names.contains(vocab.as_str()) {
                    return Err(Error::InvalidConfiguration(format!(
                        "{} references unknown vocabulary {}",
                        ty, vocab
                    )));
                }
                let (floor, floor_kind) = if spec.patterns.is_empty() {
                    (min_keyword, "keyword")
                } else {
                    (
                        spec.patterns
                            .iter()
                            .map(|p| p.weight)
                            .fold(f64::INFINITY, f64::min),
                        "pattern",
                    )
                };
                if t.vocabulary_bonus >= floor {
                    return Err(Error::InvalidConfiguration(format!(
                        "{}: vocabulary bonus {} must be below {} weight {}",
                        ty, t.vocabulary_bonus, floor_kind, floor
                    )));
                }
            }
        }

        debug!(
            "Catalog v{} valid: {} types, {} vocabularies",
            self.version,
            self.document_types.len(),
            self.vocabularies.len()
        );
        Ok(())
    }
}
