//! A catalog compiled into the read-only rules every pipeline run shares.

use std::sync::Arc;

use docsift_core::{Catalog, Result};
use tracing::info;

use crate::analyzer::ContentAnalyzer;
use crate::classifier::Classifier;
use crate::entities::{EntityExtractor, EntityMatcher};
use crate::summarizer::Summarizer;

pub struct Ruleset {
    catalog: Catalog,
    analyzer: ContentAnalyzer,
    classifier: Classifier,
    entities: EntityExtractor,
    summarizer: Summarizer,
}

impl Ruleset {
    /// Validate the catalog and compile every rule. Fails on the first bad
    /// pattern or missing section; nothing is partially applied.
    pub fn compile(catalog: Catalog) -> Result<Self> {
        catalog.validate()?;
        let analyzer = ContentAnalyzer::new(&catalog)?;
        let classifier = Classifier::new(&catalog)?;
        let entities = EntityExtractor::new(&catalog)?;
        let summarizer = Summarizer::new(&catalog)?;
        info!(
            "Compiled catalog v{}: {} document types, {} vocabularies",
            catalog.version,
            catalog.document_types.len(),
            catalog.vocabularies.len()
        );
        Ok(Self {
            catalog,
            analyzer,
            classifier,
            entities,
            summarizer,
        })
    }

    pub fn builtin() -> Result<Self> {
        Self::compile(Catalog::builtin()?)
    }

    /// Swap in a custom matcher for one entity category.
    pub fn with_entity_matcher(mut self, matcher: Arc<dyn EntityMatcher>) -> Self {
        self.entities = self.entities.with_matcher(matcher);
        self
    }

    pub fn version(&self) -> &str {
        &self.catalog.version
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn analyzer(&self) -> &ContentAnalyzer {
        &self.analyzer
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn entities(&self) -> &EntityExtractor {
        &self.entities
    }

    pub fn summarizer(&self) -> &Summarizer {
        &self.summarizer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsift_core::{DocumentType, EntityCategory, Error};

    #[test]
    fn test_builtin_compiles() {
        let rules = Ruleset::builtin().unwrap();
        assert_eq!(rules.version(), "2024.1");
        assert_eq!(rules.catalog().document_types.len(), 8);
    }

    #[test]
    fn test_rejects_bad_pattern() {
        let mut catalog = Catalog::builtin().unwrap();
        catalog.document_types[0].patterns[0].pattern = "([".into();
        match Ruleset::compile(catalog) {
            Err(Error::InvalidConfiguration(msg)) => assert!(msg.contains("bad pattern")),
            other => panic!("unexpected {:?}", other.err()),
        }
    }

    #[test]
    fn test_rejects_missing_dictionaries() {
        let mut catalog = Catalog::builtin().unwrap();
        catalog.entity_dictionaries.domain_terms.clear();
        assert!(matches!(
            Ruleset::compile(catalog),
            Err(Error::ConfigurationMissing(_))
        ));
    }

    #[test]
    fn test_stages_compose() {
        let rules = Ruleset::builtin().unwrap();
        let text = "Patient: John Doe, Diagnosis: Hypertension, Physician: Dr. Chen";
        let signals = rules.analyzer().analyze(text);
        let classification = rules.classifier().classify(text, &signals);
        let entities = rules.entities().extract(text);
        let summary = rules
            .summarizer()
            .summarize(text, classification.document_type, &entities);
        assert_eq!(classification.document_type, DocumentType::MedicalReport);
        assert_eq!(entities.get(EntityCategory::Names), ["John Doe", "Dr. Chen"]);
        assert!(summary.summary.starts_with("Patient John Doe"));
    }
}
