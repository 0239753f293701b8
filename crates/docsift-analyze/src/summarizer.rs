//! Type-conditioned summaries.
//!
//! A catalog template is used when every placeholder resolves from labeled
//! fields or extracted entities. Otherwise the summary is extractive: the
//! best-scoring sentences by keyword hits and position, kept in source order.

use std::collections::BTreeMap;

use docsift_core::{
    Catalog, DocumentType, EntityBundle, EntityCategory, Result, SummaryResult, SummaryType,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::text::{compile_term, labeled_fields, split_sentences, truncate_words, LabeledField};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

/// Labeled values longer than this are prose, not field values.
const MAX_FIELD_WORDS: usize = 8;

/// Where a placeholder looks for its value, in order.
enum Source {
    Label(&'static [&'static str]),
    Entity(EntityCategory),
    TitledName,
    UntitledName,
}

fn sources(placeholder: &str) -> &'static [Source] {
    use EntityCategory::*;
    use Source::*;
    match placeholder {
        "name" => &[
            Label(&["patient name", "patient", "name", "insured", "member", "subscriber", "signed by"]),
            UntitledName,
            Entity(Names),
        ],
        "physician" => &[
            Label(&["physician", "doctor", "provider", "prescriber", "attending", "investigator"]),
            TitledName,
        ],
        "diagnosis" => &[
            Label(&["diagnosis", "impression", "condition"]),
            Entity(DomainTerms),
        ],
        "date" => &[Label(&["date", "collected", "signed on"]), Entity(Dates)],
        "organization" => &[
            Entity(Organizations),
            Label(&["organization", "facility", "company", "sponsor", "site"]),
        ],
        "amount" => &[
            Entity(Amounts),
            Label(&["amount due", "total due", "total", "balance due", "amount"]),
        ],
        "identifier" => &[Entity(Identifiers)],
        "medication" => &[Label(&["medication", "drug", "rx", "medicine"])],
        "test" => &[Label(&["test", "test name", "analyte", "panel"])],
        _ => &[],
    }
}

struct TypeRules {
    keywords: Vec<(Regex, f64)>,
    template: Option<String>,
}

pub struct Summarizer {
    rules: BTreeMap<DocumentType, TypeRules>,
    max_words: usize,
    max_sentences: usize,
}

impl Summarizer {
    pub fn new(catalog: &Catalog) -> Result<Self> {
        let mut rules = BTreeMap::new();
        for spec in &catalog.document_types {
            let keywords = spec
                .keywords
                .iter()
                .map(|k| Ok((compile_term(&k.term)?, k.weight)))
                .collect::<Result<Vec<_>>>()?;
            rules.insert(
                spec.document_type,
                TypeRules {
                    keywords,
                    template: spec.summary_template.clone(),
                },
            );
        }
        Ok(Self {
            rules,
            max_words: catalog.thresholds.summary_max_words,
            max_sentences: catalog.thresholds.summary_max_sentences,
        })
    }

    pub fn summarize(
        &self,
        text: &str,
        document_type: DocumentType,
        entities: &EntityBundle,
    ) -> SummaryResult {
        if text.trim().is_empty() {
            return SummaryResult::empty();
        }

        let template = self
            .rules
            .get(&document_type)
            .and_then(|r| r.template.as_deref());
        if let Some(filled) = template.and_then(|t| fill_template(t, text, entities)) {
            debug!("Template summary for {}", document_type);
            return SummaryResult::new(truncate_words(&filled, self.max_words), SummaryType::Template);
        }

        let summary = self.extractive(text, document_type);
        SummaryResult::new(summary, SummaryType::Extractive)
    }

    fn extractive(&self, text: &str, document_type: DocumentType) -> String {
        let sentences = split_sentences(text);
        let keywords: Vec<&(Regex, f64)> = match self.rules.get(&document_type) {
            Some(rules) => rules.keywords.iter().collect(),
            None => self.rules.values().flat_map(|r| r.keywords.iter()).collect(),
        };

        let mut scored: Vec<(usize, f64)> = sentences
            .iter()
            .enumerate()
            .map(|(i, sentence)| {
                let hits: f64 = keywords
                    .iter()
                    .filter(|(re, _)| re.is_match(sentence))
                    .map(|(_, w)| w)
                    .sum();
                (i, hits + 1.0 / (i as f64 + 1.0))
            })
            .collect();
        // Highest score first; earlier sentence on ties.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut chosen: Vec<usize> = scored.iter().take(self.max_sentences).map(|(i, _)| *i).collect();
        chosen.sort_unstable();
        let joined = chosen
            .iter()
            .map(|&i| sentences[i])
            .collect::<Vec<_>>()
            .join(" ");
        truncate_words(&joined, self.max_words)
    }
}

/// Fill every `{placeholder}`; `None` if any stays unresolved.
fn fill_template(template: &str, text: &str, entities: &EntityBundle) -> Option<String> {
    let fields = labeled_fields(text);
    let mut missing = false;
    let filled = PLACEHOLDER.replace_all(template, |caps: &regex::Captures<'_>| {
        match resolve(&caps[1], &fields, entities) {
            Some(value) => value,
            None => {
                missing = true;
                String::new()
            }
        }
    });
    (!missing).then(|| filled.into_owned())
}

fn resolve(placeholder: &str, fields: &[LabeledField], entities: &EntityBundle) -> Option<String> {
    sources(placeholder).iter().find_map(|source| match source {
        Source::Label(labels) => labels.iter().find_map(|label| {
            fields
                .iter()
                .find(|f| f.has_label(label) && f.value.split_whitespace().count() <= MAX_FIELD_WORDS)
                .map(|f| f.value.clone())
        }),
        Source::Entity(category) => entities.get(*category).first().cloned(),
        Source::TitledName => entities
            .get(EntityCategory::Names)
            .iter()
            .find(|n| n.starts_with("Dr"))
            .cloned(),
        Source::UntitledName => entities
            .get(EntityCategory::Names)
            .iter()
            .find(|n| !n.starts_with("Dr"))
            .cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EntityExtractor;

    fn summarize(text: &str, document_type: DocumentType) -> SummaryResult {
        let catalog = Catalog::builtin().unwrap();
        let entities = EntityExtractor::new(&catalog).unwrap().extract(text);
        Summarizer::new(&catalog)
            .unwrap()
            .summarize(text, document_type, &entities)
    }

    #[test]
    fn test_medical_template() {
        let result = summarize(
            "Patient: John Doe, Diagnosis: Hypertension, Physician: Dr. Chen",
            DocumentType::MedicalReport,
        );
        assert_eq!(result.summary_type, SummaryType::Template);
        assert_eq!(
            result.summary,
            "Patient John Doe was seen by Dr. Chen with a diagnosis of Hypertension."
        );
        assert_eq!(result.word_count, 13);
    }

    #[test]
    fn test_unresolved_template_falls_back_to_extractive() {
        let result = summarize(
            "Patient reports mild symptoms. Weather was nice. Treatment plan reviewed with family.",
            DocumentType::MedicalReport,
        );
        assert_eq!(result.summary_type, SummaryType::Extractive);
        assert_eq!(
            result.summary,
            "Patient reports mild symptoms. Treatment plan reviewed with family."
        );
    }

    #[test]
    fn test_other_uses_all_keywords() {
        let result = summarize(
            "Hello there. Nothing here. The invoice is attached.",
            DocumentType::Other,
        );
        assert_eq!(result.summary_type, SummaryType::Extractive);
        assert_eq!(result.summary, "Hello there. The invoice is attached.");
    }

    #[test]
    fn test_word_bound() {
        let long = "word ".repeat(200);
        let result = summarize(&long, DocumentType::Administrative);
        assert_eq!(result.word_count, 40);
        assert!(!result.summary.is_empty());
    }

    #[test]
    fn test_empty_text() {
        let result = summarize("  \n ", DocumentType::Billing);
        assert_eq!(result, SummaryResult::empty());
        assert_eq!(result.summary_type, SummaryType::None);
    }

    #[test]
    fn test_non_empty_text_always_summarized() {
        for text in ["x", "...", "42", "ALL CAPS HEADER"] {
            let result = summarize(text, DocumentType::Other);
            assert!(!result.summary.is_empty(), "empty summary for {:?}", text);
        }
    }

    #[test]
    fn test_billing_template_from_entities() {
        let text = "Invoice from Acme Labs\nAmount Due: $1,250.00\nDue Date: 2024-03-31";
        let result = summarize(text, DocumentType::Billing);
        assert_eq!(result.summary_type, SummaryType::Template);
        assert_eq!(
            result.summary,
            "Invoice from Acme Labs for $1,250.00 due 2024-03-31."
        );
    }
}
