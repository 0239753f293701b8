//! Weighted keyword/pattern classification against the document-type catalog.
//!
//! For each declared type:
//!
//! ```text
//! raw        = Σ keyword weights (each keyword once, case-insensitive, word-bounded)
//!            + Σ pattern weights (each pattern once)
//!            + vocabulary bonus (if the analyzer detected the type's vocabulary)
//! confidence = raw / (raw + smoothing_constant)
//! ```
//!
//! The highest confidence wins; ties go to the type declared first. Only text
//! and analysis signals are consulted, never the filename.

use std::cmp::Ordering;

use docsift_core::{
    clamp_unit, AnalysisSignals, Alternative, Catalog, ClassificationResult, DocumentType,
    Result, Thresholds,
};
use regex::Regex;
use tracing::debug;

use crate::text::{compile, compile_term};

struct Rule {
    label: String,
    regex: Regex,
    weight: f64,
}

struct CompiledType {
    document_type: DocumentType,
    keywords: Vec<Rule>,
    patterns: Vec<Rule>,
    vocabulary: Option<String>,
}

/// Score of one catalog type for one text.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeScore {
    pub document_type: DocumentType,
    pub raw_score: f64,
    pub confidence: f64,
    /// Contributing checks in evaluation order.
    pub reasoning: Vec<String>,
}

pub struct Classifier {
    types: Vec<CompiledType>,
    thresholds: Thresholds,
}

impl Classifier {
    pub fn new(catalog: &Catalog) -> Result<Self> {
        let types = catalog
            .document_types
            .iter()
            .map(|spec| {
                let keywords = spec
                    .keywords
                    .iter()
                    .map(|k| {
                        Ok(Rule {
                            label: k.term.clone(),
                            regex: compile_term(&k.term)?,
                            weight: k.weight,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let patterns = spec
                    .patterns
                    .iter()
                    .map(|p| {
                        Ok(Rule {
                            label: p.pattern.clone(),
                            regex: compile(&p.pattern)?,
                            weight: p.weight,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(CompiledType {
                    document_type: spec.document_type,
                    keywords,
                    patterns,
                    vocabulary: spec.vocabulary.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            types,
            thresholds: catalog.thresholds.clone(),
        })
    }

    /// Scores for every catalog type, in declaration order.
    pub fn score_all(&self, text: &str, signals: &AnalysisSignals) -> Vec<TypeScore> {
        self.types
            .iter()
            .map(|ty| self.score(ty, text, signals))
            .collect()
    }

    fn score(&self, ty: &CompiledType, text: &str, signals: &AnalysisSignals) -> TypeScore {
        let mut raw = 0.0;
        let mut reasoning = Vec::new();

        for rule in ty.keywords.iter().filter(|r| r.regex.is_match(text)) {
            raw += rule.weight;
            reasoning.push(format!("keyword '{}' (+{:.2})", rule.label, rule.weight));
        }
        for rule in ty.patterns.iter().filter(|r| r.regex.is_match(text)) {
            raw += rule.weight;
            reasoning.push(format!("pattern /{}/ (+{:.2})", rule.label, rule.weight));
        }
        if let Some(vocab) = &ty.vocabulary {
            if signals.detected_vocabularies.contains(vocab) {
                raw += self.thresholds.vocabulary_bonus;
                reasoning.push(format!(
                    "vocabulary '{}' detected (+{:.2})",
                    vocab, self.thresholds.vocabulary_bonus
                ));
            }
        }

        TypeScore {
            document_type: ty.document_type,
            raw_score: raw,
            confidence: self.normalize(raw),
            reasoning,
        }
    }

    /// Saturating map of a raw score into [0, 1).
    pub fn normalize(&self, raw: f64) -> f64 {
        if raw <= 0.0 {
            return 0.0;
        }
        clamp_unit(raw / (raw + self.thresholds.smoothing_constant))
    }

    pub fn classify(&self, text: &str, signals: &AnalysisSignals) -> ClassificationResult {
        let scores = self.score_all(text, signals);

        // Strict `>` keeps the first declared type on ties.
        let mut winner: Option<&TypeScore> = None;
        for score in &scores {
            if winner.map_or(true, |w| score.confidence > w.confidence) {
                winner = Some(score);
            }
        }
        let Some(winner) = winner else {
            return ClassificationResult {
                document_type: DocumentType::Other,
                confidence: 0.0,
                reasoning: vec!["catalog declares no document types".into()],
                alternatives: Vec::new(),
                degraded: true,
            };
        };

        let t = &self.thresholds;
        let degraded = winner.confidence < t.minimum_confidence;

        let mut alternatives: Vec<Alternative> = scores
            .iter()
            .filter(|s| {
                if std::ptr::eq(*s, winner) {
                    degraded && s.raw_score > 0.0
                } else {
                    s.confidence > t.alternative_floor
                }
            })
            .map(|s| Alternative {
                document_type: s.document_type,
                confidence: s.confidence,
            })
            .collect();
        alternatives.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });
        alternatives.truncate(t.max_alternatives);

        let mut reasoning = winner.reasoning.clone();
        let document_type = if degraded {
            reasoning.push(format!(
                "best candidate {} at {:.2} is below minimum confidence {:.2}",
                winner.document_type, winner.confidence, t.minimum_confidence
            ));
            DocumentType::Other
        } else {
            winner.document_type
        };

        debug!(
            "Classified as {} ({:.3}), {} alternatives",
            document_type,
            winner.confidence,
            alternatives.len()
        );

        ClassificationResult {
            document_type,
            confidence: winner.confidence,
            reasoning,
            alternatives,
            degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::ContentAnalyzer;

    const TEST_CATALOG: &str = r#"{
        "version": "test",
        "thresholds": {"minimum_confidence": 0.3, "smoothing_constant": 4.0, "vocabulary_bonus": 1.0},
        "document_types": [
            {
                "document_type": "billing",
                "keywords": [{"term": "invoice", "weight": 2.0}, {"term": "amount due", "weight": 2.0}],
                "patterns": [{"pattern": "\\$\\d+", "weight": 1.5}],
                "vocabulary": "financial"
            },
            {
                "document_type": "insurance",
                "keywords": [{"term": "policy", "weight": 2.0}, {"term": "claim", "weight": 2.0}],
                "patterns": [{"pattern": "(?i)policy\\s*#", "weight": 1.5}],
                "vocabulary": "financial"
            },
            {
                "document_type": "administrative",
                "keywords": [{"term": "memo", "weight": 2.0}, {"term": "invoice", "weight": 2.0}]
            }
        ],
        "vocabularies": [{"name": "financial", "terms": ["invoice", "payment", "balance"]}],
        "entity_dictionaries": {"domain_terms": ["copay"]}
    }"#;

    fn setup(json: &str) -> (Classifier, ContentAnalyzer) {
        let catalog = Catalog::from_json(json).unwrap();
        (
            Classifier::new(&catalog).unwrap(),
            ContentAnalyzer::new(&catalog).unwrap(),
        )
    }

    fn classify(json: &str, text: &str) -> ClassificationResult {
        let (classifier, analyzer) = setup(json);
        classifier.classify(text, &analyzer.analyze(text))
    }

    #[test]
    fn test_exclusive_type_wins() {
        let result = classify(TEST_CATALOG, "Invoice 12. Amount due: $300 for the payment.");
        assert_eq!(result.document_type, DocumentType::Billing);
        assert!(!result.degraded);
        assert!(result
            .alternatives
            .iter()
            .all(|a| result.confidence > a.confidence));
        // 2 + 2 + 1.5 + 1 = 6.5
        assert!((result.confidence - 6.5 / 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_reasoning_in_check_order() {
        let result = classify(TEST_CATALOG, "Invoice: amount due $40, payment pending");
        assert_eq!(
            result.reasoning,
            vec![
                "keyword 'invoice' (+2.00)",
                "keyword 'amount due' (+2.00)",
                "pattern /\\$\\d+/ (+1.50)",
                "vocabulary 'financial' detected (+1.00)",
            ]
        );
    }

    #[test]
    fn test_keywords_counted_once() {
        let (classifier, analyzer) = setup(TEST_CATALOG);
        let once = "memo";
        let many = "memo memo memo memo";
        let a = classifier.score_all(once, &analyzer.analyze(once));
        let b = classifier.score_all(many, &analyzer.analyze(many));
        assert_eq!(a[2].raw_score, b[2].raw_score);
    }

    #[test]
    fn test_tie_goes_to_first_declared() {
        // "invoice" alone: billing 2.0 and administrative 2.0.
        let result = classify(TEST_CATALOG, "invoice");
        assert_eq!(result.document_type, DocumentType::Billing);
        assert_eq!(result.alternatives[0].document_type, DocumentType::Administrative);
        assert_eq!(result.alternatives[0].confidence, result.confidence);
    }

    #[test]
    fn test_below_threshold_reports_other_with_raw_confidence() {
        let json = TEST_CATALOG.replace("\"minimum_confidence\": 0.3", "\"minimum_confidence\": 0.5");
        let result = classify(&json, "A short memo.");
        assert_eq!(result.document_type, DocumentType::Other);
        assert!(result.degraded);
        // memo = 2.0 → 2 / 6
        assert!((result.confidence - 2.0 / 6.0).abs() < 1e-9);
        assert!(result.confidence > 0.0);
        assert_eq!(
            result.alternatives.first().map(|a| a.document_type),
            Some(DocumentType::Administrative)
        );
        assert!(result.reasoning.last().unwrap().contains("below minimum confidence"));
    }

    #[test]
    fn test_no_matches() {
        let result = classify(TEST_CATALOG, "Nothing relevant here at all.");
        assert_eq!(result.document_type, DocumentType::Other);
        assert_eq!(result.confidence, 0.0);
        assert!(result.alternatives.is_empty());
    }

    #[test]
    fn test_alternatives_sorted_and_capped() {
        let json = TEST_CATALOG.replace("\"vocabulary_bonus\": 1.0", "\"vocabulary_bonus\": 1.0, \"max_alternatives\": 1");
        let result = classify(&json, "Invoice for policy # 7 claim");
        assert_eq!(result.alternatives.len(), 1);
        let full = classify(TEST_CATALOG, "Invoice for policy # 7 claim");
        let confidences: Vec<f64> = full.alternatives.iter().map(|a| a.confidence).collect();
        let mut sorted = confidences.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(confidences, sorted);
        assert!(full
            .alternatives
            .iter()
            .all(|a| a.document_type != full.document_type));
    }

    #[test]
    fn test_medical_report_sample() {
        let catalog = Catalog::builtin().unwrap();
        let classifier = Classifier::new(&catalog).unwrap();
        let analyzer = ContentAnalyzer::new(&catalog).unwrap();
        let text = "Patient: John Doe, Diagnosis: Hypertension, Physician: Dr. Chen";
        let result = classifier.classify(text, &analyzer.analyze(text));
        assert_eq!(result.document_type, DocumentType::MedicalReport);
        assert!(result.confidence >= catalog.thresholds.medium_confidence);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let json = TEST_CATALOG.replace("\\\\$\\\\d+", "(unclosed");
        let catalog = Catalog::from_json(&json).unwrap();
        assert!(Classifier::new(&catalog).is_err());
    }
}
