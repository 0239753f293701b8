//! Content analysis: structural flags, text statistics and vocabulary detection.
//!
//! A pure function of the text and the catalog's vocabularies.

use std::collections::BTreeSet;

use docsift_core::{AnalysisSignals, Catalog, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::text::{compile_term, split_sentences};

static MARKDOWN_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+\S").unwrap());
static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•‣◦]|\d{1,3}[.)]|[a-z][.)])\s+\S").unwrap());
static GRID_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t+|\s{2,}").unwrap());

/// Sentence length (words) at which readability bottoms out.
const SENTENCE_LENGTH_CEILING: f64 = 40.0;
/// Average word length range mapped onto the word-length penalty.
const WORD_LENGTH_FLOOR: f64 = 3.0;
const WORD_LENGTH_SPAN: f64 = 7.0;

struct CompiledVocabulary {
    name: String,
    terms: Vec<regex::Regex>,
}

pub struct ContentAnalyzer {
    vocabularies: Vec<CompiledVocabulary>,
    min_hits: usize,
}

impl ContentAnalyzer {
    pub fn new(catalog: &Catalog) -> Result<Self> {
        let vocabularies = catalog
            .vocabularies
            .iter()
            .map(|vocab| {
                Ok(CompiledVocabulary {
                    name: vocab.name.clone(),
                    terms: vocab
                        .terms
                        .iter()
                        .map(|t| compile_term(t))
                        .collect::<Result<Vec<_>>>()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            vocabularies,
            min_hits: catalog.thresholds.vocabulary_min_hits.max(1),
        })
    }

    pub fn analyze(&self, text: &str) -> AnalysisSignals {
        let sentences = split_sentences(text);
        let sentence_count = sentences.len();
        let word_count = text.split_whitespace().count();

        let sentence_words: usize = sentences.iter().map(|s| s.split_whitespace().count()).sum();
        let avg_sentence_length = if sentence_count == 0 {
            0.0
        } else {
            sentence_words as f64 / sentence_count as f64
        };

        let word_lengths: Vec<usize> = text
            .split_whitespace()
            .map(|w| w.chars().filter(|c| c.is_alphanumeric()).count())
            .filter(|&n| n > 0)
            .collect();
        let avg_word_length = if word_lengths.is_empty() {
            0.0
        } else {
            word_lengths.iter().sum::<usize>() as f64 / word_lengths.len() as f64
        };

        let readability_score = if word_lengths.is_empty() {
            0.0
        } else {
            readability(avg_sentence_length, avg_word_length)
        };

        AnalysisSignals {
            has_headers: has_headers(text),
            has_lists: has_lists(text),
            has_tables: has_tables(text),
            word_count,
            sentence_count,
            avg_sentence_length,
            avg_word_length,
            readability_score,
            detected_vocabularies: self.detect_vocabularies(text),
        }
    }

    /// Vocabularies with at least `min_hits` distinct terms present.
    fn detect_vocabularies(&self, text: &str) -> BTreeSet<String> {
        self.vocabularies
            .iter()
            .filter(|vocab| {
                vocab.terms.iter().filter(|re| re.is_match(text)).count() >= self.min_hits
            })
            .map(|vocab| vocab.name.clone())
            .collect()
    }
}

/// Shorter sentences and shorter words read more easily; result in [0, 1].
fn readability(avg_sentence_length: f64, avg_word_length: f64) -> f64 {
    let sentence_penalty = (avg_sentence_length / SENTENCE_LENGTH_CEILING).min(1.0);
    let word_penalty = ((avg_word_length - WORD_LENGTH_FLOOR) / WORD_LENGTH_SPAN).clamp(0.0, 1.0);
    (1.0 - 0.5 * sentence_penalty - 0.5 * word_penalty).clamp(0.0, 1.0)
}

/// Markdown headings, short all-caps lines, or short lines ending in a colon.
fn has_headers(text: &str) -> bool {
    text.lines().map(str::trim).any(|line| {
        if line.is_empty() {
            return false;
        }
        if MARKDOWN_HEADER.is_match(line) {
            return true;
        }
        let words = line.split_whitespace().count();
        let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
        let all_caps = letters.len() >= 3 && letters.iter().all(|c| c.is_uppercase());
        (all_caps && words <= 8) || (line.ends_with(':') && words <= 6)
    })
}

fn has_lists(text: &str) -> bool {
    text.lines().filter(|line| LIST_ITEM.is_match(line)).count() >= 2
}

/// Two consecutive lines that are pipe rows, or that split into the same
/// number (>= 2) of tab/space-aligned columns.
fn has_tables(text: &str) -> bool {
    let mut previous: Option<usize> = None;
    for line in text.lines() {
        let trimmed = line.trim();
        let columns = if trimmed.matches('|').count() >= 2 {
            Some(usize::MAX)
        } else {
            let cells = GRID_SPLIT.split(trimmed).filter(|c| !c.is_empty()).count();
            (cells >= 2).then_some(cells)
        };
        if columns.is_some() && columns == previous {
            return true;
        }
        previous = columns;
    }
    false
}
