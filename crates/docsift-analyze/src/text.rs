//! Text helpers shared by the analysis stages.

use docsift_core::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Words after which a period does not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "dr", "mr", "mrs", "ms", "prof", "st", "jr", "sr", "inc", "ltd", "co", "corp", "vs", "no",
    "e.g", "i.e", "etc", "approx", "dept",
];

static LABELED_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Z][A-Za-z]*(?:[ \t]+[A-Za-z]+){0,2})[ \t]*:[ \t]*([^,;:\n]+)").unwrap()
});

/// Split text into sentences. Line breaks always end a sentence; `.`, `!`
/// and `?` end one when followed by whitespace, except after common
/// abbreviations and single-letter initials.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    for line in text.lines() {
        let bytes = line.as_bytes();
        let mut start = 0;
        for (i, &b) in bytes.iter().enumerate() {
            if (b == b'.' || b == b'!' || b == b'?')
                && i + 1 < bytes.len()
                && bytes[i + 1].is_ascii_whitespace()
                && !(b == b'.' && is_abbreviation(&line[start..i]))
            {
                let s = line[start..=i].trim();
                if !s.is_empty() {
                    sentences.push(s);
                }
                start = i + 1;
            }
        }
        let s = line[start..].trim();
        if !s.is_empty() {
            sentences.push(s);
        }
    }
    sentences
}

/// Whether the word right before a period is an abbreviation or an initial.
fn is_abbreviation(before: &str) -> bool {
    let word = before
        .rsplit(|c: char| c.is_whitespace())
        .next()
        .unwrap_or("")
        .trim_start_matches(|c: char| !c.is_alphanumeric());
    if word.chars().count() == 1 && word.chars().all(|c| c.is_uppercase()) {
        return true;
    }
    let lower = word.to_lowercase();
    ABBREVIATIONS.contains(&lower.as_str())
}

/// Case-insensitive regex source for a literal term, word-bounded at
/// alphanumeric edges, tolerant of any whitespace between words.
pub fn term_pattern(term: &str) -> String {
    let words: Vec<String> = term.split_whitespace().map(regex::escape).collect();
    let body = words.join(r"\s+");
    let starts_word = term.trim_start().chars().next().is_some_and(|c| c.is_alphanumeric());
    let ends_word = term.trim_end().chars().last().is_some_and(|c| c.is_alphanumeric());
    format!(
        "(?i){}{}{}",
        if starts_word { r"\b" } else { "" },
        body,
        if ends_word { r"\b" } else { "" }
    )
}

/// Compile a regex, mapping failures to a configuration error.
pub fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::InvalidConfiguration(format!("bad pattern {:?}: {}", pattern, e)))
}

/// Compile a word-bounded matcher for a literal term.
pub fn compile_term(term: &str) -> Result<Regex> {
    if term.trim().is_empty() {
        return Err(Error::InvalidConfiguration("empty term".into()));
    }
    compile(&term_pattern(term))
}

/// A `Label: value` pair found in text.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledField {
    pub label: String,
    pub value: String,
}

impl LabeledField {
    /// Whether the label is `wanted` or ends with it as a whole word.
    pub fn has_label(&self, wanted: &str) -> bool {
        let label = self.label.to_lowercase();
        let wanted = wanted.to_lowercase();
        label == wanted || label.ends_with(&format!(" {}", wanted))
    }
}

/// `Label: value` pairs in order of appearance. Values stop at `,`, `;`,
/// `:` or a line break.
pub fn labeled_fields(text: &str) -> Vec<LabeledField> {
    LABELED_FIELD
        .captures_iter(text)
        .filter_map(|cap| {
            let label = cap.get(1)?.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
            let value = cap.get(2)?.as_str().trim().trim_end_matches('.').trim().to_string();
            if value.is_empty() {
                None
            } else {
                Some(LabeledField { label, value })
            }
        })
        .collect()
}

/// Truncate to at most `max_words` whitespace-delimited words.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences() {
        let text = "The patient is stable. Follow up in two weeks! Any questions?";
        assert_eq!(
            split_sentences(text),
            vec![
                "The patient is stable.",
                "Follow up in two weeks!",
                "Any questions?"
            ]
        );
    }

    #[test]
    fn test_split_respects_abbreviations() {
        let text = "Seen by Dr. Chen at Acme Inc. today. J. Smith signed.";
        assert_eq!(
            split_sentences(text),
            vec!["Seen by Dr. Chen at Acme Inc. today.", "J. Smith signed."]
        );
    }

    #[test]
    fn test_split_on_lines() {
        assert_eq!(
            split_sentences("Header\n\nBody line one\nBody line two"),
            vec!["Header", "Body line one", "Body line two"]
        );
        assert!(split_sentences("   \n ").is_empty());
    }

    #[test]
    fn test_term_pattern_word_bounded() {
        let re = compile_term("blood pressure").unwrap();
        assert!(re.is_match("High BLOOD\nPressure noted"));
        let claim = compile_term("claim").unwrap();
        assert!(!claim.is_match("disclaimer"));
        assert!(claim.is_match("Claim #12"));
        let plus = compile_term("c++").unwrap();
        assert!(plus.is_match("written in C++."));
    }

    #[test]
    fn test_labeled_fields() {
        let fields = labeled_fields("Patient: John Doe, Diagnosis: Hypertension, Physician: Dr. Chen");
        let pairs: Vec<(&str, &str)> = fields
            .iter()
            .map(|f| (f.label.as_str(), f.value.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Patient", "John Doe"),
                ("Diagnosis", "Hypertension"),
                ("Physician", "Dr. Chen")
            ]
        );
    }

    #[test]
    fn test_has_label_suffix() {
        let field = LabeledField {
            label: "Referring Physician".into(),
            value: "Dr. Lee".into(),
        };
        assert!(field.has_label("physician"));
        assert!(!field.has_label("sician"));
    }

    #[test]
    fn test_truncate_words() {
        assert_eq!(truncate_words("a b  c d", 3), "a b c");
        assert_eq!(truncate_words("", 3), "");
    }
}
