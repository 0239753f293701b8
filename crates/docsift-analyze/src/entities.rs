//! Entity extraction: one independent matcher per category.
//!
//! Each matcher returns byte spans; spans of a category are collapsed
//! (earliest start wins, longest on equal start), deduplicated and kept in
//! order of first occurrence. A matcher that errors or panics leaves its
//! category empty and is reported in [`EntityBundle::partial`].

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use docsift_core::{Catalog, EntityBundle, EntityCategory, EntityDictionaries, Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::text::{compile, compile_term};

const MONTHS: &str = "January|February|March|April|May|June|July|August|September|October|November|December";
const MONTHS_SHORT: &str = "Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sept|Sep|Oct|Nov|Dec";

static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        format!(r"\b(?:{MONTHS})\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+\d{{4}}\b"),
        format!(r"\b(?:{MONTHS_SHORT})\.?\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+\d{{4}}\b"),
        format!(r"\b\d{{1,2}}(?:st|nd|rd|th)?\s+(?:{MONTHS}|{MONTHS_SHORT})\.?,?\s+\d{{4}}\b"),
        r"\b\d{4}[-/]\d{1,2}[-/]\d{1,2}\b".to_string(),
        r"\b\d{1,2}[-/.]\d{1,2}[-/.]\d{2,4}\b".to_string(),
        r"\bQ[1-4]\s*\d{4}\b".to_string(),
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static AMOUNT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"[$€£¥]\s?\d+(?:,\d{3})*(?:\.\d{1,2})?(?:\s?(?:million|billion|thousand)\b)?",
        r"\b(?:USD|EUR|GBP|JPY|CAD|AUD|CHF|INR)\s?\d+(?:,\d{3})*(?:\.\d{1,2})?\b",
        r"\b\d+(?:,\d{3})*(?:\.\d{1,2})?\s?(?:USD|EUR|GBP|JPY|CAD|AUD|CHF|INR)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());

static PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{2,4}\)[\s.-]?|\b\d{2,4}[\s.-])\d{3,4}[\s.-]\d{4}\b")
        .unwrap()
});

static GENERIC_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]{2,5}-?\d{4,}\b").unwrap());

static CAPITALIZED_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z'-]+[ \t]+[A-Z][a-z'-]+\b").unwrap());

/// Phone numbers carry between 7 and 15 digits.
const PHONE_DIGITS: std::ops::RangeInclusive<usize> = 7..=15;

/// A match in the source text, as byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Span {
    pub fn new(start: usize, end: usize, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    fn of(m: regex::Match<'_>) -> Self {
        Self::new(m.start(), m.end(), m.as_str())
    }
}

/// Finds the matches of one entity category.
pub trait EntityMatcher: Send + Sync {
    fn category(&self) -> EntityCategory;
    fn find(&self, text: &str) -> Result<Vec<Span>>;
}

/// Category matched by a fixed set of regexes, with an optional filter.
pub struct PatternMatcher {
    category: EntityCategory,
    patterns: &'static [Regex],
    accept: fn(&str) -> bool,
}

impl PatternMatcher {
    pub fn dates() -> Self {
        Self {
            category: EntityCategory::Dates,
            patterns: &DATE_PATTERNS,
            accept: |_| true,
        }
    }

    pub fn amounts() -> Self {
        Self {
            category: EntityCategory::Amounts,
            patterns: &AMOUNT_PATTERNS,
            accept: |_| true,
        }
    }

    pub fn emails() -> Self {
        Self {
            category: EntityCategory::Emails,
            patterns: std::slice::from_ref(&*EMAIL),
            accept: |_| true,
        }
    }

    pub fn phones() -> Self {
        Self {
            category: EntityCategory::Phones,
            patterns: std::slice::from_ref(&*PHONE),
            accept: |s| PHONE_DIGITS.contains(&s.chars().filter(char::is_ascii_digit).count()),
        }
    }
}

impl EntityMatcher for PatternMatcher {
    fn category(&self) -> EntityCategory {
        self.category
    }

    fn find(&self, text: &str) -> Result<Vec<Span>> {
        Ok(self
            .patterns
            .iter()
            .flat_map(|re| re.find_iter(text))
            .filter(|m| (self.accept)(m.as_str()))
            .map(Span::of)
            .collect())
    }
}

/// Dictionary lookup; reports the dictionary form of each term.
pub struct DictionaryMatcher {
    category: EntityCategory,
    terms: Vec<(String, Regex)>,
}

impl DictionaryMatcher {
    pub fn new(category: EntityCategory, terms: &[String]) -> Result<Self> {
        let terms = terms
            .iter()
            .map(|t| Ok((t.clone(), compile_term(t)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { category, terms })
    }
}

impl EntityMatcher for DictionaryMatcher {
    fn category(&self) -> EntityCategory {
        self.category
    }

    fn find(&self, text: &str) -> Result<Vec<Span>> {
        Ok(self
            .terms
            .iter()
            .flat_map(|(term, re)| {
                re.find_iter(text)
                    .map(move |m| Span::new(m.start(), m.end(), term.clone()))
            })
            .collect())
    }
}

/// Regex alternation of literal phrases, longest first; `None` for an empty list.
fn alternation(words: &[String]) -> Option<String> {
    let mut words: Vec<&String> = words.iter().filter(|w| !w.trim().is_empty()).collect();
    if words.is_empty() {
        return None;
    }
    words.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let escaped: Vec<String> = words
        .iter()
        .map(|w| w.split_whitespace().map(regex::escape).collect::<Vec<_>>().join(r"[ \t]+"))
        .collect();
    Some(escaped.join("|"))
}

fn organization_regex(dicts: &EntityDictionaries) -> Result<Option<Regex>> {
    alternation(&dicts.organization_suffixes)
        .map(|suffixes| {
            compile(&format!(
                r"\b(?:[A-Z][A-Za-z&'-]*[ \t]+){{1,4}}(?:{})\b",
                suffixes
            ))
        })
        .transpose()
}

/// Capitalized words ending in a configured suffix such as Hospital or Inc.
pub struct OrganizationMatcher {
    regex: Option<Regex>,
}

impl OrganizationMatcher {
    pub fn new(dicts: &EntityDictionaries) -> Result<Self> {
        Ok(Self {
            regex: organization_regex(dicts)?,
        })
    }
}

impl EntityMatcher for OrganizationMatcher {
    fn category(&self) -> EntityCategory {
        EntityCategory::Organizations
    }

    fn find(&self, text: &str) -> Result<Vec<Span>> {
        Ok(self
            .regex
            .iter()
            .flat_map(|re| re.find_iter(text))
            .map(Span::of)
            .collect())
    }
}

/// Person names from titles, labeled fields and capitalized word pairs.
pub struct NameMatcher {
    titled: Option<Regex>,
    labeled: Option<Regex>,
    organizations: Option<Regex>,
    stopwords: HashSet<String>,
    titles: HashSet<String>,
}

impl NameMatcher {
    pub fn new(dicts: &EntityDictionaries) -> Result<Self> {
        let titles = alternation(&dicts.person_titles);
        let titled = titles
            .as_ref()
            .map(|t| compile(&format!(r"\b(?:{})\.?[ \t]+[A-Z][a-z'-]+(?:[ \t]+[A-Z][a-z'-]+)?\b", t)))
            .transpose()?;

        let title_prefix = titles
            .as_ref()
            .map(|t| format!(r"(?:(?:{})\.?[ \t]+)?", t))
            .unwrap_or_default();
        let labeled = alternation(&dicts.name_labels)
            .map(|labels| {
                compile(&format!(
                    r"\b(?i:{})[ \t]*:[ \t]*({}[A-Z][a-z'-]+(?:[ \t]+[A-Z][a-z'-]+){{0,2}})",
                    labels, title_prefix
                ))
            })
            .transpose()?;

        Ok(Self {
            titled,
            labeled,
            organizations: organization_regex(dicts)?,
            stopwords: dicts.name_stopwords.iter().map(|w| w.to_lowercase()).collect(),
            titles: dicts.person_titles.iter().map(|w| w.to_lowercase()).collect(),
        })
    }

    fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(&word.to_lowercase())
    }

    fn is_title(&self, word: &str) -> bool {
        self.titles.contains(&word.trim_end_matches('.').to_lowercase())
    }

    /// Drop trailing stopwords; `None` when no name word remains.
    fn clean(&self, start: usize, candidate: &str) -> Option<Span> {
        let mut end = candidate.len();
        loop {
            let head = candidate[..end].trim_end();
            let (rest, last) = match head.rfind(|c: char| c == ' ' || c == '\t') {
                Some(i) => (&head[..i], &head[i + 1..]),
                None => ("", head),
            };
            if last.is_empty() || self.is_title(last) {
                return None;
            }
            if !self.is_stopword(last) {
                end = head.len();
                break;
            }
            if rest.trim().is_empty() {
                return None;
            }
            end = rest.len();
        }
        Some(Span::new(start, start + end, &candidate[..end]))
    }
}

impl EntityMatcher for NameMatcher {
    fn category(&self) -> EntityCategory {
        EntityCategory::Names
    }

    fn find(&self, text: &str) -> Result<Vec<Span>> {
        let mut spans = Vec::new();

        if let Some(re) = &self.titled {
            spans.extend(re.find_iter(text).filter_map(|m| self.clean(m.start(), m.as_str())));
        }
        if let Some(re) = &self.labeled {
            for cap in re.captures_iter(text) {
                if let Some(m) = cap.get(1) {
                    spans.extend(self.clean(m.start(), m.as_str()));
                }
            }
        }

        let org_spans: Vec<(usize, usize)> = self
            .organizations
            .iter()
            .flat_map(|re| re.find_iter(text))
            .map(|m| (m.start(), m.end()))
            .collect();
        for m in CAPITALIZED_PAIR.find_iter(text) {
            let inside_org = org_spans.iter().any(|&(s, e)| m.start() < e && s < m.end());
            let has_stopword = m
                .as_str()
                .split_whitespace()
                .any(|w| self.is_stopword(w) || self.is_title(w));
            if !inside_org && !has_stopword {
                spans.push(Span::of(m));
            }
        }

        Ok(spans)
    }
}

/// Labeled codes (MRN, Policy, Claim, ...) and generic letter-digit codes.
pub struct IdentifierMatcher {
    labeled: Option<Regex>,
}

impl IdentifierMatcher {
    pub fn new(dicts: &EntityDictionaries) -> Result<Self> {
        let labeled = alternation(&dicts.identifier_labels)
            .map(|labels| {
                compile(&format!(
                    r"\b(?i:{})(?i:[ \t]*(?:number|no\.?|#))?[ \t]*[:#]?[ \t]*([A-Za-z0-9][A-Za-z0-9-]{{2,}})",
                    labels
                ))
            })
            .transpose()?;
        Ok(Self { labeled })
    }
}

impl EntityMatcher for IdentifierMatcher {
    fn category(&self) -> EntityCategory {
        EntityCategory::Identifiers
    }

    fn find(&self, text: &str) -> Result<Vec<Span>> {
        let mut spans: Vec<Span> = self
            .labeled
            .iter()
            .flat_map(|re| re.captures_iter(text))
            .filter_map(|cap| cap.get(1))
            .filter(|m| m.as_str().chars().any(|c| c.is_ascii_digit()))
            .map(Span::of)
            .collect();
        spans.extend(GENERIC_IDENTIFIER.find_iter(text).map(Span::of));
        Ok(spans)
    }
}

/// Order by first occurrence, collapse overlaps (earliest start, then
/// longest), drop duplicate strings.
pub fn collapse(mut spans: Vec<Span>) -> Vec<String> {
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut covered = 0;
    for span in spans {
        if span.start < covered && !out.is_empty() {
            continue;
        }
        covered = span.end;
        let text = span.text.trim().to_string();
        if !text.is_empty() && seen.insert(text.clone()) {
            out.push(text);
        }
    }
    out
}

/// Runs every category matcher over the text.
#[derive(Clone)]
pub struct EntityExtractor {
    matchers: Vec<Arc<dyn EntityMatcher>>,
}

impl EntityExtractor {
    pub fn new(catalog: &Catalog) -> Result<Self> {
        let dicts = &catalog.entity_dictionaries;
        if dicts.domain_terms.is_empty() {
            return Err(Error::ConfigurationMissing(
                "entity dictionaries declare no domain terms".into(),
            ));
        }
        let matchers: Vec<Arc<dyn EntityMatcher>> = vec![
            Arc::new(PatternMatcher::dates()),
            Arc::new(NameMatcher::new(dicts)?),
            Arc::new(OrganizationMatcher::new(dicts)?),
            Arc::new(DictionaryMatcher::new(
                EntityCategory::DomainTerms,
                &dicts.domain_terms,
            )?),
            Arc::new(PatternMatcher::amounts()),
            Arc::new(PatternMatcher::emails()),
            Arc::new(PatternMatcher::phones()),
            Arc::new(IdentifierMatcher::new(dicts)?),
        ];
        Ok(Self { matchers })
    }

    /// Replace the matcher of the same category, or add it.
    pub fn with_matcher(mut self, matcher: Arc<dyn EntityMatcher>) -> Self {
        let category = matcher.category();
        match self.matchers.iter().position(|m| m.category() == category) {
            Some(i) => self.matchers[i] = matcher,
            None => self.matchers.push(matcher),
        }
        self
    }

    pub fn extract(&self, text: &str) -> EntityBundle {
        let mut bundle = EntityBundle::empty();
        for matcher in &self.matchers {
            let category = matcher.category();
            match catch_unwind(AssertUnwindSafe(|| matcher.find(text))) {
                Ok(Ok(spans)) => bundle.set(category, collapse(spans)),
                Ok(Err(e)) => {
                    warn!("Entity matcher for {} failed: {}", category, e);
                    bundle.mark_partial(category);
                }
                Err(_) => {
                    warn!("Entity matcher for {} panicked", category);
                    bundle.mark_partial(category);
                }
            }
        }
        bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> EntityExtractor {
        EntityExtractor::new(&Catalog::builtin().unwrap()).unwrap()
    }

    fn count_total(bundle: &EntityBundle) -> usize {
        bundle.entities().values().map(Vec::len).sum()
    }

    #[test]
    fn test_medical_sample_names_in_order() {
        let bundle = extractor().extract("Patient: John Doe, Diagnosis: Hypertension, Physician: Dr. Chen");
        assert_eq!(bundle.get(EntityCategory::Names), ["John Doe", "Dr. Chen"]);
        assert_eq!(bundle.get(EntityCategory::DomainTerms), ["hypertension"]);
        assert_eq!(bundle.entity_count(), count_total(&bundle));
        assert!(bundle.partial().is_empty());
    }

    #[test]
    fn test_every_category_present_on_empty_text() {
        let bundle = extractor().extract("");
        assert_eq!(bundle.entities().len(), EntityCategory::ALL.len());
        assert_eq!(bundle.entity_count(), 0);
    }

    #[test]
    fn test_dates() {
        let bundle = extractor().extract(
            "Seen on January 15, 2025, again 2025-02-01 and 03/04/2025. Review 5 March 2025 in Q2 2025.",
        );
        assert_eq!(
            bundle.get(EntityCategory::Dates),
            ["January 15, 2025", "2025-02-01", "03/04/2025", "5 March 2025", "Q2 2025"]
        );
    }

    #[test]
    fn test_amounts_emails_phones() {
        let text = "Total $1,200.50 or EUR 300. Contact billing@mercy.org or (555) 123-4567, +44 20 7946 0958.";
        let bundle = extractor().extract(text);
        assert_eq!(bundle.get(EntityCategory::Amounts), ["$1,200.50", "EUR 300"]);
        assert_eq!(bundle.get(EntityCategory::Emails), ["billing@mercy.org"]);
        assert_eq!(
            bundle.get(EntityCategory::Phones),
            ["(555) 123-4567", "+44 20 7946 0958"]
        );
    }

    #[test]
    fn test_iso_date_is_not_a_phone() {
        let bundle = extractor().extract("Collected 2024-01-15 at noon.");
        assert!(bundle.get(EntityCategory::Phones).is_empty());
    }

    #[test]
    fn test_organizations_are_not_names() {
        let bundle = extractor().extract("Referred to Mercy General Hospital by Alice Walker.");
        assert_eq!(bundle.get(EntityCategory::Organizations), ["Mercy General Hospital"]);
        assert_eq!(bundle.get(EntityCategory::Names), ["Alice Walker"]);
    }

    #[test]
    fn test_identifiers() {
        let bundle = extractor().extract("MRN: 00123456. Policy Number: ABX-99812, study NCT01234567. Claim: pending");
        assert_eq!(
            bundle.get(EntityCategory::Identifiers),
            ["00123456", "ABX-99812", "NCT01234567"]
        );
    }

    #[test]
    fn test_duplicates_keep_first_occurrence() {
        let bundle = extractor().extract("Dr. Chen called. Later Dr. Chen wrote to Alice Walker and Dr. Chen.");
        assert_eq!(bundle.get(EntityCategory::Names), ["Dr. Chen", "Alice Walker"]);
    }

    #[test]
    fn test_collapse_prefers_earliest_then_longest() {
        let spans = vec![
            Span::new(5, 9, "Chen"),
            Span::new(0, 8, "Dr. Chen"),
            Span::new(0, 3, "Dr."),
            Span::new(12, 16, "Lee"),
        ];
        assert_eq!(collapse(spans), vec!["Dr. Chen", "Lee"]);
    }

    struct FailingMatcher;

    impl EntityMatcher for FailingMatcher {
        fn category(&self) -> EntityCategory {
            EntityCategory::Phones
        }

        fn find(&self, _text: &str) -> Result<Vec<Span>> {
            Err(Error::EntityExtraction("phone matcher broke".into()))
        }
    }

    struct PanickingMatcher;

    impl EntityMatcher for PanickingMatcher {
        fn category(&self) -> EntityCategory {
            EntityCategory::Emails
        }

        fn find(&self, _text: &str) -> Result<Vec<Span>> {
            panic!("email matcher exploded")
        }
    }

    #[test]
    fn test_failing_matchers_are_isolated() {
        let extractor = extractor()
            .with_matcher(Arc::new(FailingMatcher))
            .with_matcher(Arc::new(PanickingMatcher));
        let bundle = extractor.extract("Dr. Chen, call 555-123-4567 or chen@clinic.org about hypertension.");
        assert_eq!(bundle.partial(), [EntityCategory::Emails, EntityCategory::Phones]);
        assert!(bundle.get(EntityCategory::Phones).is_empty());
        assert!(bundle.get(EntityCategory::Emails).is_empty());
        assert_eq!(bundle.get(EntityCategory::Names), ["Dr. Chen"]);
        assert_eq!(bundle.entity_count(), count_total(&bundle));
    }

    #[test]
    fn test_count_invariant_on_mixed_text() {
        let text = "INVOICE #INV-20931\nAcme Labs Inc, 12 Main Street\nBill to: Jane Roe (jane@roe.net)\n\
                    Amount due: $1,250.00 by 2024-03-31. Call +1 (800) 555-0199.";
        let bundle = extractor().extract(text);
        assert_eq!(bundle.entity_count(), count_total(&bundle));
        assert!(bundle.entity_count() > 0);
    }

    #[test]
    fn test_count_and_uniqueness_across_generated_texts() {
        const FRAGMENTS: &[&str] = &[
            "Patient: John Doe",
            "Physician: Dr. Chen",
            "Acme Labs Inc",
            "Invoice INV-20931",
            "Total due $1,250.00",
            "EUR 300",
            "paid on 2024-03-31",
            "due 03/15/2024",
            "Jan 5, 2024",
            "email jane@roe.net",
            "JANE@ROE.NET",
            "call +1 (800) 555-0199",
            "or 555-0199",
            "12 Main Street",
            "Contact John Doe again",
            "",
            "\n\n",
            "   ",
        ];
        let extractor = extractor();
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        for round in 0..300 {
            let pieces = 1 + round % 12;
            let mut text = String::new();
            for _ in 0..pieces {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                text.push_str(FRAGMENTS[(state >> 33) as usize % FRAGMENTS.len()]);
                text.push_str(if state & 1 == 0 { ". " } else { "\n" });
            }

            let bundle = extractor.extract(&text);
            assert_eq!(bundle.entity_count(), count_total(&bundle), "count mismatch for {:?}", text);
            assert_eq!(bundle.entities().len(), EntityCategory::ALL.len());
            for (category, values) in bundle.entities() {
                let unique: HashSet<&String> = values.iter().collect();
                assert_eq!(unique.len(), values.len(), "duplicate {:?} in {:?}", category, text);
            }
        }
    }
}
