//! DocSift Analyze — rule-based analysis of extracted text: content signals,
//! classification, entity extraction and summarization.
//!
//! All rules are compiled once from a [`Catalog`](docsift_core::Catalog) into a
//! read-only [`Ruleset`].

pub mod analyzer;
pub mod classifier;
pub mod entities;
pub mod ruleset;
pub mod summarizer;
pub mod text;

pub use analyzer::ContentAnalyzer;
pub use classifier::{Classifier, TypeScore};
pub use entities::{EntityExtractor, EntityMatcher, Span};
pub use ruleset::Ruleset;
pub use summarizer::Summarizer;
