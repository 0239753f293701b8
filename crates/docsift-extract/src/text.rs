//! Plain-text extraction with an encoding fallback chain:
//! BOM → strict UTF-8 → detected legacy encoding → Latin-1.
//!
//! Decoding itself never fails; each later step lowers the confidence. The
//! extractor rejects payloads that decode to mostly control characters.

use chardetng::EncodingDetector;
use docsift_core::{Error, ExtractionMethod, ExtractionResult, RawDocument, Result};
use encoding_rs::{Encoding, UTF_8};
use tracing::debug;

use crate::extractor::ContentExtractor;

const BOM_CONFIDENCE: f64 = 0.99;
const UTF8_CONFIDENCE: f64 = 0.99;
const DETECTED_CONFIDENCE: f64 = 0.85;
const LATIN1_CONFIDENCE: f64 = 0.6;

/// Below this share of printable characters a payload is treated as binary.
const MIN_PRINTABLE_RATIO: f64 = 0.95;

/// Decoded text plus the encoding that produced it.
#[derive(Debug, Clone)]
pub struct DecodedText {
    pub text: String,
    pub encoding: String,
    pub confidence: f64,
    pub printable_ratio: f64,
}

impl DecodedText {
    /// NUL characters or too many control characters.
    pub fn looks_binary(&self) -> bool {
        self.text.contains('\0') || self.printable_ratio < MIN_PRINTABLE_RATIO
    }
}

/// Decode bytes to text, degrading confidence instead of failing.
pub fn decode_text(bytes: &[u8]) -> DecodedText {
    let (text, encoding, base) = if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        (text.into_owned(), encoding.name().to_string(), BOM_CONFIDENCE)
    } else if let Ok(text) = std::str::from_utf8(bytes) {
        (text.to_string(), UTF_8.name().to_string(), UTF8_CONFIDENCE)
    } else {
        let mut detector = EncodingDetector::new();
        detector.feed(bytes, true);
        let guess = detector.guess(None, false);
        let (text, had_errors) = guess.decode_without_bom_handling(bytes);
        if guess != UTF_8 && !had_errors {
            (text.into_owned(), guess.name().to_string(), DETECTED_CONFIDENCE)
        } else {
            let text: String = bytes.iter().map(|&b| b as char).collect();
            (text, "ISO-8859-1".to_string(), LATIN1_CONFIDENCE)
        }
    };

    let text = text.replace("\r\n", "\n");
    let ratio = printable_ratio(&text);
    let confidence = base * ratio;
    debug!("Decoded {} bytes as {} (confidence {:.2})", bytes.len(), encoding, confidence);
    DecodedText {
        text,
        encoding,
        confidence,
        printable_ratio: ratio,
    }
}

/// Share of characters that are neither control characters nor U+FFFD.
/// Line breaks, tabs and form feeds count as printable.
fn printable_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut printable = 0usize;
    for c in text.chars() {
        total += 1;
        if matches!(c, '\n' | '\r' | '\t' | '\x0c') || !(c.is_control() || c == '\u{FFFD}') {
            printable += 1;
        }
    }
    if total == 0 {
        1.0
    } else {
        printable as f64 / total as f64
    }
}

/// Reads any byte payload as text.
pub struct PlainTextExtractor;

impl ContentExtractor for PlainTextExtractor {
    fn name(&self) -> &str {
        "plain_text"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::PlainText
    }

    fn extract(&self, document: &RawDocument) -> Result<ExtractionResult> {
        if document.bytes.is_empty() {
            return Err(Error::extraction("empty payload"));
        }
        let decoded = decode_text(&document.bytes);
        if decoded.looks_binary() {
            debug!(
                "{}: {:.0}% printable as {}, rejecting as binary",
                document.filename,
                decoded.printable_ratio * 100.0,
                decoded.encoding
            );
            return Err(Error::extraction("binary content"));
        }
        let text = decoded.text.trim().to_string();
        if text.is_empty() {
            return Err(Error::extraction("payload contains no text"));
        }
        Ok(
            ExtractionResult::new(text, ExtractionMethod::PlainText, decoded.confidence)
                .with_metadata("encoding", &decoded.encoding),
        )
    }
}
