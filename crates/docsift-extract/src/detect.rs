//! Format detection: extension first, then declared MIME type, then magic bytes.

use docsift_core::{DocumentFormat, RawDocument};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Bytes inspected for text-level sniffing (JSON/XML/CSV).
const SNIFF_LEN: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Extension,
    MimeType,
    Magic,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedFormat {
    pub format: DocumentFormat,
    pub source: DetectionSource,
    /// Nothing recognized the input; it is routed to plain text.
    pub low_confidence: bool,
}

impl DetectedFormat {
    pub fn of(document: &RawDocument) -> Self {
        detect_format(&document.filename, document.mime_type.as_deref(), &document.bytes)
    }
}

/// Pick a format for a document. Never fails.
pub fn detect_format(filename: &str, mime_type: Option<&str>, content: &[u8]) -> DetectedFormat {
    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str());

    let detected = if let Some(format) = extension.and_then(format_from_extension) {
        DetectedFormat {
            format,
            source: DetectionSource::Extension,
            low_confidence: false,
        }
    } else if let Some(format) = mime_type.and_then(format_from_mime) {
        DetectedFormat {
            format,
            source: DetectionSource::MimeType,
            low_confidence: false,
        }
    } else if let Some(format) = sniff(content) {
        DetectedFormat {
            format,
            source: DetectionSource::Magic,
            low_confidence: false,
        }
    } else {
        DetectedFormat {
            format: DocumentFormat::PlainText,
            source: DetectionSource::Fallback,
            low_confidence: true,
        }
    };

    debug!(
        "Detected {} for {} via {:?}",
        detected.format, filename, detected.source
    );
    detected
}

pub fn format_from_extension(ext: &str) -> Option<DocumentFormat> {
    let format = match ext.to_lowercase().as_str() {
        "pdf" => DocumentFormat::Pdf,
        "png" | "jpg" | "jpeg" | "gif" | "tif" | "tiff" | "bmp" | "webp" => DocumentFormat::Image,
        "docx" => DocumentFormat::Word,
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => DocumentFormat::Spreadsheet,
        "csv" | "tsv" => DocumentFormat::Csv,
        "txt" | "text" | "md" | "markdown" | "log" => DocumentFormat::PlainText,
        "json" => DocumentFormat::Json,
        "xml" => DocumentFormat::Xml,
        _ => return None,
    };
    Some(format)
}

pub fn format_from_mime(mime: &str) -> Option<DocumentFormat> {
    let essence = mime
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();
    let format = match essence.as_str() {
        "application/pdf" => DocumentFormat::Pdf,
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
            DocumentFormat::Word
        }
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        | "application/vnd.ms-excel"
        | "application/vnd.ms-excel.sheet.macroenabled.12"
        | "application/vnd.oasis.opendocument.spreadsheet" => DocumentFormat::Spreadsheet,
        "text/csv" | "text/tab-separated-values" | "application/csv" => DocumentFormat::Csv,
        "application/json" | "text/json" => DocumentFormat::Json,
        "application/xml" | "text/xml" => DocumentFormat::Xml,
        "text/plain" | "text/markdown" => DocumentFormat::PlainText,
        other if other.starts_with("image/") => DocumentFormat::Image,
        _ => return None,
    };
    Some(format)
}

/// Identify a format from content alone.
pub fn sniff(content: &[u8]) -> Option<DocumentFormat> {
    if content.starts_with(b"%PDF") {
        return Some(DocumentFormat::Pdf);
    }
    if is_image(content) {
        return Some(DocumentFormat::Image);
    }
    if content.starts_with(b"PK\x03\x04") {
        return sniff_zip(content);
    }
    if content.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]) {
        return Some(DocumentFormat::Spreadsheet);
    }
    sniff_text(content)
}

fn is_image(content: &[u8]) -> bool {
    content.starts_with(b"\x89PNG\r\n\x1a\n")
        || content.starts_with(&[0xFF, 0xD8, 0xFF])
        || content.starts_with(b"GIF87a")
        || content.starts_with(b"GIF89a")
        || content.starts_with(b"II*\0")
        || content.starts_with(b"MM\0*")
        || is_bmp(content)
        || (content.len() >= 12 && &content[0..4] == b"RIFF" && &content[8..12] == b"WEBP")
}

/// `BM` alone matches ordinary text; also require a known DIB header size.
fn is_bmp(content: &[u8]) -> bool {
    if content.len() < 26 || !content.starts_with(b"BM") {
        return false;
    }
    let dib_size = u32::from_le_bytes([content[14], content[15], content[16], content[17]]);
    matches!(dib_size, 12 | 40 | 52 | 56 | 64 | 108 | 124)
}

/// ZIP containers are told apart by the part names stored in their headers.
fn sniff_zip(content: &[u8]) -> Option<DocumentFormat> {
    if contains(content, b"word/") {
        Some(DocumentFormat::Word)
    } else if contains(content, b"xl/")
        || contains(content, b"application/vnd.oasis.opendocument.spreadsheet")
    {
        Some(DocumentFormat::Spreadsheet)
    } else {
        None
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn sniff_text(content: &[u8]) -> Option<DocumentFormat> {
    let content = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
    let first = content.iter().find(|b| !b.is_ascii_whitespace())?;
    match first {
        b'{' | b'[' if serde_json::from_slice::<serde::de::IgnoredAny>(content).is_ok() => {
            Some(DocumentFormat::Json)
        }
        b'<' => Some(DocumentFormat::Xml),
        _ if looks_like_csv(&content[..content.len().min(SNIFF_LEN)]) => Some(DocumentFormat::Csv),
        _ => None,
    }
}

/// At least two leading lines, all with the same non-zero delimiter count.
fn looks_like_csv(sample: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(sample) else {
        return false;
    };
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(5)
        .collect();
    // The sample may cut the last line short.
    let lines = if sample.len() == SNIFF_LEN && lines.len() > 2 {
        &lines[..lines.len() - 1]
    } else {
        &lines[..]
    };
    if lines.len() < 2 {
        return false;
    }
    [',', '\t'].iter().any(|&delim| {
        let first = lines[0].matches(delim).count();
        first > 0 && lines.iter().all(|l| l.matches(delim).count() == first)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_wins_over_content() {
        let detected = detect_format("notes.txt", None, b"%PDF-1.7");
        assert_eq!(detected.format, DocumentFormat::PlainText);
        assert_eq!(detected.source, DetectionSource::Extension);
        assert!(!detected.low_confidence);
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        assert_eq!(
            detect_format("SCAN.JPG", None, b"").format,
            DocumentFormat::Image
        );
    }

    #[test]
    fn test_mime_when_extension_unknown() {
        let detected = detect_format("upload.bin", Some("text/csv; charset=utf-8"), b"");
        assert_eq!(detected.format, DocumentFormat::Csv);
        assert_eq!(detected.source, DetectionSource::MimeType);
    }

    #[test]
    fn test_magic_numbers() {
        assert_eq!(sniff(b"%PDF-1.4\n..."), Some(DocumentFormat::Pdf));
        assert_eq!(sniff(b"\x89PNG\r\n\x1a\n...."), Some(DocumentFormat::Image));
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(DocumentFormat::Image));
        assert_eq!(sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(DocumentFormat::Image));
        assert_eq!(
            sniff(b"PK\x03\x04....word/document.xml"),
            Some(DocumentFormat::Word)
        );
        assert_eq!(
            sniff(b"PK\x03\x04....xl/workbook.xml"),
            Some(DocumentFormat::Spreadsheet)
        );
        assert_eq!(sniff(b"PK\x03\x04....other/"), None);
    }

    #[test]
    fn test_bmp_needs_dib_header() {
        let mut bmp = b"BM".to_vec();
        bmp.extend_from_slice(&[0x46, 0, 0, 0, 0, 0, 0, 0, 0x36, 0, 0, 0]);
        bmp.extend_from_slice(&40u32.to_le_bytes());
        bmp.extend_from_slice(&[0u8; 32]);
        assert_eq!(sniff(&bmp), Some(DocumentFormat::Image));

        let text = b"BMW service invoice\nOil change and inspection, total $240.00\n";
        assert_ne!(sniff(text), Some(DocumentFormat::Image));
        assert_ne!(detect_format("invoice", None, text).format, DocumentFormat::Image);
        assert_eq!(sniff(b"BM"), None);
    }

    #[test]
    fn test_text_sniffing() {
        assert_eq!(sniff(b"  {\"a\": 1}"), Some(DocumentFormat::Json));
        assert_eq!(sniff(b"[1] Introduction"), None);
        assert_eq!(sniff(b"<?xml version=\"1.0\"?><a/>"), Some(DocumentFormat::Xml));
        assert_eq!(
            sniff(b"Month,Revenue\nJan,100\nFeb,200\n"),
            Some(DocumentFormat::Csv)
        );
        assert_eq!(sniff(b"Hello, world.\nNo table here"), None);
    }

    #[test]
    fn test_unrecognized_routes_to_plain_text() {
        let detected = detect_format("mystery", None, &[0x00, 0x13, 0x37]);
        assert_eq!(detected.format, DocumentFormat::PlainText);
        assert_eq!(detected.source, DetectionSource::Fallback);
        assert!(detected.low_confidence);
    }

    #[test]
    fn test_empty_input_never_fails() {
        let detected = detect_format("", None, b"");
        assert_eq!(detected.format, DocumentFormat::PlainText);
        assert!(detected.low_confidence);
    }
}
