//! PDF text-layer extraction with lopdf.
//!
//! Pages are read in page order; confidence scales with the share of pages
//! that yield text. Grid-like page text is surfaced as a table.

use docsift_core::{Error, ExtractionMethod, ExtractionResult, RawDocument, Result, StructuredData};
use tracing::{debug, warn};

use crate::extractor::ContentExtractor;
use crate::tabular::{build_table, detect_grid};

const PDF_BASE_CONFIDENCE: f64 = 0.95;

pub struct PdfExtractor;

impl ContentExtractor for PdfExtractor {
    fn name(&self) -> &str {
        "pdf"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::PdfLayout
    }

    fn extract(&self, document: &RawDocument) -> Result<ExtractionResult> {
        if document.bytes.is_empty() {
            return Err(Error::extraction("empty payload"));
        }
        let pdf = lopdf::Document::load_mem(&document.bytes)
            .map_err(|e| Error::extraction(format!("corrupted PDF: {}", e)))?;
        if pdf.is_encrypted() {
            return Err(Error::extraction("encrypted PDF"));
        }

        let pages = pdf.get_pages();
        if pages.is_empty() {
            return Err(Error::extraction("PDF has no pages"));
        }

        let mut page_texts = Vec::with_capacity(pages.len());
        for &number in pages.keys() {
            match pdf.extract_text(&[number]) {
                Ok(text) if !text.trim().is_empty() => page_texts.push(text.trim().to_string()),
                Ok(_) => debug!("PDF {} page {} has no text layer", document.filename, number),
                Err(e) => warn!("PDF {} page {} unreadable: {}", document.filename, number, e),
            }
        }

        if page_texts.is_empty() {
            return Err(Error::extraction(
                "PDF has no text layer; scanned pages need OCR",
            ));
        }

        let confidence = page_confidence(page_texts.len(), pages.len());
        let text = page_texts.join("\n\n");
        let grid = detect_grid(&text);

        let mut result = ExtractionResult::new(text, ExtractionMethod::PdfLayout, confidence)
            .with_metadata("pages", pages.len())
            .with_metadata("pages_with_text", page_texts.len());
        if let Some((header, rows)) = grid.as_deref().and_then(|g| g.split_first()) {
            result = result.with_structured_data(StructuredData::Table(build_table(None, header, rows)));
        }
        Ok(result)
    }
}

/// Base confidence scaled by the fraction of pages that yielded text.
fn page_confidence(pages_with_text: usize, total_pages: usize) -> f64 {
    if total_pages == 0 {
        return 0.0;
    }
    PDF_BASE_CONFIDENCE * pages_with_text as f64 / total_pages as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object, Stream};

    /// A PDF with one page per entry; each line of a page is its own text block.
    fn make_pdf(pages: &[&[&str]]) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");
        let font_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Font".to_vec()),
            "Subtype" => Object::Name(b"Type1".to_vec()),
            "BaseFont" => Object::Name(b"Helvetica".to_vec()),
        });
        let pages_id = doc.new_object_id();

        let mut kids = Vec::new();
        for lines in pages {
            let content: String = lines
                .iter()
                .enumerate()
                .map(|(i, line)| format!("BT /F1 12 Tf 72 {} Td ({}) Tj ET\n", 700 - 20 * i, line))
                .collect();
            let content_id = doc.add_object(Object::Stream(Stream::new(dictionary! {}, content.into_bytes())));
            let page_id = doc.add_object(dictionary! {
                "Type" => Object::Name(b"Page".to_vec()),
                "Parent" => Object::Reference(pages_id),
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => Object::Reference(content_id),
                "Resources" => dictionary! {
                    "Font" => dictionary! {
                        "F1" => Object::Reference(font_id),
                    },
                },
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => Object::Name(b"Pages".to_vec()),
                "Kids" => kids,
                "Count" => Object::Integer(count),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Catalog".to_vec()),
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_pages_joined_in_order() {
        let bytes = make_pdf(&[
            &["Quarterly operations review"],
            &["Second page closes the review"],
        ]);
        let doc = RawDocument::new(bytes, "review.pdf");
        let result = PdfExtractor.extract(&doc).unwrap();

        let first = result.text.find("Quarterly operations review").unwrap();
        let second = result.text.find("Second page closes the review").unwrap();
        assert!(first < second);
        assert!(result.text.contains("\n\n"));
        assert_eq!(result.extraction_confidence, PDF_BASE_CONFIDENCE);
        assert_eq!(result.metadata["pages"], "2");
        assert_eq!(result.metadata["pages_with_text"], "2");
        assert!(result.structured_data.is_none());
    }

    #[test]
    fn test_blank_page_lowers_confidence() {
        let bytes = make_pdf(&[&["Only this page has a text layer"], &[]]);
        let doc = RawDocument::new(bytes, "half.pdf");
        let result = PdfExtractor.extract(&doc).unwrap();

        assert!((result.extraction_confidence - PDF_BASE_CONFIDENCE / 2.0).abs() < 1e-9);
        assert_eq!(result.metadata["pages"], "2");
        assert_eq!(result.metadata["pages_with_text"], "1");
    }

    #[test]
    fn test_grid_page_surfaces_table() {
        let bytes = make_pdf(&[
            &["Purchase summary"],
            &["Item    Qty    Price", "Paper    10    4.50", "Toner    2    61.00"],
        ]);
        let doc = RawDocument::new(bytes, "purchase.pdf");
        let result = PdfExtractor.extract(&doc).unwrap();

        match result.structured_data {
            Some(StructuredData::Table(table)) => {
                assert_eq!(table.headers, vec!["Item", "Qty", "Price"]);
                assert_eq!(table.row_count, 2);
                assert_eq!(table.rows[0]["Item"], "Paper");
                assert_eq!(table.rows[1]["Qty"], 2);
            }
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn test_no_text_layer() {
        let bytes = make_pdf(&[&[]]);
        let doc = RawDocument::new(bytes, "scan.pdf");
        let err = PdfExtractor.extract(&doc).unwrap_err();
        assert!(err.reason().contains("no text layer"));
    }

    #[test]
    fn test_page_confidence() {
        assert_eq!(page_confidence(4, 4), PDF_BASE_CONFIDENCE);
        assert!((page_confidence(1, 2) - PDF_BASE_CONFIDENCE / 2.0).abs() < 1e-9);
        assert_eq!(page_confidence(0, 0), 0.0);
    }

    #[test]
    fn test_corrupted_pdf() {
        let doc = RawDocument::new(b"%PDF-1.4\nthis is not a pdf body".to_vec(), "broken.pdf");
        let err = PdfExtractor.extract(&doc).unwrap_err();
        assert!(matches!(err, Error::ExtractionFailed { .. }));
    }

    #[test]
    fn test_empty_pdf() {
        let doc = RawDocument::new(Vec::new(), "empty.pdf");
        assert_eq!(PdfExtractor.extract(&doc).unwrap_err().reason(), "empty payload");
    }
}
