//! Word (DOCX) extraction: paragraphs in document order, then table cells
//! row-major. The first table is also kept as structured data.

use std::io::{Cursor, Read};

use docsift_core::{Error, ExtractionMethod, ExtractionResult, RawDocument, Result, StructuredData};
use roxmltree::Node;
use tracing::debug;

use crate::extractor::ContentExtractor;
use crate::tabular::build_table;

const DOCX_CONFIDENCE: f64 = 0.98;
const DOCUMENT_PART: &str = "word/document.xml";

pub struct WordExtractor;

impl ContentExtractor for WordExtractor {
    fn name(&self) -> &str {
        "docx"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Docx
    }

    fn extract(&self, document: &RawDocument) -> Result<ExtractionResult> {
        if document.bytes.is_empty() {
            return Err(Error::extraction("empty payload"));
        }
        let xml = read_document_part(&document.bytes)?;
        let doc = roxmltree::Document::parse(&xml)
            .map_err(|e| Error::extraction(format!("malformed Word document XML: {}", e)))?;

        let body = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "body")
            .ok_or_else(|| Error::extraction("Word document has no body"))?;

        let mut paragraphs = Vec::new();
        let mut tables = Vec::new();
        collect_blocks(body, &mut paragraphs, &mut tables);

        let mut sections: Vec<String> = paragraphs
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect();
        let paragraph_count = sections.len();
        for table in &tables {
            for row in table {
                let line = row.join("\t");
                if !line.trim().is_empty() {
                    sections.push(line);
                }
            }
        }

        let text = sections.join("\n");
        if text.trim().is_empty() {
            return Err(Error::extraction("Word document contains no text"));
        }
        debug!(
            "DOCX {}: {} paragraphs, {} tables",
            document.filename,
            paragraph_count,
            tables.len()
        );

        let mut result = ExtractionResult::new(text, ExtractionMethod::Docx, DOCX_CONFIDENCE)
            .with_metadata("paragraphs", paragraph_count)
            .with_metadata("tables", tables.len());
        if let Some((header, rows)) = tables.first().and_then(|t| t.split_first()) {
            if !rows.is_empty() {
                result = result.with_structured_data(StructuredData::Table(build_table(None, header, rows)));
            }
        }
        Ok(result)
    }
}

fn read_document_part(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::extraction(format!("malformed Word container: {}", e)))?;
    let mut part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|_| Error::extraction(format!("Word container is missing {}", DOCUMENT_PART)))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| Error::extraction(format!("unreadable {}: {}", DOCUMENT_PART, e)))?;
    Ok(xml)
}

/// Walk block-level children of the body (descending into content controls).
fn collect_blocks(node: Node<'_, '_>, paragraphs: &mut Vec<String>, tables: &mut Vec<Vec<Vec<String>>>) {
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "p" => paragraphs.push(paragraph_text(child)),
            "tbl" => tables.push(table_rows(child)),
            "sdt" | "sdtContent" => collect_blocks(child, paragraphs, tables),
            _ => {}
        }
    }
}

fn paragraph_text(paragraph: Node<'_, '_>) -> String {
    let mut text = String::new();
    for node in paragraph.descendants().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "t" => text.push_str(node.text().unwrap_or("")),
            "tab" => text.push('\t'),
            "br" | "cr" => text.push('\n'),
            _ => {}
        }
    }
    text
}

fn table_rows(table: Node<'_, '_>) -> Vec<Vec<String>> {
    table
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "tr")
        .map(|row| {
            row.children()
                .filter(|n| n.is_element() && n.tag_name().name() == "tc")
                .map(|cell| {
                    cell.descendants()
                        .filter(|n| n.is_element() && n.tag_name().name() == "p")
                        .map(paragraph_text)
                        .filter(|p| !p.trim().is_empty())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect()
        })
        .collect()
}
