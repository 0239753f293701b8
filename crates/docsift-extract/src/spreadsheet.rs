//! Spreadsheet (calamine) and CSV extraction.
//!
//! Both emit a flattened text rendering for the text stages and a structured
//! table: first non-empty row as headers, one keyed record per data row in
//! order, metrics for numeric columns.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use docsift_core::{
    Error, ExtractionMethod, ExtractionResult, RawDocument, Result, StructuredData, TableData,
};
use tracing::{debug, warn};

use crate::extractor::ContentExtractor;
use crate::tabular::{build_table, render_rows};
use crate::text::decode_text;

const SPREADSHEET_CONFIDENCE: f64 = 0.97;

pub struct SpreadsheetExtractor;

impl ContentExtractor for SpreadsheetExtractor {
    fn name(&self) -> &str {
        "spreadsheet"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Spreadsheet
    }

    fn extract(&self, document: &RawDocument) -> Result<ExtractionResult> {
        if document.bytes.is_empty() {
            return Err(Error::extraction("empty payload"));
        }
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(document.bytes.as_slice()))
            .map_err(|e| Error::extraction(format!("unreadable spreadsheet: {}", e)))?;

        let mut sheets = Vec::new();
        let mut sections = Vec::new();
        for name in workbook.sheet_names() {
            let range = match workbook.worksheet_range(&name) {
                Ok(range) => range,
                Err(e) => {
                    warn!("Skipping sheet '{}' in {}: {}", name, document.filename, e);
                    continue;
                }
            };
            let rows: Vec<Vec<String>> = range
                .rows()
                .map(|row| row.iter().map(cell_text).collect())
                .collect();
            let Some((header, data)) = split_header(&rows) else {
                debug!("Sheet '{}' is empty", name);
                continue;
            };
            sections.push(format!("Sheet {}\n{}", name, render_rows(&rows)));
            sheets.push(build_table(Some(name.clone()), header, data));
        }

        if sheets.is_empty() {
            return Err(Error::extraction("spreadsheet contains no data"));
        }
        let sheet_count = sheets.len();
        Ok(
            ExtractionResult::new(sections.join("\n\n"), ExtractionMethod::Spreadsheet, SPREADSHEET_CONFIDENCE)
                .with_metadata("sheets", sheet_count)
                .with_structured_data(tables_to_structured(sheets)),
        )
    }
}

pub struct CsvExtractor;

impl ContentExtractor for CsvExtractor {
    fn name(&self) -> &str {
        "csv"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Spreadsheet
    }

    fn extract(&self, document: &RawDocument) -> Result<ExtractionResult> {
        if document.bytes.is_empty() {
            return Err(Error::extraction("empty payload"));
        }
        let decoded = decode_text(&document.bytes);
        let delimiter = sniff_delimiter(&decoded.text);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(decoded.text.as_bytes());

        let header: Vec<String> = reader
            .headers()
            .map_err(|e| Error::extraction(format!("malformed CSV header: {}", e)))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut data = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| Error::extraction(format!("malformed CSV: {}", e)))?;
            data.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        if header.iter().all(|h| h.is_empty()) {
            return Err(Error::extraction("CSV has no header row"));
        }
        let table = build_table(None, &header, &data);

        let mut all_rows = Vec::with_capacity(data.len() + 1);
        all_rows.push(header);
        all_rows.extend(data);
        let confidence = SPREADSHEET_CONFIDENCE.min(decoded.confidence);
        Ok(
            ExtractionResult::new(render_rows(&all_rows), ExtractionMethod::Spreadsheet, confidence)
                .with_metadata("encoding", &decoded.encoding)
                .with_metadata("delimiter", (delimiter as char).escape_default())
                .with_metadata("rows", table.row_count)
                .with_structured_data(StructuredData::Table(table)),
        )
    }
}

fn tables_to_structured(mut sheets: Vec<TableData>) -> StructuredData {
    if sheets.len() == 1 {
        if let Some(table) = sheets.pop() {
            return StructuredData::Table(table);
        }
    }
    let total_rows = sheets.iter().map(|s| s.row_count).sum();
    StructuredData::Workbook { sheets, total_rows }
}

/// First non-empty row and the rows after it.
fn split_header(rows: &[Vec<String>]) -> Option<(&Vec<String>, &[Vec<String>])> {
    let start = rows
        .iter()
        .position(|row| row.iter().any(|c| !c.trim().is_empty()))?;
    rows[start..].split_first()
}

/// Comma unless the header line has more tabs or semicolons.
fn sniff_delimiter(text: &str) -> u8 {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let commas = first.matches(',').count();
    let tabs = first.matches('\t').count();
    let semicolons = first.matches(';').count();
    if tabs > commas && tabs >= semicolons {
        b'\t'
    } else if semicolons > commas {
        b';'
    } else {
        b','
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR: {:?}", e),
    }
}
