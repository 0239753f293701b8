//! Table assembly shared by the CSV, spreadsheet, Word and PDF extractors.

use std::collections::{BTreeMap, HashSet};

use docsift_core::{ColumnMetrics, TableData};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};

static THOUSANDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d{1,3}(?:,\d{3})+(?:\.\d+)?$").unwrap());
static GRID_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t+|\s{2,}").unwrap());

/// Typed JSON value for a raw cell: integers and floats become numbers,
/// blanks become null, everything else stays a string.
pub fn cell_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    let numeric = if THOUSANDS.is_match(trimmed) {
        trimmed.replace(',', "")
    } else {
        trimmed.to_string()
    };
    if numeric.bytes().any(|b| b.is_ascii_digit())
        && numeric
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E'))
    {
        if let Ok(int) = numeric.parse::<i64>() {
            return Value::Number(int.into());
        }
        if let Some(number) = numeric.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(number);
        }
    }
    Value::String(trimmed.to_string())
}

/// Blank headers become `column_N`; repeats get a numeric suffix.
pub fn normalize_headers(raw: &[String], width: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    (0..width.max(raw.len()))
        .map(|i| {
            let base = raw
                .get(i)
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| format!("column_{}", i + 1));
            let mut name = base.clone();
            let mut n = 2;
            while !seen.insert(name.clone()) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
            name
        })
        .collect()
}

/// Build a table from a header row and raw data rows. Blank rows are dropped;
/// short rows are padded with nulls.
pub fn build_table(sheet: Option<String>, header: &[String], data: &[Vec<String>]) -> TableData {
    let data: Vec<&Vec<String>> = data
        .iter()
        .filter(|row| row.iter().any(|c| !c.trim().is_empty()))
        .collect();
    let width = data.iter().map(|r| r.len()).max().unwrap_or(0);
    let headers = normalize_headers(header, width);

    let rows: Vec<Map<String, Value>> = data
        .iter()
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| {
                    let value = row.get(i).map(|c| cell_value(c)).unwrap_or(Value::Null);
                    (h.clone(), value)
                })
                .collect()
        })
        .collect();

    let column_metrics = compute_metrics(&headers, &rows);
    TableData {
        sheet,
        headers,
        row_count: rows.len(),
        rows,
        column_metrics,
    }
}

/// Metrics for every column whose non-null cells are all numeric.
fn compute_metrics(headers: &[String], rows: &[Map<String, Value>]) -> BTreeMap<String, ColumnMetrics> {
    let mut metrics = BTreeMap::new();
    for header in headers {
        let mut values = Vec::new();
        let mut numeric = true;
        for row in rows {
            match row.get(header) {
                Some(Value::Null) | None => {}
                Some(Value::Number(n)) => values.extend(n.as_f64()),
                Some(_) => {
                    numeric = false;
                    break;
                }
            }
        }
        if !numeric || values.is_empty() {
            continue;
        }
        let sum: f64 = values.iter().sum();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        metrics.insert(
            header.clone(),
            ColumnMetrics {
                count: values.len(),
                sum,
                mean: sum / values.len() as f64,
                min,
                max,
            },
        );
    }
    metrics
}

/// Render rows as comma-joined lines for the text-based stages.
pub fn render_rows(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Find the first block of at least three consecutive lines that split into
/// the same number (>= 2) of columns on tabs or runs of spaces.
pub fn detect_grid(text: &str) -> Option<Vec<Vec<String>>> {
    let mut block: Vec<Vec<String>> = Vec::new();
    for line in text.lines().chain(std::iter::once("")) {
        let cells: Vec<String> = GRID_SPLIT
            .split(line.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        let continues = cells.len() >= 2 && block.first().map_or(true, |b| b.len() == cells.len());
        if continues {
            block.push(cells);
            continue;
        }
        if block.len() >= 3 {
            return Some(block);
        }
        block.clear();
        if cells.len() >= 2 {
            block.push(cells);
        }
    }
    None
}
