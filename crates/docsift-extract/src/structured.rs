//! JSON and XML extraction: parse to a hierarchical value, flatten it to
//! `path: value` lines for the text stages, keep the value as structured data.

use docsift_core::{
    Error, ExtractionMethod, ExtractionResult, HierarchicalFormat, RawDocument, Result,
    StructuredData,
};
use serde_json::{Map, Value};

use crate::extractor::ContentExtractor;
use crate::text::decode_text;

const STRUCTURED_CONFIDENCE: f64 = 0.95;

pub struct JsonExtractor;

impl ContentExtractor for JsonExtractor {
    fn name(&self) -> &str {
        "json"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Structured
    }

    fn extract(&self, document: &RawDocument) -> Result<ExtractionResult> {
        if document.bytes.is_empty() {
            return Err(Error::extraction("empty payload"));
        }
        let decoded = decode_text(&document.bytes);
        let root: Value = serde_json::from_str(&decoded.text)
            .map_err(|e| Error::extraction(format!("invalid JSON: {}", e)))?;
        finish(root, HierarchicalFormat::Json)
    }
}

pub struct XmlExtractor;

impl ContentExtractor for XmlExtractor {
    fn name(&self) -> &str {
        "xml"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Structured
    }

    fn extract(&self, document: &RawDocument) -> Result<ExtractionResult> {
        if document.bytes.is_empty() {
            return Err(Error::extraction("empty payload"));
        }
        let decoded = decode_text(&document.bytes);
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };
        let doc = roxmltree::Document::parse_with_options(&decoded.text, options)
            .map_err(|e| Error::extraction(format!("invalid XML: {}", e)))?;
        let root = doc.root_element();
        let mut wrapper = Map::new();
        wrapper.insert(root.tag_name().name().to_string(), element_to_value(root));
        finish(Value::Object(wrapper), HierarchicalFormat::Xml)
    }
}

fn finish(root: Value, format: HierarchicalFormat) -> Result<ExtractionResult> {
    let mut lines = Vec::new();
    let field_count = flatten(&root, "", &mut lines);
    if lines.is_empty() {
        return Err(Error::extraction("document contains no fields"));
    }
    let result = ExtractionResult::new(lines.join("\n"), ExtractionMethod::Structured, STRUCTURED_CONFIDENCE)
        .with_metadata("format", format_name(format))
        .with_metadata("field_count", field_count)
        .with_structured_data(StructuredData::Hierarchical {
            format,
            root,
            field_count,
        });
    Ok(result)
}

fn format_name(format: HierarchicalFormat) -> &'static str {
    match format {
        HierarchicalFormat::Json => "json",
        HierarchicalFormat::Xml => "xml",
    }
}

/// Elements become objects: attributes as `@name`, children by tag name
/// (repeated tags collect into arrays), mixed text as `#text`. Text-only
/// elements collapse to strings.
fn element_to_value(node: roxmltree::Node<'_, '_>) -> Value {
    let mut map = Map::new();
    for attr in node.attributes() {
        map.insert(format!("@{}", attr.name()), Value::String(attr.value().to_string()));
    }

    let mut text = String::new();
    for child in node.children() {
        if child.is_element() {
            let name = child.tag_name().name().to_string();
            let value = element_to_value(child);
            match map.remove(&name) {
                None => {
                    map.insert(name, value);
                }
                Some(Value::Array(mut items)) => {
                    items.push(value);
                    map.insert(name, Value::Array(items));
                }
                Some(previous) => {
                    map.insert(name, Value::Array(vec![previous, value]));
                }
            }
        } else if child.is_text() {
            text.push_str(child.text().unwrap_or(""));
        }
    }

    let text = text.trim();
    if map.is_empty() {
        return Value::String(text.to_string());
    }
    if !text.is_empty() {
        map.insert("#text".to_string(), Value::String(text.to_string()));
    }
    Value::Object(map)
}

/// Append one `path: value` line per non-null leaf and return the leaf count
/// (nulls included).
fn flatten(value: &Value, path: &str, lines: &mut Vec<String>) -> usize {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, child)| {
                let key = humanize(key);
                let child_path = if path.is_empty() {
                    key
                } else {
                    format!("{}.{}", path, key)
                };
                flatten(child, &child_path, lines)
            })
            .sum(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, child)| flatten(child, &format!("{}[{}]", path, i), lines))
            .sum(),
        Value::Null => 1,
        leaf => {
            let rendered = match leaf {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if path.is_empty() {
                lines.push(rendered);
            } else {
                lines.push(format!("{}: {}", path, rendered));
            }
            1
        }
    }
}

fn humanize(key: &str) -> String {
    key.replace(['_', '-'], " ")
}
