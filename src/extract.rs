//! Pulls raw item lists out of carrier responses.
//!
//! Two payload shapes exist: a plain JSON document with an item array and a
//! total count, and an HTML page where the items are the sole argument of an
//! inline script call such as `parseObject([...]);`.

use regex::Regex;
use serde_json::Value;

use crate::error::ExtractError;
use crate::model::RawItem;

/// Items from one response, plus the declared total for pagination.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<RawItem>,
    pub total_count: Option<u64>,
}

#[derive(Debug, Clone)]
pub enum Extractor {
    Json {
        items_field: String,
        total_field: Option<String>,
    },
    Embedded(EmbeddedArray),
}

impl Extractor {
    pub fn json(items_field: &str, total_field: Option<&str>) -> Self {
        Extractor::Json {
            items_field: items_field.to_string(),
            total_field: total_field.map(str::to_string),
        }
    }

    pub fn embedded(function: &str) -> Self {
        Extractor::Embedded(EmbeddedArray::new(function))
    }

    pub fn extract(&self, body: &str) -> Result<Page, ExtractError> {
        match self {
            Extractor::Json {
                items_field,
                total_field,
            } => extract_json(body, items_field, total_field.as_deref()),
            Extractor::Embedded(embedded) => embedded.extract(body),
        }
    }
}

/// Array literal passed to a named script function.
#[derive(Debug, Clone)]
pub struct EmbeddedArray {
    pattern: Regex,
}

impl EmbeddedArray {
    pub fn new(function: &str) -> Self {
        let pattern = format!(r"(?s){}\(\s*(\[.*?\])\s*\);", regex::escape(function));
        Self {
            pattern: Regex::new(&pattern).expect("escaped call pattern is a valid regex"),
        }
    }

    /// No call in the body means no items, not an error.
    pub fn extract(&self, body: &str) -> Result<Page, ExtractError> {
        let Some(caps) = self.pattern.captures(body) else {
            return Ok(Page::default());
        };
        let values: Vec<Value> = serde_json::from_str(&caps[1])?;
        Ok(Page {
            items: objects(values),
            total_count: None,
        })
    }
}

fn extract_json(body: &str, items_field: &str, total_field: Option<&str>) -> Result<Page, ExtractError> {
    let doc: Value = serde_json::from_str(body)?;

    let items = match doc.get(items_field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(values)) => objects(values.clone()),
        Some(_) => return Err(ExtractError::NotArray(items_field.to_string())),
    };

    let total_count = total_field.and_then(|field| doc.get(field)).and_then(count);

    Ok(Page { items, total_count })
}

fn objects(values: Vec<Value>) -> Vec<RawItem> {
    values
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

fn count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
