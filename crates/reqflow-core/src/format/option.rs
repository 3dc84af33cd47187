//! Option formatting for select boxes, dictionaries and cascaders
//!
//! Raw server payloads arrive as flat lists, trees (elements carrying a
//! children field), or lists of scalars. Every shape is normalized into
//! [`OptionEntry`] values.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::path::get_present;
use super::template::{label_template, render};
use super::display_value;

/// Field names used to read options out of raw records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionAlias {
    /// Field name or `#{field}` template for the label
    pub label: String,
    pub value: String,
    pub json: String,
    pub disabled: String,
    pub children: String,
}

impl Default for OptionAlias {
    fn default() -> Self {
        Self {
            label: "label".to_string(),
            value: "value".to_string(),
            json: "json".to_string(),
            disabled: "disabled".to_string(),
            children: "children".to_string(),
        }
    }
}

/// A normalized option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionEntry {
    pub label: String,
    pub value: Value,
    #[serde(default)]
    pub disabled: bool,
    /// Source record (or the aliased sub-field) kept for chained lookups
    #[serde(default)]
    pub json: Value,
}

/// Shape of a raw option list, detected once per call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Tree,
    Flat,
}

impl ResponseShape {
    /// A list is a tree when any record exposes the children field
    pub fn detect(items: &[Value], children: &str) -> Self {
        let is_tree = items
            .iter()
            .any(|item| item.as_object().is_some_and(|o| o.contains_key(children)));
        if is_tree {
            ResponseShape::Tree
        } else {
            ResponseShape::Flat
        }
    }
}

/// Flatten a tree depth-first, parents before children, dropping the children field
pub fn flatten_tree(items: &[Value], children: &str) -> Vec<Value> {
    let mut out = Vec::new();
    flatten_into(items, children, &mut out);
    out
}

fn flatten_into(items: &[Value], children: &str, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Object(fields) => {
                let mut rest = fields.clone();
                let nested = rest.remove(children);
                out.push(Value::Object(rest));
                if let Some(Value::Array(nested)) = nested {
                    flatten_into(&nested, children, out);
                }
            }
            other => out.push(other.clone()),
        }
    }
}

fn record_option(record: &Value, alias: &OptionAlias, template: &str) -> OptionEntry {
    OptionEntry {
        label: render(template, record),
        value: get_present(record, &alias.value).cloned().unwrap_or(Value::Null),
        disabled: get_present(record, &alias.disabled)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        json: get_present(record, &alias.json)
            .cloned()
            .unwrap_or_else(|| record.clone()),
    }
}

fn scalar_option(scalar: &Value) -> OptionEntry {
    OptionEntry {
        label: display_value(scalar),
        value: scalar.clone(),
        disabled: false,
        json: Value::Object(Map::new()),
    }
}

/// Keep the first option for each distinct value
pub fn unique_by_value(options: Vec<OptionEntry>) -> Vec<OptionEntry> {
    let mut seen: Vec<Value> = Vec::with_capacity(options.len());
    options
        .into_iter()
        .filter(|option| {
            if seen.contains(&option.value) {
                false
            } else {
                seen.push(option.value.clone());
                true
            }
        })
        .collect()
}

/// Convert a raw list into options
pub fn format_option(items: &[Value], alias: &OptionAlias, unique: bool) -> Vec<OptionEntry> {
    let flattened;
    let source = match ResponseShape::detect(items, &alias.children) {
        ResponseShape::Tree => {
            flattened = flatten_tree(items, &alias.children);
            &flattened[..]
        }
        ResponseShape::Flat => items,
    };

    let template = label_template(&alias.label);
    let options: Vec<OptionEntry> = source
        .iter()
        .filter_map(|item| match item {
            Value::Object(_) => Some(record_option(item, alias, &template)),
            Value::String(_) | Value::Number(_) | Value::Bool(_) => Some(scalar_option(item)),
            _ => None,
        })
        .collect();

    if unique {
        unique_by_value(options)
    } else {
        options
    }
}

/// Convert any option payload into options
///
/// Arrays are formatted directly. A record whose values are all arrays is
/// concatenated in key order; any other record becomes `{label: value, value: key}`
/// entries read with the default alias. Everything else yields no options.
pub fn format_option_payload(
    payload: &Value,
    alias: &OptionAlias,
    unique: bool,
) -> Vec<OptionEntry> {
    match payload {
        Value::Array(items) => format_option(items, alias, unique),
        Value::Object(fields) if fields.values().all(Value::is_array) => {
            let items: Vec<Value> = fields
                .values()
                .filter_map(Value::as_array)
                .flatten()
                .cloned()
                .collect();
            format_option(&items, alias, unique)
        }
        Value::Object(fields) => {
            let items: Vec<Value> = fields
                .iter()
                .map(|(key, value)| {
                    let mut entry = Map::new();
                    entry.insert("label".to_string(), value.clone());
                    entry.insert("value".to_string(), Value::String(key.clone()));
                    Value::Object(entry)
                })
                .collect();
            format_option(&items, &OptionAlias::default(), unique)
        }
        _ => Vec::new(),
    }
}
