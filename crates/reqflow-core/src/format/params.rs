//! Query parameter ordering and cleanup

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::is_empty_value;

/// Query parameters, always iterated in ascending key order
pub type Params = BTreeMap<String, Value>;

/// Numbers whose decimal form reaches this many characters travel as strings
pub const PRECISION_DIGITS: usize = 15;

/// Collect an arbitrary JSON mapping into sorted parameters
pub fn sort(object: Map<String, Value>) -> Params {
    object.into_iter().collect()
}

/// Convert a number that would lose precision in transit into a string
pub fn protect_precision(value: Value) -> Value {
    match value {
        Value::Number(n) => {
            let rendered = n.to_string();
            if rendered.len() >= PRECISION_DIGITS {
                Value::String(rendered)
            } else {
                Value::Number(n)
            }
        }
        other => other,
    }
}

/// Drop empty entries and protect long numbers
pub fn format(params: Params) -> Params {
    params
        .into_iter()
        .filter(|(_, value)| !is_empty_value(value))
        .map(|(key, value)| (key, protect_precision(value)))
        .collect()
}
