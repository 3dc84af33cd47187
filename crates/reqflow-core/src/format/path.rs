//! Nested field lookup over JSON values
//!
//! Paths use dot notation with optional bracket indices, e.g. `dept.id`,
//! `items[0].name` or `items.0.name`. Numeric segments index arrays and are
//! treated as plain keys on objects.

use serde_json::Value;

/// Split a path into its segments
fn segments(path: &str) -> Vec<&str> {
    path.split(['.', '[', ']'])
        .map(|s| s.trim_matches(|c| c == '\'' || c == '"'))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Look up the value at `path` inside `data`
pub fn get_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let parts = segments(path);
    if parts.is_empty() {
        return None;
    }

    let mut current = data;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Look up the value at `path`, treating `null` as absent
pub fn get_present<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    get_path(data, path).filter(|v| !v.is_null())
}
