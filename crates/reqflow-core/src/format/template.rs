//! `#{field}` label templating

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::{display_value, is_empty_value};

const PREFIX: &str = "#{";

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"#\{([^}]+)\}").expect("valid placeholder pattern"))
}

/// Whether the template carries any placeholder syntax
pub fn has_placeholder(template: &str) -> bool {
    template.contains(PREFIX)
}

/// Turn a bare field name into a single-field template
///
/// Templates that already contain placeholder syntax are returned unchanged.
pub fn label_template(alias: &str) -> String {
    if has_placeholder(alias) {
        alias.to_string()
    } else {
        format!("#{{{}}}", alias)
    }
}

/// Substitute top-level fields of `record` into `template`
///
/// Missing or empty fields render as the empty string.
pub fn render(template: &str, record: &Value) -> String {
    let Some(fields) = record.as_object() else {
        return template.to_string();
    };

    placeholder()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            match fields.get(&caps[1]) {
                Some(value) if !is_empty_value(value) => display_value(value),
                _ => String::new(),
            }
        })
        .into_owned()
}
