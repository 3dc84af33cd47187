//! Payload and parameter formatting
//!
//! Pure helpers shared by the request pipeline and the cascade resolver:
//! - Nested path lookup over JSON values
//! - `#{field}` label templates
//! - Parameter ordering, empty-value stripping and precision protection
//! - Pagination query/record aliasing
//! - Option normalization for flat, tree and scalar payloads

pub mod option;
pub mod page;
pub mod params;
pub mod path;
pub mod template;

use serde_json::Value;

pub use option::{format_option, format_option_payload, OptionAlias, OptionEntry, ResponseShape};
pub use page::{format_page_query, format_page_records, PageAlias, PageEnvelope, PageQuery};
pub use params::Params;
pub use path::get_path;

/// Null and the empty string count as "no value"
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Render a value the way it appears inside a label or a joined list
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
