//! Declarative parameter extraction
//!
//! A list of [`ParamRule`]s describes how to build one cascade level's
//! request parameters out of the record selected at the previous level.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::format::path::get_present;
use crate::format::{display_value, is_empty_value};

/// Conversion applied to a looked-up value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Formatter {
    ToArray,
    ToNumber,
    ToString,
    #[default]
    Identity,
}

fn parse_number(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::from(0);
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
            Value::from(n as i64)
        }
        Ok(n) => Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
        Err(_) => Value::Null,
    }
}

impl Formatter {
    pub fn apply(self, value: Value) -> Value {
        match self {
            Formatter::ToArray => match value {
                Value::Array(items) => Value::Array(items),
                other if is_empty_value(&other) => Value::Array(Vec::new()),
                other => Value::Array(vec![other]),
            },
            Formatter::ToNumber => match value {
                Value::String(raw) => parse_number(&raw),
                other => other,
            },
            Formatter::ToString => match value {
                Value::Array(items) => Value::String(
                    items.iter().map(display_value).collect::<Vec<_>>().join(","),
                ),
                Value::Null => Value::Null,
                other => Value::String(display_value(&other)),
            },
            Formatter::Identity => value,
        }
    }
}

/// One candidate location for a parameter value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParamSource {
    /// Path into the source record; without one the default is used
    pub path: Option<String>,
    pub default_value: Value,
    pub formatter: Formatter,
}

impl ParamSource {
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn constant(value: Value) -> Self {
        Self {
            default_value: value,
            ..Default::default()
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = value;
        self
    }

    pub fn with_formatter(mut self, formatter: Formatter) -> Self {
        self.formatter = formatter;
        self
    }

    fn resolve(&self, record: &Value) -> Value {
        let found = self
            .path
            .as_deref()
            .filter(|p| !p.is_empty())
            .and_then(|p| get_present(record, p))
            .cloned()
            .unwrap_or_else(|| self.default_value.clone());
        self.formatter.apply(found)
    }
}

/// How to produce one request parameter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParamRule {
    pub key: Option<String>,
    /// An empty result aborts the whole extraction
    pub required: bool,
    /// The resolved value replaces the output instead of being stored under `key`
    pub to_value: bool,
    /// Tried in order; the first non-empty value wins
    pub source: Vec<ParamSource>,
}

impl ParamRule {
    pub fn new(key: impl Into<String>, source: Vec<ParamSource>) -> Self {
        Self {
            key: Some(key.into()),
            source,
            ..Default::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn to_value(mut self) -> Self {
        self.to_value = true;
        self
    }

    fn resolve(&self, record: &Value) -> Value {
        let mut value = Value::Null;
        for source in &self.source {
            value = source.resolve(record);
            if !is_empty_value(&value) {
                break;
            }
        }
        value
    }
}

/// Result of running a rule list over a record
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedParams {
    /// Named parameters
    Mapping(Map<String, Value>),
    /// A whole-value rule produced a non-mapping; later rules were not run
    Whole(Value),
    /// A required rule had no usable value
    Aborted,
}

/// Build request parameters from `record` by applying `rules` in order
///
/// Rules without a key or sources are skipped, unless required, in which case
/// the extraction is aborted. A `to_value` rule replaces the accumulated
/// output; when its value is a mapping, later rules keep adding to it,
/// otherwise extraction stops there and returns [`ExtractedParams::Whole`].
pub fn get_request_param_values(rules: &[ParamRule], record: &Value) -> ExtractedParams {
    let mut values = Map::new();

    for (index, rule) in rules.iter().enumerate() {
        let key = rule.key.as_deref().filter(|k| !k.is_empty());
        let Some(key) = key.filter(|_| !rule.source.is_empty()) else {
            if rule.required {
                debug!(index, "required rule has no key or source");
                return ExtractedParams::Aborted;
            }
            continue;
        };

        let value = rule.resolve(record);
        if rule.required && is_empty_value(&value) {
            debug!(key, "required parameter is empty");
            return ExtractedParams::Aborted;
        }

        if rule.to_value {
            match value {
                Value::Object(mapping) => values = mapping,
                other => {
                    let skipped = rules.len() - index - 1;
                    if skipped > 0 {
                        debug!(key, skipped, "whole-value rule ends extraction");
                    }
                    return ExtractedParams::Whole(other);
                }
            }
        } else {
            values.insert(key.to_string(), value);
        }
    }

    ExtractedParams::Mapping(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_formatters() {
        assert_eq!(Formatter::ToArray.apply(json!(1)), json!([1]));
        assert_eq!(Formatter::ToArray.apply(json!([1, 2])), json!([1, 2]));
        assert_eq!(Formatter::ToArray.apply(Value::Null), json!([]));
        assert_eq!(Formatter::ToNumber.apply(json!("42")), json!(42));
        assert_eq!(Formatter::ToNumber.apply(json!("1.5")), json!(1.5));
        assert_eq!(Formatter::ToNumber.apply(json!("abc")), Value::Null);
        assert_eq!(Formatter::ToNumber.apply(json!(7)), json!(7));
        assert_eq!(Formatter::ToString.apply(json!([1, "a"])), json!("1,a"));
        assert_eq!(Formatter::ToString.apply(json!(3)), json!("3"));
        assert_eq!(Formatter::ToString.apply(Value::Null), Value::Null);
    }

    #[test]
    fn test_rules_deserialize_from_camel_case() {
        let rule: ParamRule = serde_json::from_value(json!({
            "key": "deptId",
            "required": true,
            "source": [{"path": "dept.id", "defaultValue": 0, "formatter": "toString"}]
        }))
        .unwrap();
        assert!(rule.required);
        assert!(!rule.to_value);
        assert_eq!(rule.source[0].formatter, Formatter::ToString);
        assert_eq!(rule.source[0].default_value, json!(0));
    }

    #[test]
    fn test_first_non_empty_source_wins() {
        let rules = vec![ParamRule::new(
            "id",
            vec![ParamSource::path("missing"), ParamSource::path("code"), ParamSource::path("id")],
        )];
        let record = json!({"code": "", "id": 9});
        assert_eq!(
            get_request_param_values(&rules, &record),
            ExtractedParams::Mapping(Map::from_iter([("id".to_string(), json!(9))]))
        );
    }

    #[test]
    fn test_default_value_used_when_path_missing() {
        let source = ParamSource::path("kind").with_default(json!("all"));
        let rules = vec![ParamRule::new("type", vec![source])];
        let ExtractedParams::Mapping(values) = get_request_param_values(&rules, &json!({})) else {
            panic!("expected mapping");
        };
        assert_eq!(values["type"], json!("all"));
    }

    #[test]
    fn test_required_empty_aborts() {
        let rules = vec![
            ParamRule::new("a", vec![ParamSource::constant(json!(1))]),
            ParamRule::new("b", vec![ParamSource::path("b")]).required(),
        ];
        assert_eq!(get_request_param_values(&rules, &json!({"b": ""})), ExtractedParams::Aborted);
    }

    #[test]
    fn test_required_without_key_aborts_optional_is_skipped() {
        let optional = ParamRule {
            source: vec![ParamSource::constant(json!(1))],
            ..Default::default()
        };
        let rules = vec![
            optional.clone(),
            ParamRule::new("a", vec![ParamSource::constant(json!(2))]),
        ];
        assert_eq!(
            get_request_param_values(&rules, &json!({})),
            ExtractedParams::Mapping(Map::from_iter([("a".to_string(), json!(2))]))
        );

        let required = ParamRule { required: true, ..optional };
        assert_eq!(get_request_param_values(&[required], &json!({})), ExtractedParams::Aborted);
    }

    #[test]
    fn test_whole_value_mapping_keeps_collecting() {
        let rules = vec![
            ParamRule::new("filter", vec![ParamSource::path("filter")]).to_value(),
            ParamRule::new("page", vec![ParamSource::constant(json!(1))]),
        ];
        let record = json!({"filter": {"status": "open"}});
        assert_eq!(
            get_request_param_values(&rules, &record),
            ExtractedParams::Mapping(Map::from_iter([
                ("status".to_string(), json!("open")),
                ("page".to_string(), json!(1)),
            ]))
        );
    }

    #[test]
    fn test_whole_value_non_mapping_truncates_remaining_rules() {
        let rules = vec![
            ParamRule::new(
                "ids",
                vec![ParamSource::path("ids").with_formatter(Formatter::ToArray)],
            )
            .to_value(),
            ParamRule::new("never", vec![ParamSource::constant(json!(1))]).required(),
        ];
        assert_eq!(
            get_request_param_values(&rules, &json!({"ids": 5})),
            ExtractedParams::Whole(json!([5]))
        );
    }
}
