//! Pagination query and record formatting

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire names for the pagination fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageAlias {
    pub records: String,
    pub total: String,
    pub page_size: String,
    pub page_no: String,
}

impl Default for PageAlias {
    fn default() -> Self {
        Self {
            records: "records".to_string(),
            total: "total".to_string(),
            page_size: "pageSize".to_string(),
            page_no: "pageNo".to_string(),
        }
    }
}

/// Pagination request parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page_size: Option<u64>,
    pub page_no: Option<u64>,
}

impl PageQuery {
    pub fn new(page_no: u64, page_size: u64) -> Self {
        Self {
            page_size: Some(page_size),
            page_no: Some(page_no),
        }
    }
}

/// One page of records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEnvelope<T = Value> {
    pub records: Vec<T>,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_no: Option<u64>,
}

impl<T> Default for PageEnvelope<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            total: 0,
            page_size: None,
            page_no: None,
        }
    }
}

/// Rename the pagination fields that are present to their wire names
pub fn format_page_query(query: &PageQuery, alias: &PageAlias) -> Map<String, Value> {
    let mut out = Map::new();
    if let Some(size) = query.page_size {
        out.insert(alias.page_size.clone(), Value::from(size));
    }
    if let Some(no) = query.page_no {
        out.insert(alias.page_no.clone(), Value::from(no));
    }
    out
}

/// Read an unsigned count that may arrive as a number or a numeric string
fn as_count(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Extract `{records, total}` from a raw page payload
///
/// Malformed or missing fields fall back to an empty list and zero.
pub fn format_page_records(raw: &Value, alias: &PageAlias) -> PageEnvelope<Value> {
    let Some(fields) = raw.as_object() else {
        return PageEnvelope::default();
    };

    PageEnvelope {
        records: fields
            .get(&alias.records)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        total: as_count(fields.get(&alias.total)).unwrap_or(0),
        page_size: as_count(fields.get(&alias.page_size)),
        page_no: as_count(fields.get(&alias.page_no)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_query_only_maps_present_keys() {
        let query = PageQuery { page_size: Some(20), page_no: None };
        let out = format_page_query(&query, &PageAlias::default());
        assert_eq!(Value::Object(out), json!({"pageSize": 20}));
    }

    #[test]
    fn test_query_uses_alias() {
        let alias = PageAlias {
            page_size: "size".into(),
            page_no: "current".into(),
            ..PageAlias::default()
        };
        let out = format_page_query(&PageQuery::new(3, 50), &alias);
        assert_eq!(Value::Object(out), json!({"size": 50, "current": 3}));
    }

    #[test]
    fn test_records_with_alias() {
        let alias = PageAlias {
            records: "list".into(),
            total: "count".into(),
            ..PageAlias::default()
        };
        let page = format_page_records(&json!({"list": [{"id": 1}], "count": "7"}), &alias);
        assert_eq!(page.records, vec![json!({"id": 1})]);
        assert_eq!(page.total, 7);
    }

    #[test]
    fn test_records_never_fail_on_malformed_input() {
        let empty = format_page_records(&json!(null), &PageAlias::default());
        assert_eq!(empty, PageEnvelope::default());
        let malformed = json!({"records": "oops", "total": {}});
        let page = format_page_records(&malformed, &PageAlias::default());
        assert!(page.records.is_empty());
        assert_eq!(page.total, 0);
    }

    proptest! {
        #[test]
        fn prop_page_fields_round_trip(
            no in proptest::option::of(0u64..10_000),
            size in proptest::option::of(0u64..10_000),
            size_key in "[a-z]{1,8}",
            no_key in "[A-Z]{1,8}",
        ) {
            let alias = PageAlias { page_size: size_key, page_no: no_key, ..PageAlias::default() };
            let query = PageQuery { page_size: size, page_no: no };
            let wire = Value::Object(format_page_query(&query, &alias));
            let page = format_page_records(&wire, &alias);
            prop_assert_eq!(page.page_size, size);
            prop_assert_eq!(page.page_no, no);
        }
    }
}
