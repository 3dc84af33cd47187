//! Cascading option resolution
//!
//! Each [`CascadeNode`] is one level of a chain of dependent lookups. The
//! options returned at level `i` feed their `json` record into the parameter
//! rules of level `i + 1`, depth first, until the nodes run out.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::cascade::rules::{get_request_param_values, ExtractedParams, ParamRule};
use crate::config::RequestOptions;
use crate::format::{OptionAlias, OptionEntry};
use crate::http::descriptor::Method;
use crate::http::error::RequestError;

/// One level of a cascade
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CascadeNode {
    /// Levels without a URL yield no options
    pub url: Option<String>,
    pub method: Method,
    pub params: Vec<ParamRule>,
    pub alias: OptionAlias,
}

impl CascadeNode {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_rule(mut self, rule: ParamRule) -> Self {
        self.params.push(rule);
        self
    }

    pub fn with_alias(mut self, alias: OptionAlias) -> Self {
        self.alias = alias;
        self
    }
}

/// An option together with the options resolved beneath it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeOption {
    #[serde(flatten)]
    pub option: OptionEntry,
    #[serde(default)]
    pub children: Vec<CascadeOption>,
}

/// Something that can fetch one level of options
#[async_trait]
pub trait OptionSource: Send + Sync {
    async fn fetch_options(
        &self,
        options: RequestOptions,
        alias: &OptionAlias,
        unique: bool,
    ) -> Result<Vec<OptionEntry>, RequestError>;
}

type LevelFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<CascadeOption>, RequestError>> + Send + 'a>>;

/// Build the request for one level, or `None` when the branch is pruned
fn level_request(
    node: &CascadeNode,
    url: &str,
    depth: usize,
    record: &Value,
    base: &Map<String, Value>,
) -> Option<RequestOptions> {
    match get_request_param_values(&node.params, record) {
        ExtractedParams::Aborted => {
            debug!(depth, url, "required parameter missing, branch pruned");
            None
        }
        ExtractedParams::Mapping(resolved) => {
            let mut params = base.clone();
            params.extend(resolved);
            let mut options = RequestOptions::new(node.method, url);
            if !node.method.is_get() {
                options = options.with_json(Value::Object(params.clone()));
            }
            Some(options.with_params(params))
        }
        ExtractedParams::Whole(_) if node.method.is_get() => {
            warn!(depth, url, "whole-value parameters cannot be sent as a query, branch pruned");
            None
        }
        ExtractedParams::Whole(value) => {
            Some(RequestOptions::new(node.method, url).with_json(value))
        }
    }
}

fn resolve_level<'a, S>(
    source: &'a S,
    nodes: &'a [CascadeNode],
    depth: usize,
    record: Value,
    base: &'a Map<String, Value>,
    unique: bool,
) -> LevelFuture<'a>
where
    S: OptionSource + ?Sized,
{
    Box::pin(async move {
        let Some(node) = nodes.get(depth) else {
            return Ok(Vec::new());
        };
        let Some(url) = node.url.as_deref().filter(|u| !u.is_empty()) else {
            return Ok(Vec::new());
        };
        let Some(request) = level_request(node, url, depth, &record, base) else {
            return Ok(Vec::new());
        };

        let entries = source.fetch_options(request, &node.alias, unique).await?;
        debug!(depth, url, count = entries.len(), "cascade level resolved");

        let mut resolved = Vec::with_capacity(entries.len());
        for option in entries {
            let parent = option.json.clone();
            let children = resolve_level(source, nodes, depth + 1, parent, base, unique).await?;
            resolved.push(CascadeOption { option, children });
        }
        Ok(resolved)
    })
}

/// Resolve a whole cascade
///
/// The first level extracts its parameters from `params` itself; deeper
/// levels extract from the parent option's `json`. `params` is sent with
/// every level, with extracted values taking precedence. Levels are fetched
/// one at a time, each awaiting its parent.
pub async fn resolve_cascade<S>(
    source: &S,
    nodes: &[CascadeNode],
    params: Map<String, Value>,
    unique: bool,
) -> Result<Vec<CascadeOption>, RequestError>
where
    S: OptionSource + ?Sized,
{
    if nodes.is_empty() {
        return Ok(Vec::new());
    }
    let record = Value::Object(params.clone());
    resolve_level(source, nodes, 0, record, &params, unique).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::rules::ParamSource;
    use crate::format::format_option;
    use crate::http::descriptor::Body;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves options per URL and records every request
    #[derive(Default)]
    struct StubSource {
        responses: Vec<(String, Value)>,
        seen: Mutex<Vec<RequestOptions>>,
    }

    impl StubSource {
        fn with(mut self, url: &str, payload: Value) -> Self {
            self.responses.push((url.to_string(), payload));
            self
        }

        fn seen(&self) -> Vec<RequestOptions> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OptionSource for StubSource {
        async fn fetch_options(
            &self,
            options: RequestOptions,
            alias: &OptionAlias,
            unique: bool,
        ) -> Result<Vec<OptionEntry>, RequestError> {
            let key = match options.params.get("parent") {
                Some(parent) => format!("{}?{}", options.url, parent),
                None => options.url.clone(),
            };
            self.seen.lock().unwrap().push(options);
            match self.responses.iter().find(|(url, _)| *url == key) {
                Some((_, Value::Array(items))) => Ok(format_option(items, alias, unique)),
                _ => Err(RequestError::failure("not found", Some(404), None)),
            }
        }
    }

    fn region_nodes() -> Vec<CascadeNode> {
        vec![
            CascadeNode::new("/provinces"),
            CascadeNode::new("/cities")
                .with_rule(ParamRule::new("parent", vec![ParamSource::path("value")]).required()),
        ]
    }

    #[tokio::test]
    async fn test_two_level_cascade() {
        let source = StubSource::default()
            .with("/provinces", json!([{"label": "A", "value": 1}, {"label": "B", "value": 2}]))
            .with("/cities?1", json!([{"label": "A1", "value": 11}]))
            .with("/cities?2", json!([]));

        let tree = resolve_cascade(&source, &region_nodes(), Map::new(), true).await.unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].option.label, "A1");
        assert!(tree[0].children[0].children.is_empty());
        assert!(tree[1].children.is_empty());
        assert_eq!(source.seen().len(), 3);
    }

    #[tokio::test]
    async fn test_required_rule_prunes_only_its_branch() {
        let source = StubSource::default()
            .with("/provinces", json!([{"label": "A", "value": 1}, {"label": "B", "value": ""}]))
            .with("/cities?1", json!([{"label": "A1", "value": 11}]));

        let tree = resolve_cascade(&source, &region_nodes(), Map::new(), true).await.unwrap();
        assert_eq!(tree[0].children.len(), 1);
        assert!(tree[1].children.is_empty());
        assert_eq!(source.seen().len(), 2);
    }

    #[tokio::test]
    async fn test_base_params_do_not_override_extracted() {
        let source = StubSource::default()
            .with("/provinces?0", json!([{"label": "A", "value": 1}]))
            .with("/cities?1", json!([]));
        let base = Map::from_iter([
            ("parent".to_string(), json!(0)),
            ("lang".to_string(), json!("en")),
        ]);
        let nodes = vec![
            CascadeNode::new("/provinces"),
            CascadeNode::new("/cities")
                .with_rule(ParamRule::new("parent", vec![ParamSource::path("value")])),
        ];

        // Level 0 extracts nothing, so the base "parent" reaches it untouched
        resolve_cascade(&source, &nodes, base, false).await.unwrap();

        let seen = source.seen();
        assert_eq!(seen[1].params.get("parent"), Some(&json!(1)));
        assert_eq!(seen[1].params.get("lang"), Some(&json!("en")));
    }

    #[tokio::test]
    async fn test_missing_url_yields_empty_subtree() {
        let source = StubSource::default().with("/provinces", json!([{"label": "A", "value": 1}]));
        let nodes = vec![CascadeNode::new("/provinces"), CascadeNode::default()];
        let tree = resolve_cascade(&source, &nodes, Map::new(), true).await.unwrap();
        assert_eq!(tree.len(), 1);
        assert!(tree[0].children.is_empty());
    }

    #[tokio::test]
    async fn test_whole_value_sent_as_body_for_post() {
        let source = StubSource::default()
            .with("/provinces", json!([{"label": "A", "value": 1}]))
            .with("/cities", json!([]));
        let nodes = vec![
            CascadeNode::new("/provinces"),
            CascadeNode::new("/cities")
                .with_method(Method::Post)
                .with_rule(ParamRule::new("ids", vec![ParamSource::path("value")]).to_value()),
        ];
        resolve_cascade(&source, &nodes, Map::new(), true).await.unwrap();
        assert_eq!(source.seen()[1].body, Some(Body::Json(json!(1))));
    }

    #[tokio::test]
    async fn test_post_level_sends_params_as_query_and_body() {
        let source = StubSource::default()
            .with("/provinces", json!([{"label": "A", "value": 1}]))
            .with("/cities?1", json!([]));
        let nodes = vec![
            CascadeNode::new("/provinces"),
            CascadeNode::new("/cities")
                .with_method(Method::Post)
                .with_rule(ParamRule::new("parent", vec![ParamSource::path("value")])),
        ];
        resolve_cascade(&source, &nodes, Map::new(), true).await.unwrap();

        let seen = source.seen();
        assert_eq!(seen[1].params.get("parent"), Some(&json!(1)));
        assert_eq!(seen[1].body, Some(Body::Json(json!({"parent": 1}))));
    }

    #[tokio::test]
    async fn test_whole_value_prunes_get_level() {
        let source = StubSource::default().with("/provinces", json!([{"label": "A", "value": 1}]));
        let nodes = vec![
            CascadeNode::new("/provinces"),
            CascadeNode::new("/cities")
                .with_rule(ParamRule::new("ids", vec![ParamSource::path("value")]).to_value()),
        ];
        let tree = resolve_cascade(&source, &nodes, Map::new(), true).await.unwrap();
        assert!(tree[0].children.is_empty());
        assert_eq!(source.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates() {
        let source = StubSource::default().with("/provinces", json!([{"label": "A", "value": 9}]));
        let err = resolve_cascade(&source, &region_nodes(), Map::new(), true).await.unwrap_err();
        assert_eq!(err.to_string(), "[ERROR] not found");
    }

    #[test]
    fn test_cascade_option_serializes_flat() {
        let option = CascadeOption {
            option: OptionEntry {
                label: "A".into(),
                value: json!(1),
                disabled: false,
                json: json!({}),
            },
            children: Vec::new(),
        };
        assert_eq!(
            serde_json::to_value(&option).unwrap(),
            json!({"label": "A", "value": 1, "disabled": false, "json": {}, "children": []})
        );
    }
}
