//! Concrete request descriptors
//!
//! A [`RequestDescriptor`] is what the normalizer hands to the transport: a
//! path without query string, sorted parameters, body, headers and the
//! directives that steer deduplication.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::format::Params;
use crate::http::pending::{CancelRule, PendingTicket};

/// Header that opts a request out of deduplication entirely
pub const NEVER_CANCEL_HEADER: &str = "X-Never-Cancel";
/// Header selecting the fingerprint policy
pub const CANCEL_RULE_HEADER: &str = "X-Cancel-Rule";
/// Default content type for outgoing requests
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=utf-8";

/// HTTP method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
        }
    }

    pub fn is_get(&self) -> bool {
        matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            _ => Err(crate::Error::HttpRequest {
                message: format!("Unsupported HTTP method: {}", s),
                source: None,
            }),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
            Method::Head => reqwest::Method::HEAD,
        }
    }
}

/// Request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Body {
    /// JSON body; a string holding serialized JSON is treated as that JSON
    Json(Value),
    /// Form fields
    Form(Params),
}

impl Body {
    /// The body as a JSON value, parsing stringified JSON
    pub fn normalized(&self) -> Value {
        match self {
            Body::Json(Value::String(raw)) => {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
            }
            Body::Json(value) => value.clone(),
            Body::Form(fields) => Value::Object(fields.clone().into_iter().collect()),
        }
    }
}

/// How the transport should read the response body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Json,
    Blob,
}

/// Deduplication directives lifted out of the request headers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directives {
    pub never_cancel: bool,
    pub cancel_rule: CancelRule,
}

impl Directives {
    /// Remove the reserved headers from `headers` and parse them
    pub fn extract(headers: &mut BTreeMap<String, String>) -> Self {
        let never_cancel = take_header(headers, NEVER_CANCEL_HEADER)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false);
        let cancel_rule = take_header(headers, CANCEL_RULE_HEADER)
            .map(|v| CancelRule::parse(&v))
            .unwrap_or_default();
        Self {
            never_cancel,
            cancel_rule,
        }
    }
}

/// Case-insensitive header lookup
pub fn find_header<'a>(
    headers: &'a BTreeMap<String, String>,
    name: &str,
) -> Option<(&'a String, &'a String)> {
    headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// Case-insensitive header removal
pub fn take_header(headers: &mut BTreeMap<String, String>, name: &str) -> Option<String> {
    let key = find_header(headers, name).map(|(k, _)| k.clone())?;
    headers.remove(&key)
}

/// A fully normalized request, ready for the transport
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    /// Path relative to the base URL, without query string
    pub url: String,
    pub method: Method,
    pub params: Params,
    pub body: Option<Body>,
    pub headers: BTreeMap<String, String>,
    pub directives: Directives,
    pub response_type: ResponseType,
    pub timeout: Option<Duration>,
    /// Registry slot held by this request, if it was registered
    pub ticket: Option<PendingTicket>,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            params: Params::new(),
            body: None,
            headers: BTreeMap::new(),
            directives: Directives::default(),
            response_type: ResponseType::default(),
            timeout: None,
            ticket: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name).map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("POST".parse::<Method>().unwrap(), Method::Post);
        assert!("TRACE".parse::<Method>().is_err());
        assert_eq!(reqwest::Method::from(Method::Patch), reqwest::Method::PATCH);
    }

    #[test]
    fn test_directives_are_removed_from_headers() {
        let mut headers = BTreeMap::from([
            ("x-never-cancel".to_string(), "true".to_string()),
            ("X-Cancel-Rule".to_string(), "path".to_string()),
            ("Accept".to_string(), "*/*".to_string()),
        ]);
        let directives = Directives::extract(&mut headers);
        assert!(directives.never_cancel);
        assert_eq!(directives.cancel_rule, CancelRule::Path);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_stringified_body_is_parsed() {
        let body = Body::Json(json!("{\"a\":1}"));
        assert_eq!(body.normalized(), json!({"a": 1}));
        let plain = Body::Json(json!("not json"));
        assert_eq!(plain.normalized(), json!("not json"));
    }
}
