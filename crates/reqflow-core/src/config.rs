//! Client configuration
//!
//! [`ClientConfig`] holds the serializable, process-wide settings of a client
//! and can be loaded from JSON or from `REQFLOW_*` environment variables.
//! [`ClientHooks`] holds the dynamic parts (token source, interceptors and
//! error handlers). [`RequestOptions`] carries per-call overrides; any field
//! set there wins over the client-wide value, and header maps merge key-wise.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::http::auth::{TokenProvider, DEFAULT_TOKEN_KEY};
use crate::http::descriptor::{
    Body, Method, RequestDescriptor, ResponseType, CANCEL_RULE_HEADER, NEVER_CANCEL_HEADER,
};
use crate::http::error::RequestError;
use crate::http::normalizer::{Envelope, ResAlias};
use crate::http::pending::CancelRule;
use crate::http::transport::TransportResponse;
use crate::{Error, Result};

/// Environment variable prefix used by [`ClientConfig::from_env`]
pub const ENV_PREFIX: &str = "REQFLOW_";

/// A set of business status codes, given as one number or a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CodeSet {
    One(i64),
    Many(Vec<i64>),
}

impl CodeSet {
    /// The codes, falling back to `default` when the set is empty
    pub fn resolve(&self, default: i64) -> Vec<i64> {
        match self {
            CodeSet::One(code) => vec![*code],
            CodeSet::Many(codes) if codes.is_empty() => vec![default],
            CodeSet::Many(codes) => codes.clone(),
        }
    }
}

fn parse_codes(raw: &str, var: &str) -> Result<CodeSet> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|e| Error::Configuration {
                message: format!("{} must be a comma separated list of integers", var),
                source: Some(anyhow::anyhow!(e)),
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(CodeSet::Many)
}

fn parse_flag(raw: &str, var: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::configuration(format!("{} must be a boolean, got '{}'", var, raw))),
    }
}

/// Process-wide client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(rename = "baseURL")]
    pub base_url: String,
    /// Request timeout in milliseconds, enforced by the transport
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,
    /// Prefix for [`crate::HttpClient::fetch_local_file`]
    pub base_path: String,
    /// Deduplicate and cancel in-flight requests by fingerprint
    pub allow_cancel: bool,
    /// When false, empty parameters are stripped before sending
    pub allow_null_value: bool,
    pub success_code: CodeSet,
    pub unauthorized_code: CodeSet,
    /// URLs still dispatched after an unauthorized response
    #[serde(rename = "whiteUrl")]
    pub white_urls: Vec<String>,
    pub alias: ResAlias,
    pub token_key: String,
    /// Default headers sent with every request
    pub headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: 60_000,
            base_path: String::new(),
            allow_cancel: false,
            allow_null_value: true,
            success_code: CodeSet::Many(vec![200]),
            unauthorized_code: CodeSet::Many(vec![401]),
            white_urls: Vec::new(),
            alias: ResAlias::default(),
            token_key: DEFAULT_TOKEN_KEY.to_string(),
            headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load `.env` if present, then overlay `REQFLOW_*` variables on the defaults
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Build from `(name, value)` pairs, reading only prefixed names
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = Self::default();
        for (name, value) in vars {
            let Some(field) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match field {
                "BASE_URL" => config.base_url = value,
                "TIMEOUT_MS" => {
                    config.timeout_ms = value.trim().parse().map_err(|e| Error::Configuration {
                        message: format!("{} must be an integer", name),
                        source: Some(anyhow::anyhow!("{}", e)),
                    })?
                }
                "BASE_PATH" => config.base_path = value,
                "ALLOW_CANCEL" => config.allow_cancel = parse_flag(&value, &name)?,
                "ALLOW_NULL_VALUE" => config.allow_null_value = parse_flag(&value, &name)?,
                "SUCCESS_CODE" => config.success_code = parse_codes(&value, &name)?,
                "UNAUTHORIZED_CODE" => config.unauthorized_code = parse_codes(&value, &name)?,
                "WHITE_URLS" => {
                    config.white_urls = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                }
                "TOKEN_KEY" => config.token_key = value,
                _ => {}
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn success_codes(&self) -> Vec<i64> {
        self.success_code.resolve(200)
    }

    pub fn unauthorized_codes(&self) -> Vec<i64> {
        self.unauthorized_code.resolve(401)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::Validation {
                field: "timeout".to_string(),
                message: "timeout cannot be zero".to_string(),
                expected: Some("a positive number of milliseconds".to_string()),
            });
        }
        if !self.base_url.is_empty() {
            url::Url::parse(&self.base_url).map_err(|e| Error::Configuration {
                message: format!("Invalid base URL: {}", self.base_url),
                source: Some(anyhow::anyhow!(e)),
            })?;
        }
        Ok(())
    }

    pub fn with_allow_cancel(mut self, allow: bool) -> Self {
        self.allow_cancel = allow;
        self
    }

    pub fn with_allow_null_value(mut self, allow: bool) -> Self {
        self.allow_null_value = allow;
        self
    }

    pub fn with_success_code(mut self, codes: CodeSet) -> Self {
        self.success_code = codes;
        self
    }

    pub fn with_unauthorized_code(mut self, codes: CodeSet) -> Self {
        self.unauthorized_code = codes;
        self
    }

    pub fn with_alias(mut self, alias: ResAlias) -> Self {
        self.alias = alias;
        self
    }

    pub fn with_white_urls(mut self, urls: Vec<String>) -> Self {
        self.white_urls = urls;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

pub type BeforeRequest = Arc<dyn Fn(RequestDescriptor) -> Result<RequestDescriptor> + Send + Sync>;
pub type AfterRequest = Arc<
    dyn Fn(TransportResponse, RequestDescriptor) -> Result<(TransportResponse, RequestDescriptor)>
        + Send
        + Sync,
>;
/// An error handler's result becomes the outcome of the failed call
pub type ErrorHandler =
    Arc<dyn Fn(RequestError) -> std::result::Result<Envelope, RequestError> + Send + Sync>;
pub type WhiteUrlProvider = Arc<dyn Fn() -> Vec<String> + Send + Sync>;
pub type AliasProvider = Arc<dyn Fn() -> ResAlias + Send + Sync>;

/// Dynamic client behavior
#[derive(Clone, Default)]
pub struct ClientHooks {
    pub token: Option<Arc<dyn TokenProvider>>,
    /// Overrides [`ClientConfig::white_urls`] when set
    pub white_url: Option<WhiteUrlProvider>,
    /// Overrides [`ClientConfig::alias`] when set
    pub alias: Option<AliasProvider>,
    pub before_request: Option<BeforeRequest>,
    pub after_request: Option<AfterRequest>,
    pub on_unauthorized: Option<ErrorHandler>,
    pub on_cancel: Option<ErrorHandler>,
    pub on_error: Option<ErrorHandler>,
}

impl ClientHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, provider: impl TokenProvider + 'static) -> Self {
        self.token = Some(Arc::new(provider));
        self
    }

    pub fn with_white_url(mut self, f: impl Fn() -> Vec<String> + Send + Sync + 'static) -> Self {
        self.white_url = Some(Arc::new(f));
        self
    }

    pub fn with_alias(mut self, f: impl Fn() -> ResAlias + Send + Sync + 'static) -> Self {
        self.alias = Some(Arc::new(f));
        self
    }

    pub fn with_before_request(
        mut self,
        f: impl Fn(RequestDescriptor) -> Result<RequestDescriptor> + Send + Sync + 'static,
    ) -> Self {
        self.before_request = Some(Arc::new(f));
        self
    }

    pub fn with_after_request(
        mut self,
        f: impl Fn(
                TransportResponse,
                RequestDescriptor,
            ) -> Result<(TransportResponse, RequestDescriptor)>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.after_request = Some(Arc::new(f));
        self
    }

    pub fn on_unauthorized(
        mut self,
        f: impl Fn(RequestError) -> std::result::Result<Envelope, RequestError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_unauthorized = Some(Arc::new(f));
        self
    }

    pub fn on_cancel(
        mut self,
        f: impl Fn(RequestError) -> std::result::Result<Envelope, RequestError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_cancel = Some(Arc::new(f));
        self
    }

    pub fn on_error(
        mut self,
        f: impl Fn(RequestError) -> std::result::Result<Envelope, RequestError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for ClientHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHooks")
            .field("token", &self.token.is_some())
            .field("white_url", &self.white_url.is_some())
            .field("alias", &self.alias.is_some())
            .field("before_request", &self.before_request.is_some())
            .field("after_request", &self.after_request.is_some())
            .field("on_unauthorized", &self.on_unauthorized.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Caller-supplied settings for one call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// May carry a query string, which is merged into `params`
    pub url: String,
    pub method: Method,
    pub params: Map<String, Value>,
    pub body: Option<Body>,
    pub headers: BTreeMap<String, String>,
    pub response_type: Option<ResponseType>,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            ..Default::default()
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Opt this request out of deduplication
    pub fn never_cancel(self) -> Self {
        self.with_header(NEVER_CANCEL_HEADER, "true")
    }

    pub fn with_cancel_rule(self, rule: CancelRule) -> Self {
        let value = match rule {
            CancelRule::Path => "path",
            CancelRule::Method => "method",
            CancelRule::Full => "full",
        };
        self.with_header(CANCEL_RULE_HEADER, value)
    }

    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert!(!config.allow_cancel);
        assert!(config.allow_null_value);
        assert_eq!(config.success_codes(), vec![200]);
        assert_eq!(config.unauthorized_codes(), vec![401]);
        assert_eq!(config.token_key, "x-access-token");
    }

    #[test]
    fn test_code_set_from_number_or_list() {
        let config =
            ClientConfig::from_json_str(r#"{"successCode": 0, "unauthorizedCode": [401, 403]}"#)
                .unwrap();
        assert_eq!(config.success_codes(), vec![0]);
        assert_eq!(config.unauthorized_codes(), vec![401, 403]);
    }

    #[test]
    fn test_empty_code_set_falls_back() {
        let config = ClientConfig::from_json_str(r#"{"successCode": []}"#).unwrap();
        assert_eq!(config.success_codes(), vec![200]);
    }

    #[test]
    fn test_json_wire_names() {
        let config = ClientConfig::from_json_str(
            r#"{
                "baseURL": "https://api.example.com",
                "timeout": 5000,
                "whiteUrl": ["/login"],
                "alias": {"code": "status"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.white_urls, vec!["/login".to_string()]);
        assert_eq!(config.alias.code, "status");
        assert_eq!(config.alias.data, "data");
    }

    #[test]
    fn test_from_vars() {
        let vars = vec![
            ("REQFLOW_BASE_URL".to_string(), "http://localhost:8080".to_string()),
            ("REQFLOW_ALLOW_CANCEL".to_string(), "true".to_string()),
            ("REQFLOW_SUCCESS_CODE".to_string(), "0, 200".to_string()),
            ("REQFLOW_WHITE_URLS".to_string(), "/login,/refresh".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ];
        let config = ClientConfig::from_vars(vars).unwrap();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert!(config.allow_cancel);
        assert_eq!(config.success_codes(), vec![0, 200]);
        assert_eq!(config.white_urls.len(), 2);
    }

    #[test]
    fn test_from_vars_rejects_bad_values() {
        let vars = vec![("REQFLOW_ALLOW_CANCEL".to_string(), "maybe".to_string())];
        assert!(ClientConfig::from_vars(vars).is_err());

        let vars = vec![("REQFLOW_TIMEOUT_MS".to_string(), "0".to_string())];
        assert!(ClientConfig::from_vars(vars).is_err());
    }

    #[test]
    fn test_zero_timeout_is_a_validation_error() {
        let err = ClientConfig::default().with_timeout(Duration::ZERO).validate().unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "timeout"));
    }

    #[test]
    fn test_oversized_timeout_saturates() {
        let config = ClientConfig::default().with_timeout(Duration::MAX);
        assert_eq!(config.timeout_ms, u64::MAX);
        assert_eq!(config.timeout(), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_validate_base_url() {
        assert!(ClientConfig::new("not a url").validate().is_err());
        assert!(ClientConfig::new("https://example.com/api/").validate().is_ok());
    }

    #[test]
    fn test_request_options_directives() {
        let options = RequestOptions::get("/users")
            .never_cancel()
            .with_cancel_rule(CancelRule::Path);
        assert_eq!(options.headers.get(NEVER_CANCEL_HEADER).map(String::as_str), Some("true"));
        assert_eq!(options.headers.get(CANCEL_RULE_HEADER).map(String::as_str), Some("path"));
    }
}
