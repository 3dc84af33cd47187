//! Transport seam between the request pipeline and the network
//!
//! The pipeline only needs "send this descriptor, give me status and body".
//! [`ReqwestTransport`] provides that over reqwest; tests substitute their own
//! [`Transport`] implementations.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client as ReqwestClient;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::format::display_value;
use crate::http::descriptor::{Body, RequestDescriptor, ResponseType};

/// Binary response payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Blob {
    pub fn new(content_type: Option<&str>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.map(str::to_string),
            bytes: bytes.into(),
        }
    }

    /// Whether the blob declares a JSON content type
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("application/json"))
    }
}

/// Response body as read by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Blob(Blob),
}

/// A completed HTTP exchange
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: ResponseBody,
}

impl TransportResponse {
    /// A 200 response carrying JSON
    pub fn json(body: Value) -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: ResponseBody::Json(body),
        }
    }

    /// A 200 response carrying a blob
    pub fn blob(blob: Blob) -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: ResponseBody::Blob(blob),
        }
    }
}

/// Transport-level failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    Build(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Executes normalized requests
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> Result<TransportResponse, TransportError>;
}

/// Flatten parameters into query pairs; arrays repeat their key
pub fn query_pairs(params: &crate::format::Params) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params {
        match value {
            Value::Array(items) => {
                pairs.extend(items.iter().map(|item| (key.clone(), display_value(item))));
            }
            other => pairs.push((key.clone(), display_value(other))),
        }
    }
    pairs
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: ReqwestClient,
    base_url: String,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport from the client configuration
    pub fn new(config: &ClientConfig) -> crate::Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| crate::Error::HttpRequest {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            timeout: config.timeout(),
        })
    }

    /// Join the base URL and a request path
    fn build_url(&self, path: &str) -> Result<url::Url, TransportError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return url::Url::parse(path)
                .map_err(|e| TransportError::Build(format!("{}: {}", path, e)));
        }
        let joined = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url::Url::parse(&joined).map_err(|e| TransportError::Build(format!("{}: {}", joined, e)))
    }

    /// Build the reqwest request for a descriptor
    pub fn build_request(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<reqwest::Request, TransportError> {
        let url = self.build_url(&descriptor.url)?;
        let mut builder = self
            .client
            .request(descriptor.method.into(), url)
            .timeout(descriptor.timeout.unwrap_or(self.timeout));

        if !descriptor.params.is_empty() {
            builder = builder.query(&query_pairs(&descriptor.params));
        }

        match &descriptor.body {
            Some(Body::Json(value)) => builder = builder.json(value),
            Some(Body::Form(fields)) => builder = builder.form(&query_pairs(fields)),
            None => {}
        }

        let mut request = builder.build().map_err(|e| TransportError::Build(e.to_string()))?;

        for (key, value) in &descriptor.headers {
            match (HeaderName::from_bytes(key.as_bytes()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    // Form bodies carry their own content type
                    if name == CONTENT_TYPE && matches!(descriptor.body, Some(Body::Form(_))) {
                        continue;
                    }
                    request.headers_mut().insert(name, value);
                }
                _ => warn!(header = %key, "skipping invalid header"),
            }
        }

        Ok(request)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<TransportResponse, TransportError> {
        let request = self.build_request(descriptor)?;
        debug!(method = %descriptor.method, url = %request.url(), "sending request");

        let response = self.client.execute(request).await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(descriptor.timeout.unwrap_or(self.timeout))
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let content_type = headers.get(CONTENT_TYPE.as_str()).cloned();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let body = match descriptor.response_type {
            ResponseType::Blob => ResponseBody::Blob(Blob {
                content_type,
                bytes: bytes.to_vec(),
            }),
            ResponseType::Json if bytes.is_empty() => ResponseBody::Json(Value::Null),
            ResponseType::Json => ResponseBody::Json(
                serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))?,
            ),
        };

        Ok(TransportResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}
