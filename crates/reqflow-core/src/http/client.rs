//! High-level client tying the request pipeline together
//!
//! Every call runs: normalize → register → transport → post-hook →
//! release → classify → reshape or dispatch the failure.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::cascade::{resolve_cascade, CascadeNode, CascadeOption, OptionSource};
use crate::config::{ClientConfig, ClientHooks, RequestOptions};
use crate::format::{
    format_option_payload, format_page_query, format_page_records, OptionAlias, OptionEntry,
    PageAlias, PageEnvelope, PageQuery,
};
use crate::format::params;
use crate::http::builder::{PreparedRequest, RequestBuilder};
use crate::http::descriptor::{Body, Method, RequestDescriptor, ResponseType};
use crate::http::error::{dispatch_error, RequestError};
use crate::http::normalizer::{Disposition, Envelope, ResponseClassifier};
use crate::http::pending::{PendingKey, PendingRegistry};
use crate::http::transport::{Blob, ReqwestTransport, ResponseBody, Transport, TransportResponse};
use crate::Result;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Request client with deduplication, classification and reshaping
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    config: Arc<ClientConfig>,
    hooks: ClientHooks,
    registry: PendingRegistry,
    /// Set by an unauthorized response, cleared by any other classified response
    unauthorized: Arc<AtomicBool>,
}

impl HttpClient {
    /// Create a client sending over reqwest
    pub fn new(config: ClientConfig, hooks: ClientHooks) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(config, hooks, transport))
    }

    /// Create a client over a custom transport
    pub fn with_transport(
        config: ClientConfig,
        hooks: ClientHooks,
        transport: impl Transport + 'static,
    ) -> Self {
        Self {
            transport: Arc::new(transport),
            config: Arc::new(config),
            hooks,
            registry: PendingRegistry::new(),
            unauthorized: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a registry with other clients
    pub fn with_registry(mut self, registry: PendingRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &PendingRegistry {
        &self.registry
    }

    /// Whether the last classified response was unauthorized
    pub fn is_unauthorized(&self) -> bool {
        self.unauthorized.load(Ordering::SeqCst)
    }

    fn classifier(&self) -> ResponseClassifier {
        let alias = match &self.hooks.alias {
            Some(provider) => provider(),
            None => self.config.alias.clone(),
        };
        ResponseClassifier::new(
            alias,
            self.config.success_codes(),
            self.config.unauthorized_codes(),
        )
    }

    /// Send a request and resolve to its normalized envelope
    ///
    /// Failures go through the configured error handlers; a handler's result
    /// becomes the outcome.
    pub async fn request(
        &self,
        options: RequestOptions,
    ) -> std::result::Result<Envelope, RequestError> {
        match self.execute(options).await {
            Ok(envelope) => Ok(envelope),
            Err(error) => {
                debug!(kind = %error.kind, "dispatching request failure");
                dispatch_error(error, &self.hooks)
            }
        }
    }

    async fn execute(
        &self,
        options: RequestOptions,
    ) -> std::result::Result<Envelope, RequestError> {
        let builder = RequestBuilder::new(&self.config, &self.hooks, &self.registry);
        let PreparedRequest { descriptor, signal } = builder
            .build(options, self.is_unauthorized())
            .map_err(|e| RequestError::from_error(e, None))?;

        let sent = match signal {
            Some(signal) => tokio::select! {
                biased;
                reason = signal.cancelled() => Err(reason),
                result = self.transport.send(&descriptor) => Ok(result),
            },
            None => Ok(self.transport.send(&descriptor).await),
        };

        if let Some(ticket) = &descriptor.ticket {
            self.registry.release(ticket);
        }

        let response = match sent {
            Err(reason) => {
                info!(url = %descriptor.url, "request cancelled");
                return Err(RequestError::cancelled(reason, Some(descriptor)));
            }
            Ok(Err(e)) => {
                warn!(url = %descriptor.url, error = %e, "transport failure");
                return Err(RequestError::from_transport(e, Some(descriptor)));
            }
            Ok(Ok(response)) => response,
        };

        let (response, descriptor) = self.after_request(response, descriptor)?;

        let disposition = self
            .classifier()
            .classify(response)
            .map_err(|e| RequestError::from_error(e, Some(descriptor.clone())))?;

        match disposition {
            Disposition::Unauthorized(envelope) => {
                self.unauthorized.store(true, Ordering::SeqCst);
                let cancelled = self.registry.clear_all();
                warn!(
                    url = %descriptor.url,
                    cancelled,
                    "unauthorized response, cleared pending requests"
                );
                Err(RequestError::unauthorized(envelope, Some(descriptor)))
            }
            Disposition::JsonOk(envelope) | Disposition::BlobOk(envelope) => {
                self.unauthorized.store(false, Ordering::SeqCst);
                Ok(envelope)
            }
            Disposition::BlobError(envelope) | Disposition::OtherError(envelope) => {
                self.unauthorized.store(false, Ordering::SeqCst);
                Err(RequestError::from_envelope(envelope, Some(descriptor)))
            }
        }
    }

    fn after_request(
        &self,
        response: TransportResponse,
        descriptor: RequestDescriptor,
    ) -> std::result::Result<(TransportResponse, RequestDescriptor), RequestError> {
        match &self.hooks.after_request {
            Some(hook) => {
                let snapshot = descriptor.clone();
                hook(response, descriptor).map_err(|e| RequestError::from_error(e, Some(snapshot)))
            }
            None => Ok((response, descriptor)),
        }
    }

    async fn request_data<T: DeserializeOwned>(
        &self,
        options: RequestOptions,
    ) -> std::result::Result<T, RequestError> {
        let envelope = self.request(options).await?;
        envelope.into_data().map_err(|e| RequestError::from_error(e, None))
    }

    /// GET with query parameters, deserializing the envelope's data
    pub async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        params: Map<String, Value>,
    ) -> std::result::Result<T, RequestError> {
        self.request_data(RequestOptions::get(url).with_params(params)).await
    }

    /// POST with a JSON body, deserializing the envelope's data
    pub async fn post<T: DeserializeOwned>(
        &self,
        url: &str,
        body: Value,
    ) -> std::result::Result<T, RequestError> {
        self.request_data(RequestOptions::post(url).with_json(body)).await
    }

    /// POST the fields as a form body
    pub async fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        fields: Map<String, Value>,
    ) -> std::result::Result<T, RequestError> {
        let options = RequestOptions::post(url)
            .with_body(Body::Form(params::sort(fields)))
            .with_header("Content-Type", FORM_CONTENT_TYPE);
        self.request_data(options).await
    }

    /// Fetch one page of records
    ///
    /// GET sends page and search fields as the query. Other methods send the
    /// page fields as the query and page plus search fields as the body.
    pub async fn get_page_records(
        &self,
        url: &str,
        search: Map<String, Value>,
        page: &PageQuery,
        method: Method,
        alias: &PageAlias,
    ) -> std::result::Result<PageEnvelope, RequestError> {
        let page_fields = format_page_query(page, alias);
        let mut merged = page_fields.clone();
        merged.extend(search);

        let options = if method.is_get() {
            RequestOptions::new(method, url).with_params(merged)
        } else {
            RequestOptions::new(method, url)
                .with_params(page_fields)
                .with_json(Value::Object(merged))
        };

        let envelope = self.request(options).await?;
        Ok(format_page_records(&envelope.data, alias))
    }

    /// Fetch options for a select box or dictionary
    pub async fn get_options(
        &self,
        url: &str,
        params: Map<String, Value>,
        method: Method,
        alias: &OptionAlias,
        unique: bool,
    ) -> std::result::Result<Vec<OptionEntry>, RequestError> {
        let mut options = RequestOptions::new(method, url);
        if !method.is_get() {
            options = options.with_json(Value::Object(params.clone()));
        }
        self.fetch_options(options.with_params(params), alias, unique).await
    }

    /// Resolve a chain of dependent option lookups
    ///
    /// Issues one request per option per level; keep chains short.
    pub async fn get_cascader_options(
        &self,
        nodes: &[CascadeNode],
        params: Map<String, Value>,
        unique: bool,
    ) -> std::result::Result<Vec<CascadeOption>, RequestError> {
        resolve_cascade(self, nodes, params, unique).await
    }

    /// Force-cancel the pending request matching `options`
    ///
    /// Matches by fingerprint and ignores the never-cancel directive.
    pub fn cancel(&self, options: &RequestOptions) -> bool {
        let builder = RequestBuilder::new(&self.config, &self.hooks, &self.registry);
        let key = PendingKey::of(&builder.descriptor(options.clone()));
        self.registry.cancel_and_clear(&key)
    }

    /// Cancel every pending request
    pub fn destroy(&self) -> usize {
        let cancelled = self.registry.clear_all();
        info!(cancelled, "client destroyed");
        cancelled
    }

    /// Read a file below the configured base path as raw bytes
    ///
    /// Skips hooks, deduplication and envelope classification.
    pub async fn fetch_local_file(&self, path: &str) -> std::result::Result<Blob, RequestError> {
        let url = format!("{}{}", self.config.base_path, path);
        let mut descriptor = RequestDescriptor::new(Method::Get, url);
        descriptor.response_type = ResponseType::Blob;
        descriptor.timeout = Some(self.config.timeout());

        match self.transport.send(&descriptor).await {
            Ok(TransportResponse {
                body: ResponseBody::Blob(blob),
                ..
            }) => Ok(blob),
            Ok(TransportResponse {
                body: ResponseBody::Json(value),
                ..
            }) => Ok(Blob::new(Some("application/json"), value.to_string().into_bytes())),
            Err(e) => Err(RequestError::from_transport(e, Some(descriptor))),
        }
    }
}

#[async_trait]
impl OptionSource for HttpClient {
    async fn fetch_options(
        &self,
        options: RequestOptions,
        alias: &OptionAlias,
        unique: bool,
    ) -> std::result::Result<Vec<OptionEntry>, RequestError> {
        let envelope = self.request(options).await?;
        Ok(format_option_payload(&envelope.data, alias, unique))
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("pending", &self.registry.len())
            .field("unauthorized", &self.is_unauthorized())
            .finish()
    }
}
