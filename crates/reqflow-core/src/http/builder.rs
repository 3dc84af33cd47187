//! Request normalization
//!
//! Turns caller-supplied [`RequestOptions`] into a concrete
//! [`RequestDescriptor`]: merged headers, query string folded into sorted
//! parameters, optional empty-value stripping, default content type, token
//! header, pending-registry bookkeeping and finally the caller's pre-hook.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::{ClientConfig, ClientHooks, RequestOptions};
use crate::format::params;
use crate::http::auth::TokenConfig;
use crate::http::descriptor::{
    find_header, take_header, Directives, RequestDescriptor, JSON_CONTENT_TYPE,
};
use crate::http::pending::{CancelSignal, PendingKey, PendingRegistry};
use crate::Result;

/// A normalized request plus the cancellation signal of its registry slot
#[derive(Debug)]
pub struct PreparedRequest {
    pub descriptor: RequestDescriptor,
    pub signal: Option<CancelSignal>,
}

/// Split a URL into its path and the parameters of its query string
pub fn split_url(url: &str) -> (String, Map<String, Value>) {
    match url.split_once('?') {
        Some((path, query)) => {
            let params = url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                .collect();
            (path.to_string(), params)
        }
        None => (url.to_string(), Map::new()),
    }
}

/// Builds concrete requests against one client configuration
#[derive(Debug, Clone, Copy)]
pub struct RequestBuilder<'a> {
    config: &'a ClientConfig,
    hooks: &'a ClientHooks,
    registry: &'a PendingRegistry,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(
        config: &'a ClientConfig,
        hooks: &'a ClientHooks,
        registry: &'a PendingRegistry,
    ) -> Self {
        Self {
            config,
            hooks,
            registry,
        }
    }

    /// URLs allowed through while the session is unauthorized
    fn white_urls(&self) -> Vec<String> {
        match &self.hooks.white_url {
            Some(provider) => provider(),
            None => self.config.white_urls.clone(),
        }
    }

    /// Merge options over the client configuration, without registry effects
    pub fn descriptor(&self, options: RequestOptions) -> RequestDescriptor {
        let mut headers = self.config.headers.clone();
        for (key, value) in options.headers {
            take_header(&mut headers, &key);
            headers.insert(key, value);
        }
        let directives = Directives::extract(&mut headers);

        let (path, mut merged) = split_url(&options.url);
        merged.extend(options.params);
        let mut params = params::sort(merged);
        if !self.config.allow_null_value {
            params = params::format(params);
        }

        if find_header(&headers, "Content-Type").is_none() {
            headers.insert("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string());
        }

        match &self.hooks.token {
            Some(provider) => TokenConfig {
                key: self.config.token_key.clone(),
                provider: provider.clone(),
            }
            .apply(&mut headers),
            None => {
                take_header(&mut headers, &self.config.token_key);
            }
        }

        RequestDescriptor {
            url: path,
            method: options.method,
            params,
            body: options.body,
            headers,
            directives,
            response_type: options.response_type.unwrap_or_default(),
            timeout: options.timeout.or(Some(self.config.timeout())),
            ticket: None,
        }
    }

    /// Build a request ready for dispatch
    ///
    /// `unauthorized` reports whether the last classified response was
    /// unauthorized. Fails only when the pre-hook fails.
    pub fn build(&self, options: RequestOptions, unauthorized: bool) -> Result<PreparedRequest> {
        let raw_url = options.url.clone();
        let mut descriptor = self.descriptor(options);
        let key = PendingKey::of(&descriptor);

        if unauthorized {
            let white = self.white_urls();
            if !white.iter().any(|w| *w == raw_url || *w == descriptor.url) {
                warn!(url = %descriptor.url, "session unauthorized, cancelling pending request");
                self.registry.cancel_and_clear(&key);
            }
        }

        let mut signal = None;
        if self.config.allow_cancel && !descriptor.directives.never_cancel {
            let (ticket, s) = self.registry.supersede(&key);
            descriptor.ticket = Some(ticket);
            signal = Some(s);
        }

        if let Some(hook) = &self.hooks.before_request {
            let ticket = descriptor.ticket.clone();
            descriptor = match hook(descriptor) {
                Ok(d) => d,
                Err(e) => {
                    if let Some(ticket) = &ticket {
                        self.registry.release(ticket);
                    }
                    return Err(e);
                }
            };
            // The hook may not hand the slot to another request
            descriptor.ticket = ticket;
        }

        debug!(method = %descriptor.method, url = %descriptor.url, key = %key, "request prepared");
        Ok(PreparedRequest { descriptor, signal })
    }
}
