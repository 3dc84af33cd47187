//! Reqflow Core - Request orchestration over an HTTP transport
//!
//! This crate normalizes outgoing requests, deduplicates in-flight requests
//! by fingerprint, classifies responses and reshapes server envelopes into a
//! uniform, alias-configurable form. It also resolves cascading lookups where
//! each level's parameters come from the previous level's result.
//!
//! # Main Components
//!
//! - **Configuration**: `ClientConfig` loaded from JSON or `REQFLOW_*` variables,
//!   plus `ClientHooks`
//! - **Request Pipeline**: normalization, pending registry, transport, classification
//! - **Formatters**: parameter cleaning, pagination and option shaping
//! - **Cascades**: declarative parameter rules and the cascade resolver
//!
//! # Example
//!
//! ```no_run
//! use reqflow_core::{ClientConfig, ClientHooks, HttpClient, RequestOptions};
//!
//! async fn example() -> reqflow_core::Result<()> {
//!     let config = ClientConfig::new("https://api.example.com").with_allow_cancel(true);
//!     let client = HttpClient::new(config, ClientHooks::default())?;
//!     let envelope = client.request(RequestOptions::get("/users?page=1")).await?;
//!     println!("{}", envelope.message());
//!     Ok(())
//! }
//! ```

pub mod cascade;
pub mod config;
pub mod error;
pub mod format;
pub mod http;

// Re-export main types for convenience
pub use cascade::{CascadeNode, CascadeOption, Formatter, ParamRule, ParamSource};
pub use config::{ClientConfig, ClientHooks, CodeSet, RequestOptions};
pub use error::{Error, Result};
pub use format::{OptionAlias, OptionEntry, PageAlias, PageEnvelope, PageQuery};
pub use http::{
    Blob, CancelRule, Envelope, ErrorKind, HttpClient, Method, PendingRegistry, RequestError,
    ResAlias, Transport, TransportResponse,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_creation() {
        let err = Error::Configuration {
            message: "Test error".to_string(),
            source: None,
        };
        assert!(err.to_string().contains("Test error"));
    }
}
