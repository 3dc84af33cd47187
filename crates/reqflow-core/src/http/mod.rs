//! Request pipeline
//!
//! This module provides the request lifecycle:
//! - Request descriptors and header directives
//! - Fingerprinting and the pending-request registry
//! - Token injection
//! - Request normalization from caller options
//! - The transport seam and its reqwest implementation
//! - Response classification and envelope aliasing
//! - Failure classification and handler dispatch

pub mod auth;
pub mod builder;
pub mod client;
pub mod descriptor;
pub mod error;
pub mod normalizer;
pub mod pending;
pub mod transport;

pub use auth::{EnvToken, StaticToken, TokenConfig, TokenProvider};
pub use builder::{PreparedRequest, RequestBuilder};
pub use client::HttpClient;
pub use descriptor::{Body, Directives, Method, RequestDescriptor, ResponseType};
pub use error::{dispatch_error, ErrorContent, ErrorKind, RequestError};
pub use normalizer::{
    normalize_envelope, Disposition, Envelope, PayloadKind, ResAlias, ResponseClassifier,
};
pub use pending::{
    compute_key, CancelRule, CancelSignal, PendingKey, PendingRegistry, PendingTicket,
};
pub use transport::{
    Blob, ReqwestTransport, ResponseBody, Transport, TransportError, TransportResponse,
};
