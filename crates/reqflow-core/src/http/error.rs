//! Request failure classification and dispatch
//!
//! Every failed call resolves to exactly one [`ErrorKind`]. The dispatcher
//! routes the failure through the configured handler for its kind, whose
//! result then becomes the outcome of the call.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ClientHooks;
use crate::http::descriptor::RequestDescriptor;
use crate::http::normalizer::Envelope;
use crate::http::transport::TransportError;

/// Classification of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorKind {
    /// The server answered with a non-success business code
    Request,
    /// The request was cancelled, by the registry or explicitly
    Cancel,
    /// Transport failure or a faulting hook
    Error,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Request => write!(f, "REQUEST"),
            ErrorKind::Cancel => write!(f, "CANCEL"),
            ErrorKind::Error => write!(f, "ERROR"),
        }
    }
}

/// What went wrong
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorContent {
    /// Normalized server envelope
    Response(Envelope),
    /// Cancellation reason, the fingerprint of the cancelled request
    Cancelled { reason: String },
    /// Transport or hook fault
    Failure { message: String, status: Option<u16> },
}

/// A failed call with its full context
#[derive(Debug, Clone, PartialEq)]
pub struct RequestError {
    pub kind: ErrorKind,
    pub content: ErrorContent,
    /// The request as it was dispatched, when normalization got that far
    pub request: Option<Box<RequestDescriptor>>,
    /// Set when the server reported an unauthorized code
    pub unauthorized: bool,
}

impl RequestError {
    pub fn from_envelope(envelope: Envelope, request: Option<RequestDescriptor>) -> Self {
        Self {
            kind: ErrorKind::Request,
            content: ErrorContent::Response(envelope),
            request: request.map(Box::new),
            unauthorized: false,
        }
    }

    pub fn unauthorized(envelope: Envelope, request: Option<RequestDescriptor>) -> Self {
        Self {
            unauthorized: true,
            ..Self::from_envelope(envelope, request)
        }
    }

    pub fn cancelled(reason: impl Into<String>, request: Option<RequestDescriptor>) -> Self {
        Self {
            kind: ErrorKind::Cancel,
            content: ErrorContent::Cancelled { reason: reason.into() },
            request: request.map(Box::new),
            unauthorized: false,
        }
    }

    pub fn failure(
        message: impl Into<String>,
        status: Option<u16>,
        request: Option<RequestDescriptor>,
    ) -> Self {
        Self {
            kind: ErrorKind::Error,
            content: ErrorContent::Failure {
                message: message.into(),
                status,
            },
            request: request.map(Box::new),
            unauthorized: false,
        }
    }

    pub fn from_transport(error: TransportError, request: Option<RequestDescriptor>) -> Self {
        let status = error.status();
        Self::failure(error.to_string(), status, request)
    }

    pub fn from_error(error: crate::Error, request: Option<RequestDescriptor>) -> Self {
        Self::failure(error.to_string(), None, request)
    }

    /// The server envelope, for `Request` failures
    pub fn envelope(&self) -> Option<&Envelope> {
        match &self.content {
            ErrorContent::Response(envelope) => Some(envelope),
            _ => None,
        }
    }

    pub fn is_cancel(&self) -> bool {
        self.kind == ErrorKind::Cancel
    }

    fn message(&self) -> String {
        match &self.content {
            ErrorContent::Response(envelope) => {
                format!("code {} - {}", envelope.code, envelope.message())
            }
            ErrorContent::Cancelled { reason } => format!("cancelled ({})", reason),
            ErrorContent::Failure { message, .. } => message.clone(),
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message())?;
        if let Some(request) = &self.request {
            write!(f, " ({} {})", request.method, request.url)?;
        }
        Ok(())
    }
}

impl std::error::Error for RequestError {}

/// Convert RequestError to crate Error
impl From<RequestError> for crate::Error {
    fn from(error: RequestError) -> Self {
        let status_code = match &error.content {
            ErrorContent::Failure { status, .. } => *status,
            _ => None,
        };
        crate::Error::Http {
            message: error.to_string(),
            status_code,
            source: Some(anyhow::Error::new(error)),
        }
    }
}

/// Route a failure through the handler configured for its kind
///
/// Unauthorized failures use `on_unauthorized`; cancellations use `on_cancel`
/// and fall back to `on_error`; everything else uses `on_error`. Without a
/// handler the failure is returned unchanged.
pub fn dispatch_error(error: RequestError, hooks: &ClientHooks) -> Result<Envelope, RequestError> {
    let handler = if error.unauthorized {
        hooks.on_unauthorized.as_ref()
    } else if error.kind == ErrorKind::Cancel {
        hooks.on_cancel.as_ref().or(hooks.on_error.as_ref())
    } else {
        hooks.on_error.as_ref()
    };

    match handler {
        Some(handler) => handler(error),
        None => Err(error),
    }
}
