//! Error taxonomy for indirection calls.
//!
//! # Categories
//! - Configuration: an indirection or terminus cannot be resolved; never retried
//! - Argument: malformed requests, bad class names, authorization denial,
//!   options a verb cannot carry
//! - Validation: raised by a terminus `validate` hook before any work
//! - Http / NotFound: remote failures decoded from a response
//! - Deserialization: a 2xx body the model could not decode
//! - Network: the transport never produced a response
//!
//! Cache read failures never surface here; they are logged and treated as a
//! miss by the router.

use thiserror::Error;

use crate::request::Method;

/// Errors surfaced by indirections and termini.
#[derive(Debug, Error)]
pub enum IndirectorError {
    /// An indirection, terminus or setting could not be resolved.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The caller supplied something the operation cannot accept.
    #[error("{0}")]
    Argument(String),

    /// A remote request was denied by the terminus.
    #[error("Not authorized to call {method} on {key}")]
    Authorization { method: Method, key: String },

    /// A terminus rejected the request before doing any work.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The terminus does not implement the requested capability.
    #[error("Terminus {terminus} for {indirection} does not support {method}")]
    Unsupported {
        indirection: String,
        terminus: String,
        method: Method,
    },

    /// A non-2xx response other than an ignorable 404.
    #[error("Error {code} on SERVER: {message}")]
    Http {
        code: u16,
        message: String,
        issue_kind: Option<String>,
    },

    /// A 404 for a request that asked to fail on it.
    #[error("{method} {path} resulted in 404 with the message: {message}")]
    NotFound {
        method: String,
        path: String,
        message: String,
    },

    /// A response body could not be turned into a model instance.
    #[error("{0}")]
    Deserialization(String),

    /// Connection-level failure; no response was received.
    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IndirectorError {
    /// True for configuration-class failures.
    pub fn is_configuration(&self) -> bool {
        matches!(self, IndirectorError::Configuration(_))
    }

    /// True for argument-class failures, including authorization denial.
    pub fn is_argument(&self) -> bool {
        matches!(
            self,
            IndirectorError::Argument(_) | IndirectorError::Authorization { .. }
        )
    }

    /// True when the transport failed before a response arrived.
    pub fn is_network(&self) -> bool {
        matches!(self, IndirectorError::Network(_))
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            IndirectorError::Http { code, .. } => Some(*code),
            IndirectorError::NotFound { .. } => Some(404),
            _ => None,
        }
    }
}

/// Result type for indirection operations.
pub type Result<T> = std::result::Result<T, IndirectorError>;
