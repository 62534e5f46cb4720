//! Error types for IAMGuard
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for IAMGuard operations
///
/// Covers configuration problems, missing authentication, backend and
/// transport failures, and store-level conditions such as a missing or busy
/// session.
#[derive(Error, Debug)]
pub enum IamGuardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No user identity could be resolved from the current claims
    #[error("Authentication required: sign in before calling the backend")]
    AuthenticationRequired,

    /// Identity provider errors (token exchange, malformed tokens)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The backend answered with a non-success status
    #[error("Backend returned {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// Session id is not present in the local session list
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A send is already in flight for this session
    #[error("A message is already being processed for session {0}")]
    SessionBusy(String),

    /// Inference endpoint errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Policy service errors
    #[error("Policy error: {0}")]
    Policy(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl IamGuardError {
    /// Returns `true` when the request never produced an HTTP response
    ///
    /// Connection refusals, timeouts and request build failures count as
    /// transport failures. A backend that answered, even with an error
    /// status, does not.
    pub fn is_transport(&self) -> bool {
        match self {
            IamGuardError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }
}

/// Returns `true` if `err` wraps an [`IamGuardError`] transport failure.
pub fn is_transport_failure(err: &anyhow::Error) -> bool {
    err.downcast_ref::<IamGuardError>()
        .map(IamGuardError::is_transport)
        .unwrap_or(false)
}

/// Result type alias for IAMGuard operations
///
/// Uses `anyhow::Error` so context can be attached while propagating;
/// callers downcast to [`IamGuardError`] to classify failures.
pub type Result<T> = anyhow::Result<T>;
