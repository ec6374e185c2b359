//! Error types for the Promptline domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the pipeline crate wraps
//! them into a single request-level error.

use thiserror::Error;

/// Errors raised by a generation backend, either when the call is made or
/// while its fragment sequence is being drained.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl BackendError {
    /// HTTP status that best describes this failure to a caller.
    ///
    /// Backend-reported statuses pass through when they are error statuses;
    /// everything without a reported status is a generic server error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ApiError { status_code, .. } if (400..600).contains(status_code) => *status_code,
            Self::RateLimited { .. } => 429,
            Self::AuthenticationFailed(_) => 401,
            Self::Network(_) => 502,
            _ => 500,
        }
    }
}

/// A malformed inbound request. Always a client error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Request body has no `messages` field")]
    MissingMessages,

    #[error("`messages` must contain at least one message")]
    EmptyMessages,

    #[error("Invalid request body: {0}")]
    InvalidBody(String),
}

/// Template defects. These are programming errors in a pipeline's wiring and
/// are reported when the pipeline is built, not per request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Template '{template}' references variable '{{{name}}}' which is not supplied")]
    MissingVariable { template: String, name: String },

    #[error("Unterminated placeholder starting at byte {offset}")]
    Unterminated { offset: usize },

    #[error("Empty placeholder at byte {offset}")]
    EmptyPlaceholder { offset: usize },
}
