//! Shared error type across metricount crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid input / malformed body.
    BadRequest,
    /// Request method other than POST.
    MethodNotAllowed,
    /// Internal server error (database, configuration, exhausted retries).
    Internal,
}

impl ClientCode {
    /// String representation used in logs and tests.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ClientCode::Internal => "INTERNAL",
        }
    }

    /// Status code placed in the response envelope.
    pub fn http_status(self) -> u16 {
        match self {
            ClientCode::BadRequest => 400,
            ClientCode::MethodNotAllowed => 405,
            ClientCode::Internal => 500,
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MetricError>;

/// Unified error type used by core and function crates.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("configuration error: {0}")]
    Config(String),
    /// Serializable transaction lost a conflict and was aborted.
    #[error("transaction aborted: {0}")]
    Conflict(String),
    /// Transport blip or database temporarily unreachable.
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("overloaded: {0}")]
    Overloaded(String),
    #[error("scheme error: {0}")]
    SchemeError(String),
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<MetricError>,
    },
    #[error("internal: {0}")]
    Internal(String),
}

impl MetricError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            MetricError::BadRequest(_) => ClientCode::BadRequest,
            MetricError::MethodNotAllowed(_) => ClientCode::MethodNotAllowed,
            MetricError::Config(_)
            | MetricError::Conflict(_)
            | MetricError::Unavailable(_)
            | MetricError::Overloaded(_)
            | MetricError::SchemeError(_)
            | MetricError::RetriesExhausted { .. }
            | MetricError::Internal(_) => ClientCode::Internal,
        }
    }

    /// Whether the retry driver may re-run the whole operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MetricError::Conflict(_) | MetricError::Unavailable(_) | MetricError::Overloaded(_)
        )
    }

    /// Short label for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            MetricError::BadRequest(_) => "bad_request",
            MetricError::MethodNotAllowed(_) => "method_not_allowed",
            MetricError::Config(_) => "config",
            MetricError::Conflict(_) => "conflict",
            MetricError::Unavailable(_) => "unavailable",
            MetricError::Overloaded(_) => "overloaded",
            MetricError::SchemeError(_) => "scheme",
            MetricError::RetriesExhausted { .. } => "retries_exhausted",
            MetricError::Internal(_) => "internal",
        }
    }
}
