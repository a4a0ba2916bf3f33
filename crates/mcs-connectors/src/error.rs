//! Transport error taxonomy.

use thiserror::Error;

/// Errors surfaced by the transport layer.
///
/// These are the terminal outcomes of a request after retry handling;
/// retryable conditions only show up here once attempts are exhausted.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("retries exhausted: {0}")]
    RetriesExhausted(String),

    #[error("request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request canceled")]
    Canceled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal transport error: {0}")]
    Internal(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

impl TransportError {
    /// True for errors a caller may retry at a higher level
    /// (network-class failures, not auth or protocol errors).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionFailed(_)
                | TransportError::Timeout(_)
                | TransportError::RateLimited(_)
                | TransportError::RetriesExhausted(_)
        )
    }
}
