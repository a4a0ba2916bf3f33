//! Extraction error taxonomy and per-run status.

use mcs_connectors::TransportError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Classified extraction failures, surfaced in `statistics.json`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    AuthFailed,
    HttpRetryableExhausted,
    HttpNonRetryable,
    ParseError,
    CacheLoadFailed,
    ExtractorTimeout,
    Canceled,
    DataConsistency,
    WriteFailed,
}

impl ErrorKind {
    /// Errors that end an extractor rather than a single item.
    pub fn is_fatal_for_extractor(&self) -> bool {
        matches!(
            self,
            ErrorKind::AuthFailed | ErrorKind::CacheLoadFailed | ErrorKind::Canceled
        )
    }
}

/// One recorded extraction failure.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("{extractor}: {kind:?}: {message}")]
pub struct ExtractionError {
    pub extractor: String,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ExtractionError {
    pub fn new(extractor: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            extractor: extractor.into(),
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Classifies a transport failure into the extraction taxonomy.
    pub fn from_transport(extractor: impl Into<String>, error: &TransportError) -> Self {
        let kind = match error {
            TransportError::AuthFailed(_) => ErrorKind::AuthFailed,
            TransportError::RetriesExhausted(_) | TransportError::RateLimited(_) => {
                ErrorKind::HttpRetryableExhausted
            }
            TransportError::RequestFailed { .. }
            | TransportError::ConnectionFailed(_)
            | TransportError::Timeout(_) => ErrorKind::HttpNonRetryable,
            TransportError::InvalidResponse(_) => ErrorKind::ParseError,
            TransportError::Canceled => ErrorKind::Canceled,
            TransportError::Config(_) | TransportError::Internal(_) => {
                ErrorKind::HttpNonRetryable
            }
        };
        Self::new(extractor, kind, error.to_string())
    }
}

/// Terminal state of one extractor run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtractorStatus {
    /// Completed without transport-level failures.
    Ok,
    /// Completed with some data lost (pagination or enrichment failures).
    Partial,
    /// Interrupted by cancellation; items gathered so far are kept.
    Aborted,
    /// Produced nothing useful.
    Failed,
}
