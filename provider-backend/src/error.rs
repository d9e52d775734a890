//! Error types for the backend connector

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Backend call failures, classified by how callers should react.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Network failure, 5xx or 429. Safe to retry with backoff.
    #[error("Transient backend failure: {0}")]
    Transient(String),

    /// 2xx with a body that does not match the expected shape.
    #[error("Malformed backend response: {0}")]
    Malformed(String),

    /// 4xx. Retrying will not help.
    #[error("Backend rejected request (status {status}): {message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// A host bridge refused the call outright.
    #[error("Bridge error: {0}")]
    Bridge(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Transient and malformed failures count toward a retry threshold.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Transient(_) | ApiError::Malformed(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ApiError::Rejected { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Machine-readable code from a rejection body, e.g. `analysis_failed`.
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Rejected { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Human-readable message without the classification prefix.
    pub fn message(&self) -> &str {
        match self {
            ApiError::Transient(msg) | ApiError::Malformed(msg) | ApiError::Bridge(msg) => msg,
            ApiError::Rejected { message, .. } => message,
        }
    }
}

impl From<BridgeError> for ApiError {
    fn from(error: BridgeError) -> Self {
        if error.is_transport() {
            ApiError::Transient(error.to_string())
        } else {
            ApiError::Bridge(error.to_string())
        }
    }
}
