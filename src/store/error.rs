//! Error types for document store operations

use crate::error::AppError;

/// Result type for document store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors that can occur talking to the document store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connection refused, reset or otherwise unreachable
    #[error("Store unreachable: {0}")]
    Unavailable(String),

    /// Connect or request deadline exceeded
    #[error("Store request timed out: {0}")]
    Timeout(String),

    /// The store answered but refused the request
    #[error("Store rejected request ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    /// The store answered with a body we could not read
    #[error("Failed to decode store response: {0}")]
    Decode(String),
}

impl StoreError {
    /// Unreachable or timed out, as opposed to an answered error
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }

    /// Short label used in metrics
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "unavailable",
            StoreError::Timeout(_) => "timeout",
            StoreError::Rejected { .. } => "rejected",
            StoreError::Decode(_) => "decode",
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout(err.to_string())
        } else if err.is_decode() {
            StoreError::Decode(err.to_string())
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) | StoreError::Timeout(_) => {
                AppError::StoreUnavailable(err.to_string())
            }
            StoreError::Rejected { .. } | StoreError::Decode(_) => {
                AppError::QueryRejected(err.to_string())
            }
        }
    }
}
