//! Caller-facing error type for store operations.
//!
//! Every public operation on the session and cart stores returns
//! `Result<T, StoreError>`. By the time a caller sees an error the store has
//! already rolled back any optimistic change, so UI code only needs to
//! display it.

use thiserror::Error;

use atelier_core::{EmailError, QuantityError};

use crate::api::ApiError;
use crate::storage::StorageError;

/// Errors surfaced by the session and cart stores.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The caller passed an invalid argument. Rejected before any network call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A local operation referenced a cart line that does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The server could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The server did not answer within the request timeout.
    #[error("Request timed out")]
    Timeout,

    /// The session is invalid and could not be refreshed.
    #[error("Auth error: {0}")]
    Auth(String),

    /// Persisted state failed to decode. It has already been discarded.
    #[error("Corrupt persisted state: {0}")]
    CorruptState(String),

    /// Local storage could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The server answered with an error.
    #[error("Server error: {0}")]
    Server(String),
}

impl StoreError {
    /// Whether the UI should offer a retry for this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout | Self::Server(_))
    }

    /// Whether this error originated on (or on the way to) the server,
    /// as opposed to local validation.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout | Self::Auth(_) | Self::Server(_)
        )
    }
}

impl From<ApiError> for StoreError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Network(msg) => Self::Network(msg),
            ApiError::Timeout => Self::Timeout,
            ApiError::Unauthorized => Self::Auth("session rejected by server".to_string()),
            ApiError::NotFound(what) => Self::NotFound(what),
            ApiError::Rejected(msg) => Self::Validation(msg),
            other => Self::Server(other.to_string()),
        }
    }
}

impl From<QuantityError> for StoreError {
    fn from(err: QuantityError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<EmailError> for StoreError {
    fn from(err: EmailError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Corrupt { .. } => Self::CorruptState(err.to_string()),
            StorageError::Io { .. } | StorageError::Encode(_) => Self::Storage(err.to_string()),
        }
    }
}

/// Result type alias for `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;
