//! CLI error type and Sentry reporting.

use thiserror::Error;

use atelier_client::{ApiError, StorageError, StoreError};

/// Errors that end a CLI invocation.
#[derive(Debug, Error)]
pub enum CliError {
    /// The HTTP client could not be built.
    #[error("API client error: {0}")]
    Api(#[from] ApiError),

    /// The data directory could not be opened.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A session or cart operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CliError {
    /// Send errors that point at the server or the network to Sentry.
    /// Input mistakes are not reported.
    pub fn report(&self) {
        let remote = match self {
            Self::Store(err) => err.is_remote() && !matches!(err, StoreError::Auth(_)),
            Self::Api(_) | Self::Storage(_) => true,
        };
        if remote {
            let event_id = sentry::capture_error(self);
            tracing::error!(error = %self, sentry_event_id = %event_id, "Command failed");
        }
    }
}

/// Set the Sentry user context after sign-in.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context on sign-out.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
