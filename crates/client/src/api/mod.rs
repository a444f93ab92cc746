//! Storefront API adapter.
//!
//! # Architecture
//!
//! - [`AuthApi`] and [`CartApi`] describe the server contract the stores
//!   depend on; [`HttpApi`] implements both over JSON/HTTP with `reqwest`
//! - The server is the source of truth for prices, availability, and the
//!   association between a user and their cart
//! - Product snapshots are cached in memory via `moka` ([`ProductCatalog`])
//!
//! # Endpoints
//!
//! All paths are relative to the configured API base URL.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | login | `POST auth/login` |
//! | refresh | `POST auth/refresh` |
//! | logout | `POST auth/logout` |
//! | get cart | `GET cart/{userId}` |
//! | add line | `POST cart/items` (with `Idempotency-Key`) |
//! | update line | `PUT cart/items/{productId}` |
//! | remove line | `DELETE cart/items/{productId}` |
//! | clear cart | `DELETE cart` |
//! | product lookup | `GET products/{productId}` |

pub mod catalog;
mod http;
pub mod types;

pub use catalog::ProductCatalog;
pub use http::HttpApi;
pub use types::*;

use std::future::Future;

use secrecy::SecretString;
use thiserror::Error;

use atelier_core::{ProductId, Quantity, UserId};

use crate::cart::ProductSnapshot;

/// Most attempts [`HttpApi`] makes for one request: the first try plus one
/// retry after a transient failure. Each attempt has its own timeout.
pub const MAX_ATTEMPTS: u32 = 2;

/// Errors that can occur when talking to the storefront API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced a response (DNS, connect, reset).
    #[error("Network error: {0}")]
    Network(String),

    /// The request exceeded its timeout.
    #[error("Request timed out")]
    Timeout,

    /// The server rejected the bearer token (401/403).
    #[error("Unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The server refused the request as invalid (400/409/422).
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Rate limited by the server.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Any other non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not match the expected schema.
    #[error("JSON parse error: {0}")]
    Parse(String),

    /// A request URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Whether the failure happened in transit and the request may be
    /// safely repeated (for idempotent requests).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Authentication endpoints.
pub trait AuthApi: Send + Sync + 'static {
    /// Exchange credentials for tokens.
    fn login(
        &self,
        request: &LoginRequest,
    ) -> impl Future<Output = Result<TokenResponse, ApiError>> + Send;

    /// Exchange a refresh token for a new token pair.
    fn refresh(
        &self,
        refresh_token: &SecretString,
    ) -> impl Future<Output = Result<TokenResponse, ApiError>> + Send;

    /// Revoke the session server-side.
    fn logout(
        &self,
        access_token: &SecretString,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// Cart and product endpoints.
pub trait CartApi: Send + Sync + 'static {
    /// Fetch the cart owned by `user_id`.
    fn get_cart(
        &self,
        access_token: &SecretString,
        user_id: &UserId,
    ) -> impl Future<Output = Result<ServerCart, ApiError>> + Send;

    /// Add units of a product. The server sums with any existing line.
    fn add_item(
        &self,
        access_token: &SecretString,
        request: &AddItemRequest,
    ) -> impl Future<Output = Result<LineMutation, ApiError>> + Send;

    /// Set a line's quantity.
    fn update_item(
        &self,
        access_token: &SecretString,
        product_id: &ProductId,
        quantity: Quantity,
    ) -> impl Future<Output = Result<LineMutation, ApiError>> + Send;

    /// Remove a line.
    fn remove_item(
        &self,
        access_token: &SecretString,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Remove every line.
    fn clear_cart(
        &self,
        access_token: &SecretString,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Look up the display snapshot of a product. Public; no token needed.
    fn get_product(
        &self,
        product_id: &ProductId,
    ) -> impl Future<Output = Result<ProductSnapshot, ApiError>> + Send;
}

/// Everything the stores need from a backend.
pub trait Backend: AuthApi + CartApi {}

impl<T: AuthApi + CartApi> Backend for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::NotFound("product oud-royal".to_string());
        assert_eq!(err.to_string(), "Not found: product oud-royal");

        let err = ApiError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 502: bad gateway");
    }

    #[test]
    fn test_transient() {
        assert!(ApiError::Timeout.is_transient());
        assert!(ApiError::Network("reset".to_string()).is_transient());
        assert!(!ApiError::Unauthorized.is_transient());
        assert!(!ApiError::RateLimited(5).is_transient());
    }
}
