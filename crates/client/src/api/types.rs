//! Wire types for the storefront API.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use atelier_core::{Price, ProductId, Quantity, UserId};

use crate::cart::CartItem;
use crate::session::UserDescriptor;

// =============================================================================
// Auth
// =============================================================================

/// Body of `POST auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST auth/refresh`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Token pair returned by login and refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds, if the server reports one.
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub user: UserDescriptor,
}

impl TokenResponse {
    /// Absolute expiry of the access token, relative to `now`.
    #[must_use]
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
    }
}

// =============================================================================
// Cart
// =============================================================================

/// Body of `GET cart/{userId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCart {
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Lines in display order.
    pub items: Vec<CartItem>,
    /// Server-computed total. Informational only.
    #[serde(default)]
    pub total: Option<Price>,
}

/// Body of `POST cart/items`.
///
/// The idempotency key travels as a header, not in the body, and is reused
/// if the request is retried.
#[derive(Debug, Clone, Serialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: Quantity,
    #[serde(skip)]
    pub idempotency_key: Uuid,
}

impl AddItemRequest {
    /// Build a request with a fresh idempotency key.
    #[must_use]
    pub fn new(product_id: ProductId, quantity: Quantity) -> Self {
        Self {
            product_id,
            quantity,
            idempotency_key: Uuid::new_v4(),
        }
    }
}

/// Body of `PUT cart/items/{productId}`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct UpdateItemRequest {
    pub quantity: Quantity,
}

/// Response to add and update: the line as the server now has it.
///
/// `item` is `None` when the server dropped the line (e.g. stock ran out).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineMutation {
    #[serde(default)]
    pub item: Option<CartItem>,
    /// Server-computed cart total after the mutation. Informational only.
    #[serde(default)]
    pub total: Option<Price>,
}

/// Error body shape the server uses for 4xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(alias = "error")]
    pub message: String,
}
