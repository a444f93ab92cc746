//! Cart domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use atelier_core::{CurrencyCode, Price, ProductId, Quantity, UserId};

use crate::error::StoreError;

/// Display data for a product, copied onto cart lines so the cart renders
/// without a second round trip. May go stale; the server re-prices at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub name: String,
    /// Unit price.
    pub price: Price,
    #[serde(default)]
    pub image_url: Option<String>,
    pub slug: String,
}

impl ProductSnapshot {
    /// Turn the snapshot into a cart line.
    #[must_use]
    pub fn into_item(self, quantity: Quantity) -> CartItem {
        CartItem {
            product_id: self.product_id,
            quantity,
            name: self.name,
            price: self.price,
            image_url: self.image_url,
            slug: self.slug,
        }
    }
}

/// One line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub name: String,
    /// Unit price.
    pub price: Price,
    #[serde(default)]
    pub image_url: Option<String>,
    pub slug: String,
}

impl CartItem {
    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price.times(self.quantity)
    }

    /// Copy of this line's product snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot {
            product_id: self.product_id.clone(),
            name: self.name.clone(),
            price: self.price,
            image_url: self.image_url.clone(),
            slug: self.slug.clone(),
        }
    }

    /// Same line with a different quantity.
    #[must_use]
    pub fn with_quantity(&self, quantity: Quantity) -> Self {
        Self {
            quantity,
            ..self.clone()
        }
    }
}

/// Sum of `price × quantity` over `items`.
#[must_use]
pub fn sum_lines(items: &[CartItem]) -> Decimal {
    items.iter().map(|item| item.line_total().amount).sum()
}

/// The first two distinct currencies among `items`, if there are two.
///
/// A cart total is only meaningful in one currency.
#[must_use]
pub fn mixed_currency(items: &[CartItem]) -> Option<(CurrencyCode, CurrencyCode)> {
    let first = items.first()?.price.currency_code;
    items
        .iter()
        .map(|item| item.price.currency_code)
        .find(|currency| *currency != first)
        .map(|other| (first, other))
}

/// Lifecycle of the cart as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    /// Nothing loaded yet for the current identity.
    #[default]
    Empty,
    /// A fetch is in flight.
    Loading,
    /// Local lines reflect the last server answer.
    Ready,
    /// At least one mutation is awaiting its server answer.
    Mutating,
    /// The last operation failed; lines are still displayable.
    Error,
}

/// Read-only view of the cart at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSnapshot {
    pub owner: Option<UserId>,
    /// Lines in display order.
    pub items: Vec<CartItem>,
    /// Always the sum of the lines; never stored independently.
    pub total: Price,
    /// Total number of units.
    pub item_count: u64,
    pub status: CartStatus,
    pub last_error: Option<StoreError>,
}

impl CartSnapshot {
    /// Line for `product_id`, if present.
    #[must_use]
    pub fn item(&self, product_id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.product_id == product_id)
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Cart blob kept in local storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PersistedCart {
    pub owner: Option<UserId>,
    pub items: Vec<CartItem>,
    pub saved_at: DateTime<Utc>,
}

impl PersistedCart {
    /// Reject blobs with two lines for one product or lines in more than
    /// one currency.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for item in &self.items {
            if !seen.insert(&item.product_id) {
                return Err(format!("duplicate line for product {}", item.product_id));
            }
        }
        if let Some((first, other)) = mixed_currency(&self.items) {
            return Err(format!("lines in both {} and {}", first.code(), other.code()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use atelier_core::CurrencyCode;

    use super::*;

    fn item(id: &str, cents: i64, qty: u32) -> CartItem {
        CartItem {
            product_id: ProductId::new(id),
            quantity: Quantity::try_from(qty).unwrap(),
            name: id.to_string(),
            price: Price::from_minor_units(cents, CurrencyCode::USD),
            image_url: None,
            slug: id.to_string(),
        }
    }

    #[test]
    fn test_line_total() {
        let line = item("oud", 1999, 3);
        assert_eq!(line.line_total().amount, Decimal::new(5997, 2));
    }

    #[test]
    fn test_sum_lines_exact() {
        let items = vec![item("a", 10, 1), item("b", 20, 1)];
        assert_eq!(sum_lines(&items), Decimal::new(30, 2));
        assert_eq!(sum_lines(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_mixed_currency() {
        let mut euro = item("b", 500, 1);
        euro.price = Price::from_minor_units(500, CurrencyCode::EUR);

        assert_eq!(mixed_currency(&[]), None);
        assert_eq!(mixed_currency(&[item("a", 100, 1), item("c", 200, 1)]), None);
        assert_eq!(
            mixed_currency(&[item("a", 100, 1), euro]),
            Some((CurrencyCode::USD, CurrencyCode::EUR))
        );
    }

    #[test]
    fn test_persisted_cart_rejects_duplicates() {
        let blob = PersistedCart {
            owner: None,
            items: vec![item("a", 100, 1), item("a", 100, 2)],
            saved_at: Utc::now(),
        };
        assert!(blob.validate().is_err());
    }

    #[test]
    fn test_zero_quantity_line_does_not_decode() {
        let raw = r#"{"product_id":"a","quantity":0,"name":"A","price":{"amount":"1.00","currency_code":"USD"},"slug":"a"}"#;
        assert!(serde_json::from_str::<CartItem>(raw).is_err());
    }
}
