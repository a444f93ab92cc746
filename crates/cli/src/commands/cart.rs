//! Cart commands.
//!
//! # Usage
//!
//! ```bash
//! atelier cart show
//! atelier cart add oud-royal --quantity 2
//! atelier cart update oud-royal 3
//! atelier cart remove oud-royal
//! atelier cart clear
//! ```
//!
//! Signed-out carts are kept only in the local data directory.

use std::fmt::Write as _;

use atelier_client::{Backend, CartSnapshot, CartStatus, Storefront};
use atelier_core::ProductId;

use crate::error::CliError;

/// Fetch (when signed in) and print the cart.
pub async fn show<A: Backend>(storefront: &Storefront<A>) -> Result<(), CliError> {
    let snapshot = storefront.cart().fetch_cart().await?;
    print!("{}", render(&snapshot));
    Ok(())
}

pub async fn add<A: Backend>(
    storefront: &Storefront<A>,
    product: &str,
    quantity: i64,
) -> Result<(), CliError> {
    let snapshot = storefront
        .cart()
        .add_item(&ProductId::new(product), quantity)
        .await?;
    print!("{}", render(&snapshot));
    Ok(())
}

pub async fn update<A: Backend>(
    storefront: &Storefront<A>,
    product: &str,
    quantity: i64,
) -> Result<(), CliError> {
    let snapshot = storefront
        .cart()
        .update_quantity(&ProductId::new(product), quantity)
        .await?;
    print!("{}", render(&snapshot));
    Ok(())
}

pub async fn remove<A: Backend>(storefront: &Storefront<A>, product: &str) -> Result<(), CliError> {
    let snapshot = storefront
        .cart()
        .remove_item(&ProductId::new(product))
        .await?;
    print!("{}", render(&snapshot));
    Ok(())
}

pub async fn clear<A: Backend>(storefront: &Storefront<A>) -> Result<(), CliError> {
    storefront.cart().clear_cart().await?;
    println!("Cart cleared.");
    Ok(())
}

/// Human-readable cart listing.
fn render(snapshot: &CartSnapshot) -> String {
    let mut out = String::new();
    if snapshot.is_empty() {
        out.push_str("Your cart is empty.\n");
        return out;
    }

    let width = snapshot
        .items
        .iter()
        .map(|item| item.name.chars().count())
        .max()
        .unwrap_or_default();

    for item in &snapshot.items {
        let _ = writeln!(
            out,
            "{:>3} × {:<width$}  {:>10}",
            item.quantity.get(),
            item.name,
            item.line_total().display(),
        );
    }
    let _ = writeln!(
        out,
        "Total: {} ({} item{})",
        snapshot.total.display(),
        snapshot.item_count,
        if snapshot.item_count == 1 { "" } else { "s" },
    );
    if snapshot.status == CartStatus::Error {
        out.push_str("(last sync failed; showing local state)\n");
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use atelier_client::CartItem;
    use atelier_core::{CurrencyCode, Price, Quantity};

    use super::*;

    fn line(id: &str, name: &str, cents: i64, quantity: u32) -> CartItem {
        CartItem {
            product_id: ProductId::new(id),
            quantity: Quantity::try_from(quantity).unwrap(),
            name: name.to_string(),
            price: Price::from_minor_units(cents, CurrencyCode::USD),
            image_url: None,
            slug: id.to_string(),
        }
    }

    fn snapshot(items: Vec<CartItem>, status: CartStatus) -> CartSnapshot {
        let total = items.iter().map(|i| i.line_total().amount).sum::<Decimal>();
        let item_count = items.iter().map(|i| u64::from(i.quantity.get())).sum();
        CartSnapshot {
            owner: None,
            items,
            total: Price::new(total, CurrencyCode::USD),
            item_count,
            status,
            last_error: None,
        }
    }

    #[test]
    fn test_render_empty() {
        let out = render(&snapshot(vec![], CartStatus::Ready));
        assert_eq!(out, "Your cart is empty.\n");
    }

    #[test]
    fn test_render_lines_and_total() {
        let out = render(&snapshot(
            vec![line("oud-royal", "Oud Royal", 4500, 2), line("musk", "Musk", 1250, 1)],
            CartStatus::Ready,
        ));
        assert!(out.contains("Oud Royal"));
        assert!(out.contains("$90.00"));
        assert!(out.contains("Total: $102.50 (3 items)"));
        assert!(!out.contains("last sync failed"));
    }

    #[test]
    fn test_render_flags_sync_error() {
        let out = render(&snapshot(vec![line("musk", "Musk", 1250, 1)], CartStatus::Error));
        assert!(out.contains("(1 item)"));
        assert!(out.contains("last sync failed"));
    }
}
