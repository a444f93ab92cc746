//! Cached product lookups for cart line snapshots.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, instrument};

use atelier_core::ProductId;

use super::{ApiError, CartApi};
use crate::cart::{CartItem, ProductSnapshot};

/// Default number of cached products.
pub const DEFAULT_CAPACITY: u64 = 1000;

/// Default time-to-live for a cached product.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Product snapshot cache in front of `GET products/{id}`.
///
/// Snapshots are display data only; the server re-prices lines at checkout.
pub struct ProductCatalog<A> {
    api: Arc<A>,
    cache: Cache<ProductId, ProductSnapshot>,
}

impl<A> Clone for ProductCatalog<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            cache: self.cache.clone(),
        }
    }
}

impl<A: CartApi> ProductCatalog<A> {
    /// Create a catalog with the given cache bounds.
    #[must_use]
    pub fn new(api: Arc<A>, capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { api, cache }
    }

    /// Get a product snapshot, from cache when possible.
    ///
    /// # Errors
    ///
    /// Returns an error if the product is unknown or the API request fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get(&self, product_id: &ProductId) -> Result<ProductSnapshot, ApiError> {
        if let Some(product) = self.cache.get(product_id).await {
            debug!("Cache hit for product");
            return Ok(product);
        }

        let product = self.api.get_product(product_id).await?;
        self.cache
            .insert(product_id.clone(), product.clone())
            .await;
        Ok(product)
    }

    /// Seed the cache from lines the server just returned.
    pub async fn remember(&self, items: &[CartItem]) {
        for item in items {
            self.cache
                .insert(item.product_id.clone(), item.snapshot())
                .await;
        }
    }

    /// Invalidate a cached product.
    pub async fn invalidate(&self, product_id: &ProductId) {
        self.cache.invalidate(product_id).await;
    }

    /// Invalidate all cached data.
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, product};

    #[tokio::test]
    async fn test_second_lookup_is_cached() {
        let backend = Arc::new(FakeBackend::new());
        backend.add_product(product("oud-royal", 4500));
        let catalog = ProductCatalog::new(Arc::clone(&backend), 10, DEFAULT_TTL);

        let first = catalog.get(&ProductId::new("oud-royal")).await.unwrap();
        let second = catalog.get(&ProductId::new("oud-royal")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.product_lookups(), 1);
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let backend = Arc::new(FakeBackend::new());
        let catalog = ProductCatalog::new(backend, 10, DEFAULT_TTL);

        let err = catalog.get(&ProductId::new("ghost")).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remember_seeds_cache() {
        let backend = Arc::new(FakeBackend::new());
        let catalog = ProductCatalog::new(Arc::clone(&backend), 10, DEFAULT_TTL);
        let item = product("musk-noir", 1200).into_item(atelier_core::Quantity::ONE);

        catalog.remember(std::slice::from_ref(&item)).await;
        let found = catalog.get(&ProductId::new("musk-noir")).await.unwrap();

        assert_eq!(found.name, item.name);
        assert_eq!(backend.product_lookups(), 0);

        catalog.invalidate(&ProductId::new("musk-noir")).await;
        assert!(catalog.get(&ProductId::new("musk-noir")).await.is_err());
    }
}
