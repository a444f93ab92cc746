//! Storefront context: one session store and one cart store sharing an API.
//!
//! UI code holds a [`Storefront`] (or clones of it) instead of reaching for
//! global singletons. Identity changes go through here so the cart is always
//! reset and reloaded for the new user.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tracing::{instrument, warn};

use atelier_core::CurrencyCode;

use crate::api::{Backend, catalog};
use crate::cart::CartStore;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::session::{BootstrapOutcome, SessionStore, UserDescriptor};
use crate::storage::Storage;

/// Tunables shared by the stores.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Timeout of one request attempt. Cart requests may retry once.
    pub request_timeout: Duration,
    /// Currency of an empty cart's total.
    pub currency: CurrencyCode,
    pub catalog_capacity: u64,
    pub catalog_ttl: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            currency: CurrencyCode::default(),
            catalog_capacity: catalog::DEFAULT_CAPACITY,
            catalog_ttl: catalog::DEFAULT_TTL,
        }
    }
}

impl From<&ClientConfig> for StoreOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            request_timeout: config.request_timeout,
            currency: config.currency,
            ..Self::default()
        }
    }
}

/// Session and cart for one storefront process.
pub struct Storefront<A> {
    session: SessionStore<A>,
    cart: CartStore<A>,
}

impl<A> Clone for Storefront<A> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            cart: self.cart.clone(),
        }
    }
}

impl<A: Backend> Storefront<A> {
    #[must_use]
    pub fn new(api: A, storage: Arc<dyn Storage>, options: StoreOptions) -> Self {
        let api = Arc::new(api);
        let session = SessionStore::new(
            Arc::clone(&api),
            Arc::clone(&storage),
            options.request_timeout,
        );
        let cart = CartStore::new(api, session.clone(), storage, &options);
        Self { session, cart }
    }

    #[must_use]
    pub const fn session(&self) -> &SessionStore<A> {
        &self.session
    }

    #[must_use]
    pub const fn cart(&self) -> &CartStore<A> {
        &self.cart
    }

    /// Restore the persisted session and cart, then refresh the cart from
    /// the server when signed in.
    ///
    /// A failed fetch is logged and leaves the restored lines displayed with
    /// status `Error`; it does not fail startup.
    #[instrument(skip(self))]
    pub async fn start(&self) -> BootstrapOutcome {
        let outcome = self.session.bootstrap();
        if outcome != BootstrapOutcome::AlreadyAuthenticated {
            self.cart.restore();
        }

        if self.session.is_authenticated() {
            if let Err(e) = self.cart.fetch_cart().await {
                warn!(error = %e, "Initial cart fetch failed");
            }
        }
        outcome
    }

    /// Sign in, then load the new user's cart from scratch.
    ///
    /// # Errors
    ///
    /// Returns the login error. A failed cart fetch after a successful login
    /// is logged, not returned; the cart status shows it.
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<UserDescriptor> {
        let user = self.session.login(email, password).await?;
        self.cart.switch_owner(Some(user.id.clone()));
        if let Err(e) = self.cart.fetch_cart().await {
            warn!(error = %e, "Cart fetch after login failed");
        }
        Ok(user)
    }

    /// Sign out, then drop the cart and the cached product snapshots.
    pub async fn logout(&self) {
        self.session.logout().await;
        self.cart.switch_owner(None);
        self.cart.catalog().invalidate_all().await;
    }
}
