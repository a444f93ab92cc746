//! Shopping cart store.
//!
//! # Architecture
//!
//! - One [`CartStore`] per storefront; clones share state
//! - Mutations update the displayed lines immediately, then send the request
//!   on a spawned task, so dropping the caller's future never cancels
//!   reconciliation
//! - Server answers are applied in issue order per product (see `state`)
//! - Guest carts live only on this device; they are never merged into a
//!   signed-in user's cart
//! - The persisted copy is rewritten after every confirmed change and is
//!   only trusted for the identity that wrote it

mod state;
mod types;

pub use types::{
    CartItem, CartSnapshot, CartStatus, ProductSnapshot, mixed_currency, sum_lines,
};

pub(crate) use types::PersistedCart;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use secrecy::SecretString;
use tracing::{Instrument, debug, info, instrument, warn};

use atelier_core::{Price, ProductId, Quantity, UserId};

use self::state::{CartState, Ticket};
use crate::api::{
    self, AddItemRequest, ApiError, Backend, LineMutation, ProductCatalog, ServerCart,
};
use crate::error::{Result, StoreError};
use crate::session::SessionStore;
use crate::storage::{self, Storage, StorageError, keys};
use crate::storefront::StoreOptions;

/// Process-wide cart handle.
pub struct CartStore<A> {
    inner: Arc<CartInner<A>>,
}

struct CartInner<A> {
    api: Arc<A>,
    session: SessionStore<A>,
    catalog: ProductCatalog<A>,
    storage: Arc<dyn Storage>,
    /// Per-attempt timeout times the attempts the adapter may make.
    request_budget: Duration,
    state: Mutex<CartState>,
}

impl<A> Clone for CartStore<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Backend> CartStore<A> {
    /// Create an empty cart for whoever `session` currently identifies.
    #[must_use]
    pub fn new(
        api: Arc<A>,
        session: SessionStore<A>,
        storage: Arc<dyn Storage>,
        options: &StoreOptions,
    ) -> Self {
        let catalog = ProductCatalog::new(
            Arc::clone(&api),
            options.catalog_capacity,
            options.catalog_ttl,
        );
        let state = CartState::new(session.user_id(), options.currency);
        Self {
            inner: Arc::new(CartInner {
                api,
                session,
                catalog,
                storage,
                request_budget: options.request_timeout * api::MAX_ATTEMPTS,
                state: Mutex::new(state),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CartState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Product snapshot cache used for new lines.
    #[must_use]
    pub fn catalog(&self) -> &ProductCatalog<A> {
        &self.inner.catalog
    }

    // =========================================================================
    // Selectors
    // =========================================================================

    /// Current lines, total, and status.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.lock().snapshot()
    }

    /// Sum of `price × quantity` over the current lines.
    #[must_use]
    pub fn total(&self) -> Price {
        self.lock().total()
    }

    /// Total number of units in the cart.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lock().item_count()
    }

    #[must_use]
    pub fn status(&self) -> CartStatus {
        self.lock().status()
    }

    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.lock().items().to_vec()
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Load the persisted cart if it belongs to the current identity.
    ///
    /// A blob written by another identity, or one that fails to decode, is
    /// deleted. Never fails; the cart just starts empty.
    pub fn restore(&self) {
        let owner = self.inner.session.user_id();
        let mut state = self.lock();
        state.reset(owner.clone());

        let blob = match storage::load_json::<PersistedCart>(self.inner.storage.as_ref(), keys::CART)
        {
            Ok(Some(blob)) => blob,
            Ok(None) => return,
            Err(StorageError::Corrupt { reason, .. }) => {
                warn!(reason = %reason, "Persisted cart is corrupt, discarding");
                self.remove_persisted();
                return;
            }
            Err(e) => {
                warn!(error = %e, "Could not read persisted cart");
                return;
            }
        };

        if let Err(reason) = blob.validate() {
            warn!(reason = %reason, "Persisted cart is corrupt, discarding");
            self.remove_persisted();
            return;
        }
        if blob.owner != owner {
            debug!("Persisted cart belongs to another identity, discarding");
            self.remove_persisted();
            return;
        }

        debug!(lines = blob.items.len(), "Restored persisted cart");
        state.restore(blob.items);
    }

    /// Start over for a new identity. Never merges the previous lines.
    pub fn switch_owner(&self, owner: Option<UserId>) {
        let mut state = self.lock();
        if state.owner() != owner.as_ref() {
            info!(owner = ?owner, "Cart identity changed, resetting");
        }
        state.reset(owner);
        self.remove_persisted();
    }

    /// Reset the cart if the session identity moved underneath it.
    fn sync_owner(&self) -> Option<UserId> {
        let owner = self.inner.session.user_id();
        let mut state = self.lock();
        if state.owner() != owner.as_ref() {
            info!(owner = ?owner, "Session identity changed, resetting cart");
            state.reset(owner.clone());
            self.remove_persisted();
        }
        owner
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Replace the lines with the server's cart.
    ///
    /// Safe to call repeatedly. A guest cart has nothing to fetch and is
    /// returned as is.
    ///
    /// # Errors
    ///
    /// Returns the network, timeout, auth, or server error; the previous
    /// lines stay displayed.
    #[instrument(skip(self))]
    pub async fn fetch_cart(&self) -> Result<CartSnapshot> {
        let Some(user_id) = self.sync_owner() else {
            let mut state = self.lock();
            if state.status() == CartStatus::Empty {
                state.clear_local();
            }
            return Ok(state.snapshot());
        };

        let ticket = self.lock().begin_fetch();
        let store = self.clone();

        self.spawn(async move {
            let result = store
                .authorized(ticket, move |api, token| {
                    let user_id = user_id.clone();
                    async move { api.get_cart(&token, &user_id).await }
                })
                .await;
            store.settle_fetch(ticket, result).await
        })
        .await
    }

    async fn settle_fetch(
        &self,
        ticket: Ticket,
        result: Result<ServerCart>,
    ) -> Result<CartSnapshot> {
        let cart = match result.and_then(single_currency) {
            Ok(cart) => cart,
            Err(err) => {
                warn!(error = %err, "Cart fetch failed");
                self.lock().fail_fetch(ticket, err.clone());
                return Err(err);
            }
        };

        self.inner.catalog.remember(&cart.items).await;

        let mut state = self.lock();
        if cart.user_id.is_some() && cart.user_id.as_ref() != state.owner() {
            warn!(server_owner = ?cart.user_id, "Server returned a cart for another user");
        }
        if state.settle_fetch(ticket, cart.items) {
            self.check_total(&state, cart.total);
            self.persist(&state);
        } else {
            debug!("Discarded cart fetch for a previous identity");
        }
        Ok(state.snapshot())
    }

    /// Add `quantity` units of a product, summing with an existing line.
    ///
    /// # Errors
    ///
    /// `Validation` if `quantity` is not positive; `NotFound` if the product
    /// does not exist; otherwise the server error, after the optimistic
    /// change has been reverted.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_item(&self, product_id: &ProductId, quantity: i64) -> Result<CartSnapshot> {
        let quantity = Quantity::try_from(quantity)?;
        let owner = self.sync_owner();

        let existing = self.lock().find(product_id).cloned();
        let product = match existing {
            Some(line) => line.snapshot(),
            None => self.lookup(product_id).await?,
        };

        let ticket = {
            let mut state = self.lock();
            let row = match state.find(product_id) {
                Some(line) => line.with_quantity(line.quantity.checked_add(quantity)?),
                None => product.into_item(quantity),
            };
            if let Some(currency) = state.currency_conflict(&row) {
                return Err(StoreError::Validation(format!(
                    "{product_id} is priced in {}, the cart is in {}",
                    row.price.currency_code.code(),
                    currency.code()
                )));
            }

            if owner.is_none() {
                state.commit_local(product_id, Some(row));
                self.persist(&state);
                return Ok(state.snapshot());
            }
            state.begin_mutation(product_id, Some(row))
        };

        let request = AddItemRequest::new(product_id.clone(), quantity);
        self.mutate_line(ticket, product_id.clone(), move |api, token| {
            let request = request.clone();
            async move { api.add_item(&token, &request).await }
        })
        .await
    }

    /// Set a line's quantity. Zero removes the line.
    ///
    /// # Errors
    ///
    /// `Validation` for negative quantities, `NotFound` if the product has no
    /// line, otherwise the server error after rollback.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn update_quantity(
        &self,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<CartSnapshot> {
        if quantity == 0 {
            return self.remove_item(product_id).await;
        }
        let quantity = Quantity::try_from(quantity)?;
        let owner = self.sync_owner();

        let ticket = {
            let mut state = self.lock();
            let Some(line) = state.find(product_id) else {
                return Err(StoreError::NotFound(format!("no cart line for {product_id}")));
            };
            let row = line.with_quantity(quantity);

            if owner.is_none() {
                state.commit_local(product_id, Some(row));
                self.persist(&state);
                return Ok(state.snapshot());
            }
            state.begin_mutation(product_id, Some(row))
        };

        let target = product_id.clone();
        self.mutate_line(ticket, product_id.clone(), move |api, token| {
            let target = target.clone();
            async move { api.update_item(&token, &target, quantity).await }
        })
        .await
    }

    /// Remove a line. Removing an absent product is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the server error after the line has been restored.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_item(&self, product_id: &ProductId) -> Result<CartSnapshot> {
        let owner = self.sync_owner();

        let ticket = {
            let mut state = self.lock();
            if state.find(product_id).is_none() {
                debug!("Line already absent");
                return Ok(state.snapshot());
            }
            if owner.is_none() {
                state.commit_local(product_id, None);
                self.persist(&state);
                return Ok(state.snapshot());
            }
            state.begin_mutation(product_id, None)
        };

        let target = product_id.clone();
        self.mutate_line(ticket, product_id.clone(), move |api, token| {
            let target = target.clone();
            async move {
                api.remove_item(&token, &target)
                    .await
                    .map(|()| LineMutation {
                        item: None,
                        total: None,
                    })
            }
        })
        .await
    }

    /// Empty the cart.
    ///
    /// If the server call fails the cart stays empty locally and the status
    /// becomes `Error`; showing too few items beats showing too many.
    ///
    /// # Errors
    ///
    /// Returns the server error.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<CartSnapshot> {
        let owner = self.sync_owner();

        let ticket = {
            let mut state = self.lock();
            if owner.is_none() {
                state.clear_local();
                self.persist(&state);
                return Ok(state.snapshot());
            }
            state.begin_clear()
        };

        let store = self.clone();
        self.spawn(async move {
            let result = store
                .authorized(ticket, |api, token| async move {
                    api.clear_cart(&token).await
                })
                .await;

            let mut state = store.lock();
            match result {
                Ok(()) => {
                    state.settle_clear(ticket);
                    state.finish(ticket, None);
                    if state.is_current(ticket) {
                        store.persist(&state);
                    }
                    Ok(state.snapshot())
                }
                Err(err) => {
                    warn!(error = %err, "Clearing the cart failed, keeping it empty locally");
                    state.finish(ticket, Some(err.clone()));
                    Err(err)
                }
            }
        })
        .await
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    async fn lookup(&self, product_id: &ProductId) -> Result<ProductSnapshot> {
        tokio::time::timeout(self.inner.request_budget, self.inner.catalog.get(product_id))
            .await
            .unwrap_or(Err(ApiError::Timeout))
            .map_err(StoreError::from)
    }

    /// Run `task` detached from the caller and wait for its result.
    async fn spawn<F>(&self, task: F) -> Result<CartSnapshot>
    where
        F: Future<Output = Result<CartSnapshot>> + Send + 'static,
    {
        tokio::spawn(task.in_current_span())
            .await
            .map_err(|e| StoreError::Server(format!("cart task failed: {e}")))?
    }

    async fn mutate_line<F, Fut>(
        &self,
        ticket: Ticket,
        product_id: ProductId,
        call: F,
    ) -> Result<CartSnapshot>
    where
        F: Fn(Arc<A>, SecretString) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<LineMutation, ApiError>> + Send + 'static,
    {
        let store = self.clone();
        self.spawn(async move {
            let result = store.authorized(ticket, call).await;
            store.settle_line(ticket, &product_id, result)
        })
        .await
    }

    fn settle_line(
        &self,
        ticket: Ticket,
        product_id: &ProductId,
        result: Result<LineMutation>,
    ) -> Result<CartSnapshot> {
        let mut state = self.lock();
        let result = result.and_then(|mutation| {
            let conflict = mutation.item.as_ref().and_then(|item| {
                state.currency_conflict(item).map(|currency| {
                    format!(
                        "server priced {} in {}, the cart is in {}",
                        item.product_id,
                        item.price.currency_code.code(),
                        currency.code()
                    )
                })
            });
            conflict.map_or(Ok(mutation), |reason| Err(StoreError::Server(reason)))
        });
        match result {
            Ok(mutation) => {
                let applied = state.settle_line(ticket, product_id, mutation.item);
                state.finish(ticket, None);
                if applied {
                    self.check_total(&state, mutation.total);
                    self.persist(&state);
                } else {
                    debug!(seq = ticket.seq, "Discarded stale cart response");
                }
                Ok(state.snapshot())
            }
            Err(err) => {
                if state.rollback_line(ticket, product_id) {
                    warn!(error = %err, "Cart change failed, rolled back");
                }
                state.finish(ticket, Some(err.clone()));
                Err(err)
            }
        }
    }

    /// Send a request with the current access token, refreshing and
    /// retrying once if the server rejects it.
    async fn authorized<T, F, Fut>(&self, ticket: Ticket, call: F) -> Result<T>
    where
        F: Fn(Arc<A>, SecretString) -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, ApiError>> + Send,
        T: Send,
    {
        let session = &self.inner.session;
        // An expired token is refreshed here, so this can sign the user out too
        let token = match session.access_token().await {
            Ok(token) => token,
            Err(err) => return Err(self.session_lost(ticket, err)),
        };

        match self.timed(call(Arc::clone(&self.inner.api), token.clone())).await {
            Err(ApiError::Unauthorized) => {
                debug!("Access token rejected, refreshing");
                let fresh = match session.refresh(&token).await {
                    Ok(fresh) => fresh,
                    Err(err) => return Err(self.session_lost(ticket, err)),
                };
                self.timed(call(Arc::clone(&self.inner.api), fresh))
                    .await
                    .map_err(StoreError::from)
            }
            other => other.map_err(StoreError::from),
        }
    }

    /// Bound one adapter call, including the retry the adapter may send.
    async fn timed<T>(
        &self,
        request: impl Future<Output = std::result::Result<T, ApiError>> + Send,
    ) -> std::result::Result<T, ApiError> {
        tokio::time::timeout(self.inner.request_budget, request)
            .await
            .unwrap_or(Err(ApiError::Timeout))
    }

    /// Drop the cart if the session was signed out under `ticket`.
    ///
    /// A refresh that lost a race with a new login leaves the new
    /// identity's cart alone.
    fn session_lost(&self, ticket: Ticket, err: StoreError) -> StoreError {
        if self.inner.session.user_id().is_some() {
            return err;
        }
        let mut state = self.lock();
        if state.is_current(ticket) {
            warn!("Session lost, clearing cart");
            state.reset(None);
            drop(state);
            self.remove_persisted();
        }
        err
    }

    fn check_total(&self, state: &CartState, server_total: Option<Price>) {
        let Some(server_total) = server_total else {
            return;
        };
        let local = state.total();
        if state.status() == CartStatus::Ready && local.amount != server_total.amount {
            warn!(
                local = %local,
                server = %server_total,
                "Server cart total differs from the sum of lines"
            );
        }
    }

    fn persist(&self, state: &CartState) {
        let blob = PersistedCart {
            owner: state.owner().cloned(),
            items: state.items().to_vec(),
            saved_at: Utc::now(),
        };
        if let Err(e) = storage::save_json(self.inner.storage.as_ref(), keys::CART, &blob) {
            warn!(error = %e, "Failed to persist cart");
        }
    }

    fn remove_persisted(&self) {
        if let Err(e) = self.inner.storage.remove(keys::CART) {
            warn!(error = %e, "Failed to remove persisted cart");
        }
    }
}

/// Refuse a server cart whose lines cannot share one total.
fn single_currency(cart: ServerCart) -> Result<ServerCart> {
    match mixed_currency(&cart.items) {
        Some((first, other)) => Err(StoreError::Server(format!(
            "server cart mixes {} and {}",
            first.code(),
            other.code()
        ))),
        None => Ok(cart),
    }
}
