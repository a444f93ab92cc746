//! Scripted in-memory backend for unit tests.
//!
//! Behaves like the storefront API (token checks, summing adds, per-user
//! carts) and lets a test inject failures or hold a response until the test
//! releases it, so answers can be delivered in any order.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Notify;

use atelier_core::{CurrencyCode, Price, ProductId, Quantity, Role, UserId};

use crate::api::{
    AddItemRequest, ApiError, AuthApi, CartApi, LineMutation, LoginRequest, ServerCart,
    TokenResponse,
};
use crate::cart::{CartItem, ProductSnapshot};
use crate::session::UserDescriptor;
use crate::storage::MemoryStorage;
use crate::storefront::{StoreOptions, Storefront};

pub const EMAIL: &str = "layla@maison.example";
pub const PASSWORD: &str = "jasmine-at-dusk";

/// Which endpoint a call hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Login,
    Refresh,
    Logout,
    GetCart,
    Add,
    Update,
    Remove,
    Clear,
    Product,
}

/// Product snapshot priced in US cents.
pub fn product(id: &str, cents: i64) -> ProductSnapshot {
    ProductSnapshot {
        product_id: ProductId::new(id),
        name: id.replace('-', " "),
        price: Price::from_minor_units(cents, CurrencyCode::USD),
        image_url: Some(format!("https://cdn.maison.example/{id}.jpg")),
        slug: id.to_string(),
    }
}

pub fn user(id: &str) -> UserDescriptor {
    UserDescriptor {
        id: UserId::new(id),
        display_name: "Layla".to_string(),
        email: None,
        role: Role::Client,
        email_verified: true,
    }
}

pub fn password() -> SecretString {
    SecretString::from(PASSWORD.to_string())
}

pub fn qty(n: u32) -> Quantity {
    Quantity::try_from(n).unwrap()
}

#[derive(Default)]
struct FakeState {
    accounts: HashMap<String, (String, UserDescriptor)>,
    products: HashMap<ProductId, ProductSnapshot>,
    carts: HashMap<UserId, Vec<CartItem>>,
    access_tokens: HashMap<String, UserId>,
    refresh_tokens: HashMap<String, UserDescriptor>,
    issued: u32,
    calls: HashMap<Op, usize>,
    failures: HashMap<Op, VecDeque<ApiError>>,
    holds: HashMap<Op, VecDeque<Arc<Notify>>>,
    expires_in: Option<i64>,
}

impl FakeState {
    fn issue(&mut self, user: UserDescriptor) -> TokenResponse {
        self.issued += 1;
        let access = format!("access-{}", self.issued);
        let refresh = format!("refresh-{}", self.issued);
        self.access_tokens.insert(access.clone(), user.id.clone());
        self.refresh_tokens.insert(refresh.clone(), user.clone());
        TokenResponse {
            access_token: access,
            refresh_token: refresh,
            expires_in: self.expires_in,
            user,
        }
    }

    fn authorize(&self, token: &SecretString) -> Result<UserId, ApiError> {
        self.access_tokens
            .get(token.expose_secret())
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }

    fn cart(&mut self, user_id: UserId) -> &mut Vec<CartItem> {
        self.carts.entry(user_id).or_default()
    }

    fn total(&self, user_id: &UserId) -> Price {
        let items = self.carts.get(user_id).map_or(&[][..], Vec::as_slice);
        Price::new(crate::cart::sum_lines(items), CurrencyCode::USD)
    }
}

/// Cloneable handle; clones share the same server state.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with one client account (`EMAIL` / `PASSWORD`, id `u_1`).
    pub fn with_account() -> Self {
        let backend = Self::new();
        backend.add_account(EMAIL, PASSWORD, user("u_1"));
        backend
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_account(&self, email: &str, password: &str, user: UserDescriptor) {
        self.lock()
            .accounts
            .insert(email.to_string(), (password.to_string(), user));
    }

    pub fn add_product(&self, product: ProductSnapshot) {
        self.lock().products.insert(product.product_id.clone(), product);
    }

    /// Put lines in a user's server-side cart.
    pub fn seed_cart(&self, user_id: &str, items: Vec<CartItem>) {
        let mut state = self.lock();
        for item in &items {
            state
                .products
                .entry(item.product_id.clone())
                .or_insert_with(|| item.snapshot());
        }
        state.carts.insert(UserId::new(user_id), items);
    }

    pub fn server_cart(&self, user_id: &str) -> Vec<CartItem> {
        self.lock()
            .carts
            .get(&UserId::new(user_id))
            .cloned()
            .unwrap_or_default()
    }

    /// Issue a token pair directly, as if the user had logged in elsewhere.
    pub fn issue_tokens(&self, user: UserDescriptor) -> TokenResponse {
        self.lock().issue(user)
    }

    /// Lifetime reported with newly issued tokens.
    pub fn set_expires_in(&self, seconds: Option<i64>) {
        self.lock().expires_in = seconds;
    }

    /// Invalidate every access token; refresh tokens keep working.
    pub fn expire_access_tokens(&self) {
        self.lock().access_tokens.clear();
    }

    /// Invalidate every refresh token.
    pub fn revoke_refresh_tokens(&self) {
        self.lock().refresh_tokens.clear();
    }

    /// Fail the next call to `op` with `error`.
    pub fn fail_next(&self, op: Op, error: ApiError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Hold the next call to `op`: the server applies it immediately but the
    /// response waits until the returned gate is notified.
    pub fn hold_next(&self, op: Op) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock()
            .holds
            .entry(op)
            .or_default()
            .push_back(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self, op: Op) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or_default()
    }

    pub fn product_lookups(&self) -> usize {
        self.calls(Op::Product)
    }

    /// Wait until `op` has been called at least `count` times.
    pub async fn wait_for_calls(&self, op: Op, count: usize) {
        while self.calls(op) < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn serve<T>(
        &self,
        op: Op,
        handle: impl FnOnce(&mut FakeState) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let (result, gate) = {
            let mut state = self.lock();
            *state.calls.entry(op).or_default() += 1;
            let gate = state.holds.get_mut(&op).and_then(VecDeque::pop_front);
            let injected = state.failures.get_mut(&op).and_then(VecDeque::pop_front);
            let result = match injected {
                Some(error) => Err(error),
                None => handle(&mut *state),
            };
            (result, gate)
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
    }
}

impl AuthApi for FakeBackend {
    async fn login(&self, request: &LoginRequest) -> Result<TokenResponse, ApiError> {
        self.serve(Op::Login, |state| {
            let user = match state.accounts.get(&request.email) {
                Some((password, user)) if *password == request.password => user.clone(),
                _ => return Err(ApiError::Unauthorized),
            };
            Ok(state.issue(user))
        })
        .await
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenResponse, ApiError> {
        self.serve(Op::Refresh, |state| {
            let user = state
                .refresh_tokens
                .remove(refresh_token.expose_secret())
                .ok_or(ApiError::Unauthorized)?;
            Ok(state.issue(user))
        })
        .await
    }

    async fn logout(&self, access_token: &SecretString) -> Result<(), ApiError> {
        self.serve(Op::Logout, |state| {
            state.authorize(access_token)?;
            state.access_tokens.remove(access_token.expose_secret());
            Ok(())
        })
        .await
    }
}

impl CartApi for FakeBackend {
    async fn get_cart(
        &self,
        access_token: &SecretString,
        user_id: &UserId,
    ) -> Result<ServerCart, ApiError> {
        self.serve(Op::GetCart, |state| {
            if &state.authorize(access_token)? != user_id {
                return Err(ApiError::Unauthorized);
            }
            let items = state.cart(user_id.clone()).clone();
            Ok(ServerCart {
                user_id: Some(user_id.clone()),
                items,
                total: Some(state.total(user_id)),
            })
        })
        .await
    }

    async fn add_item(
        &self,
        access_token: &SecretString,
        request: &AddItemRequest,
    ) -> Result<LineMutation, ApiError> {
        self.serve(Op::Add, |state| {
            let user_id = state.authorize(access_token)?;
            let product = state
                .products
                .get(&request.product_id)
                .cloned()
                .ok_or_else(|| ApiError::NotFound(request.product_id.to_string()))?;

            let cart = state.cart(user_id.clone());
            let item = match cart.iter_mut().find(|i| i.product_id == request.product_id) {
                Some(line) => {
                    line.quantity = line
                        .quantity
                        .checked_add(request.quantity)
                        .map_err(|e| ApiError::Rejected(e.to_string()))?;
                    line.clone()
                }
                None => {
                    let line = product.into_item(request.quantity);
                    cart.push(line.clone());
                    line
                }
            };
            Ok(LineMutation {
                item: Some(item),
                total: Some(state.total(&user_id)),
            })
        })
        .await
    }

    async fn update_item(
        &self,
        access_token: &SecretString,
        product_id: &ProductId,
        quantity: Quantity,
    ) -> Result<LineMutation, ApiError> {
        self.serve(Op::Update, |state| {
            let user_id = state.authorize(access_token)?;
            let line = state
                .cart(user_id.clone())
                .iter_mut()
                .find(|i| &i.product_id == product_id)
                .ok_or_else(|| ApiError::NotFound(product_id.to_string()))?;
            line.quantity = quantity;
            let item = line.clone();
            Ok(LineMutation {
                item: Some(item),
                total: Some(state.total(&user_id)),
            })
        })
        .await
    }

    async fn remove_item(
        &self,
        access_token: &SecretString,
        product_id: &ProductId,
    ) -> Result<(), ApiError> {
        self.serve(Op::Remove, |state| {
            let user_id = state.authorize(access_token)?;
            state.cart(user_id).retain(|i| &i.product_id != product_id);
            Ok(())
        })
        .await
    }

    async fn clear_cart(&self, access_token: &SecretString) -> Result<(), ApiError> {
        self.serve(Op::Clear, |state| {
            let user_id = state.authorize(access_token)?;
            state.cart(user_id).clear();
            Ok(())
        })
        .await
    }

    async fn get_product(&self, product_id: &ProductId) -> Result<ProductSnapshot, ApiError> {
        self.serve(Op::Product, |state| {
            state
                .products
                .get(product_id)
                .cloned()
                .ok_or_else(|| ApiError::NotFound(product_id.to_string()))
        })
        .await
    }
}

/// Storefront over `backend` with fresh in-memory storage.
pub fn storefront(backend: &FakeBackend) -> (Storefront<FakeBackend>, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let front = storefront_with(backend, Arc::clone(&storage));
    (front, storage)
}

pub fn storefront_with(
    backend: &FakeBackend,
    storage: Arc<MemoryStorage>,
) -> Storefront<FakeBackend> {
    let options = StoreOptions {
        request_timeout: Duration::from_millis(200),
        ..StoreOptions::default()
    };
    Storefront::new(backend.clone(), storage, options)
}

/// Signed-in storefront for account `u_1`.
pub async fn signed_in(backend: &FakeBackend) -> (Storefront<FakeBackend>, Arc<MemoryStorage>) {
    let (front, storage) = storefront(backend);
    front.start().await;
    front.login(EMAIL, &password()).await.unwrap();
    (front, storage)
}
