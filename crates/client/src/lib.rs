//! Atelier client library.
//!
//! Keeps the storefront's session and shopping cart in sync with the
//! Atelier API. UI code (or the bundled CLI) talks to a [`Storefront`],
//! which owns exactly one [`SessionStore`] and one [`CartStore`].
//!
//! # Architecture
//!
//! - [`session`] restores credentials from local storage on start and owns
//!   login, logout, and token refresh
//! - [`cart`] holds the rendered cart, applies mutations optimistically and
//!   reconciles them against server responses in issue order
//! - [`api`] is the HTTP adapter for the storefront API, plus a cached
//!   product catalog for line snapshots
//! - [`storage`] is the persisted-state boundary; every blob is strictly
//!   decoded and corrupt data is discarded
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use atelier_client::{ClientConfig, FileStorage, HttpApi, Storefront, StoreOptions};
//!
//! let config = ClientConfig::from_env()?;
//! let api = HttpApi::new(&config)?;
//! let storage = Arc::new(FileStorage::open(&config.data_dir)?);
//! let storefront = Storefront::new(api, storage, StoreOptions::from(&config));
//!
//! storefront.start().await;
//! storefront.cart().add_item(&"oud-royal".into(), 2).await?;
//! println!("{}", storefront.cart().total());
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod config;
pub mod error;
pub mod session;
pub mod storage;
pub mod storefront;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiError, AuthApi, Backend, CartApi, HttpApi, ProductCatalog};
pub use cart::{CartItem, CartSnapshot, CartStatus, CartStore, ProductSnapshot};
pub use config::{ClientConfig, ConfigError};
pub use error::StoreError;
pub use session::{BootstrapOutcome, Session, SessionStore, UserDescriptor};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use storefront::{StoreOptions, Storefront};
