//! Atelier Core - Shared types library.
//!
//! This crate provides the domain types used across all Atelier components:
//! - `client` - Session and cart stores synchronized with the storefront API
//! - `cli` - Command-line driver for the client
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no storage access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, quantities, emails, and roles

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
