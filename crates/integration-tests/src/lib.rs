//! Integration tests for the Atelier client.
//!
//! The HTTP adapter and the full [`Storefront`] flow run against a
//! `wiremock` server standing in for the storefront API. State is persisted
//! to a temporary directory through [`FileStorage`], exactly as the CLI does.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p atelier-integration-tests
//! ```

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::MockServer;

use atelier_client::{ClientConfig, FileStorage, HttpApi, StoreOptions, Storefront};

/// Path prefix every mocked endpoint lives under.
pub const API_PREFIX: &str = "/api";

pub const EMAIL: &str = "layla@maison.example";
pub const PASSWORD: &str = "jasmine-at-dusk";

/// A mock API server plus a scratch data directory.
pub struct TestContext {
    pub server: MockServer,
    pub config: ClientConfig,
    pub data_dir: TempDir,
}

impl TestContext {
    /// Start a mock server with a 2 second request timeout.
    pub async fn new() -> Self {
        Self::with_timeout_secs(2).await
    }

    pub async fn with_timeout_secs(secs: u64) -> Self {
        let server = MockServer::start().await;
        let data_dir = tempfile::tempdir().unwrap();
        let api_url = format!("{}{API_PREFIX}", server.uri());
        let data_path = data_dir.path().to_string_lossy().into_owned();
        let timeout = secs.to_string();

        let config = ClientConfig::from_lookup(|key| match key {
            "ATELIER_API_URL" => Some(api_url.clone()),
            "ATELIER_DATA_DIR" => Some(data_path.clone()),
            "ATELIER_REQUEST_TIMEOUT_SECS" => Some(timeout.clone()),
            _ => None,
        })
        .unwrap();

        Self {
            server,
            config,
            data_dir,
        }
    }

    /// Path of an endpoint as the mock server sees it.
    #[must_use]
    pub fn path(endpoint: &str) -> String {
        format!("{API_PREFIX}/{endpoint}")
    }

    #[must_use]
    pub fn api(&self) -> HttpApi {
        HttpApi::new(&self.config).unwrap()
    }

    /// A storefront persisting to this context's data directory. Creating a
    /// second one simulates restarting the process.
    #[must_use]
    pub fn storefront(&self) -> Storefront<HttpApi> {
        let storage = Arc::new(FileStorage::open(&self.config.data_dir).unwrap());
        Storefront::new(self.api(), storage, StoreOptions::from(&self.config))
    }

    /// Whether a persisted blob exists for `key`.
    #[must_use]
    pub fn has_blob(&self, key: &str) -> bool {
        std::fs::read_dir(self.data_dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .any(|entry| entry.file_name().to_string_lossy() == format!("{key}.json"))
    }
}

/// Body of a successful login or refresh.
#[must_use]
pub fn token_body(access: &str, refresh: &str, user_id: &str) -> Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 3600,
        "user": {
            "id": user_id,
            "display_name": "Layla",
            "email": EMAIL,
            "role": "client",
            "email_verified": true
        }
    })
}

/// A product snapshot as `GET products/{id}` returns it.
#[must_use]
pub fn product_json(id: &str, name: &str, price: &str) -> Value {
    json!({
        "product_id": id,
        "name": name,
        "price": { "amount": price, "currency_code": "USD" },
        "image_url": format!("https://cdn.maison.example/{id}.jpg"),
        "slug": id
    })
}

/// A cart line as the cart endpoints return it.
#[must_use]
pub fn line_json(id: &str, name: &str, price: &str, quantity: u32) -> Value {
    let mut line = product_json(id, name, price);
    line["quantity"] = json!(quantity);
    line
}

#[must_use]
pub fn price_json(amount: &str) -> Value {
    json!({ "amount": amount, "currency_code": "USD" })
}
