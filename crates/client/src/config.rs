//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ATELIER_API_URL` - Base URL of the storefront API (e.g., `https://shop.example/api/`)
//!
//! ## Optional
//! - `ATELIER_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: 10, range 1-120)
//! - `ATELIER_DATA_DIR` - Directory for persisted session and cart state (default: `.atelier`)
//! - `ATELIER_CURRENCY` - Display currency for empty carts (default: USD)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use atelier_core::CurrencyCode;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const MAX_TIMEOUT_SECS: u64 = 120;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the storefront API. Always ends with `/`.
    pub api_url: Url,
    /// Bound on every network call.
    pub request_timeout: Duration,
    /// Where persisted session and cart state lives.
    pub data_dir: PathBuf,
    /// Currency used to display an empty cart total.
    pub currency: CurrencyCode,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("ATELIER_API_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("ATELIER_API_URL".to_string()))?;
        let api_url = parse_base_url(&api_url)?;

        let timeout_secs = match lookup("ATELIER_REQUEST_TIMEOUT_SECS") {
            Some(raw) => parse_timeout(&raw)?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let currency = match lookup("ATELIER_CURRENCY") {
            Some(raw) => raw.parse::<CurrencyCode>().map_err(|e| {
                ConfigError::InvalidEnvVar("ATELIER_CURRENCY".to_string(), e.to_string())
            })?,
            None => CurrencyCode::default(),
        };

        let data_dir = lookup("ATELIER_DATA_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map_or_else(|| PathBuf::from(".atelier"), PathBuf::from);

        Ok(Self {
            api_url,
            request_timeout: Duration::from_secs(timeout_secs),
            data_dir,
            currency,
            sentry_dsn: lookup("SENTRY_DSN").filter(|dsn| !dsn.is_empty()),
            sentry_environment: lookup("SENTRY_ENVIRONMENT"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse the API base URL, forcing a trailing slash so relative joins
/// append instead of replacing the last path segment.
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar("ATELIER_API_URL".to_string(), e.to_string()))?;

    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            "ATELIER_API_URL".to_string(),
            "must be an absolute http(s) URL".to_string(),
        ));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_timeout(raw: &str) -> Result<u64, ConfigError> {
    let secs = raw.trim().parse::<u64>().map_err(|e| {
        ConfigError::InvalidEnvVar("ATELIER_REQUEST_TIMEOUT_SECS".to_string(), e.to_string())
    })?;
    if secs == 0 || secs > MAX_TIMEOUT_SECS {
        return Err(ConfigError::InvalidEnvVar(
            "ATELIER_REQUEST_TIMEOUT_SECS".to_string(),
            format!("must be between 1 and {MAX_TIMEOUT_SECS} (got {secs})"),
        ));
    }
    Ok(secs)
}
