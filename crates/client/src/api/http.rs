//! HTTP implementation of the storefront API.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use atelier_core::{ProductId, Quantity, UserId};

use super::types::{ErrorBody, RefreshRequest, UpdateItemRequest};
use super::{
    AddItemRequest, ApiError, AuthApi, CartApi, LineMutation, LoginRequest, MAX_ATTEMPTS,
    ServerCart, TokenResponse,
};
use crate::cart::ProductSnapshot;
use crate::config::ClientConfig;

/// Header carrying the client-generated key that lets the server collapse
/// duplicate `POST cart/items` requests.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Maximum number of characters of a response body kept in errors and logs.
const BODY_PREVIEW_CHARS: usize = 200;

/// Whether a request may be repeated after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    /// Send once.
    Never,
    /// Retry on network errors and timeouts, up to `MAX_ATTEMPTS` in total.
    Once,
}

// =============================================================================
// HttpApi
// =============================================================================

/// Client for the storefront REST API.
///
/// Cheaply cloneable; all clones share one connection pool.
#[derive(Clone)]
pub struct HttpApi {
    inner: Arc<HttpApiInner>,
}

struct HttpApiInner {
    client: reqwest::Client,
    base_url: Url,
}

impl std::fmt::Debug for HttpApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApi")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpApi {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .user_agent(concat!("atelier-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(HttpApiInner {
                client,
                base_url: config.api_url.clone(),
            }),
        })
    }

    /// Base URL every endpoint is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Build an endpoint URL from path segments. Segments are percent-encoded,
    /// so IDs containing `/` or spaces stay a single segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(self.inner.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, token: Option<&SecretString>) -> RequestBuilder {
        let builder = self.inner.client.request(method, url);
        match token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Send a request, retrying once on transient failures when allowed.
    ///
    /// `build` is called once per attempt so every attempt carries identical
    /// headers (including the idempotency key).
    async fn dispatch(
        &self,
        retry: Retry,
        build: impl Fn() -> RequestBuilder + Send,
    ) -> Result<Response, ApiError> {
        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            let result = match build().send().await {
                Ok(response) => check_status(response).await,
                Err(e) => Err(ApiError::from(e)),
            };

            match result {
                Err(err)
                    if err.is_transient() && retry == Retry::Once && attempt < MAX_ATTEMPTS =>
                {
                    warn!(error = %err, "Transient API failure, retrying once");
                }
                other => return other,
            }
        }
    }

    async fn dispatch_json<T: DeserializeOwned>(
        &self,
        retry: Retry,
        build: impl Fn() -> RequestBuilder + Send,
    ) -> Result<T, ApiError> {
        let response = self.dispatch(retry, build).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %preview(&body),
                "Failed to parse storefront API response"
            );
            ApiError::Parse(e.to_string())
        })
    }
}

/// Map non-success statuses to `ApiError`.
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(ApiError::RateLimited(retry_after));
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map_or_else(|_| preview(&body), |b| b.message);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Unauthorized),
        StatusCode::NOT_FOUND => Err(ApiError::NotFound(message)),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            Err(ApiError::Rejected(message))
        }
        _ => {
            tracing::error!(
                status = %status,
                body = %preview(&body),
                "Storefront API returned non-success status"
            );
            Err(ApiError::Status {
                status: status.as_u16(),
                body: message,
            })
        }
    }
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}

// =============================================================================
// AuthApi
// =============================================================================

impl AuthApi for HttpApi {
    #[instrument(skip(self, request))]
    async fn login(&self, request: &LoginRequest) -> Result<TokenResponse, ApiError> {
        let url = self.endpoint(&["auth", "login"])?;
        self.dispatch_json(Retry::Never, || {
            self.request(Method::POST, url.clone(), None).json(request)
        })
        .await
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenResponse, ApiError> {
        let url = self.endpoint(&["auth", "refresh"])?;
        let body = RefreshRequest {
            refresh_token: refresh_token.expose_secret(),
        };
        self.dispatch_json(Retry::Never, || {
            self.request(Method::POST, url.clone(), None).json(&body)
        })
        .await
    }

    #[instrument(skip_all)]
    async fn logout(&self, access_token: &SecretString) -> Result<(), ApiError> {
        let url = self.endpoint(&["auth", "logout"])?;
        self.dispatch(Retry::Never, || {
            self.request(Method::POST, url.clone(), Some(access_token))
        })
        .await?;
        Ok(())
    }
}

// =============================================================================
// CartApi
// =============================================================================

impl CartApi for HttpApi {
    #[instrument(skip(self, access_token), fields(user_id = %user_id))]
    async fn get_cart(
        &self,
        access_token: &SecretString,
        user_id: &UserId,
    ) -> Result<ServerCart, ApiError> {
        let url = self.endpoint(&["cart", user_id.as_str()])?;
        self.dispatch_json(Retry::Once, || {
            self.request(Method::GET, url.clone(), Some(access_token))
        })
        .await
    }

    #[instrument(
        skip(self, access_token, request),
        fields(product_id = %request.product_id, quantity = %request.quantity)
    )]
    async fn add_item(
        &self,
        access_token: &SecretString,
        request: &AddItemRequest,
    ) -> Result<LineMutation, ApiError> {
        let url = self.endpoint(&["cart", "items"])?;
        let key = request.idempotency_key.to_string();
        // Safe to retry: the server collapses duplicates by idempotency key
        self.dispatch_json(Retry::Once, || {
            self.request(Method::POST, url.clone(), Some(access_token))
                .header(IDEMPOTENCY_HEADER, &key)
                .json(request)
        })
        .await
    }

    #[instrument(skip(self, access_token), fields(product_id = %product_id, quantity = %quantity))]
    async fn update_item(
        &self,
        access_token: &SecretString,
        product_id: &ProductId,
        quantity: Quantity,
    ) -> Result<LineMutation, ApiError> {
        let url = self.endpoint(&["cart", "items", product_id.as_str()])?;
        let body = UpdateItemRequest { quantity };
        self.dispatch_json(Retry::Once, || {
            self.request(Method::PUT, url.clone(), Some(access_token))
                .json(&body)
        })
        .await
    }

    #[instrument(skip(self, access_token), fields(product_id = %product_id))]
    async fn remove_item(
        &self,
        access_token: &SecretString,
        product_id: &ProductId,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["cart", "items", product_id.as_str()])?;
        match self
            .dispatch(Retry::Once, || {
                self.request(Method::DELETE, url.clone(), Some(access_token))
            })
            .await
        {
            Ok(_) => Ok(()),
            // The line is already gone, which is what we asked for
            Err(ApiError::NotFound(_)) => {
                debug!("Line already absent on server");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip_all)]
    async fn clear_cart(&self, access_token: &SecretString) -> Result<(), ApiError> {
        let url = self.endpoint(&["cart"])?;
        self.dispatch(Retry::Once, || {
            self.request(Method::DELETE, url.clone(), Some(access_token))
        })
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn get_product(&self, product_id: &ProductId) -> Result<ProductSnapshot, ApiError> {
        let url = self.endpoint(&["products", product_id.as_str()])?;
        self.dispatch_json(Retry::Once, || {
            self.request(Method::GET, url.clone(), None)
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use atelier_core::CurrencyCode;

    use super::*;

    fn api(base: &str) -> HttpApi {
        let config = ClientConfig {
            api_url: Url::parse(base).unwrap(),
            request_timeout: Duration::from_secs(5),
            data_dir: PathBuf::from(".atelier"),
            currency: CurrencyCode::USD,
            sentry_dsn: None,
            sentry_environment: None,
        };
        HttpApi::new(&config).unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let api = api("https://shop.example/api/");
        let url = api.endpoint(&["cart", "items", "oud-royal"]).unwrap();
        assert_eq!(url.as_str(), "https://shop.example/api/cart/items/oud-royal");
    }

    #[test]
    fn test_endpoint_encodes_ids() {
        let api = api("https://shop.example/api/");
        let url = api.endpoint(&["products", "rose/amber 50ml"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://shop.example/api/products/rose%2Famber%2050ml"
        );
    }

    #[test]
    fn test_preview_truncates() {
        let body = "x".repeat(500);
        assert_eq!(preview(&body).len(), BODY_PREVIEW_CHARS);
    }
}
