//! Session store: bootstrap, login, logout, and token refresh.
//!
//! The in-memory session is the source of truth for the lifetime of the
//! process. The persisted copy (two blobs, tokens and user) is an advisory
//! cache: it is read once by [`SessionStore::bootstrap`] and rewritten after
//! every successful transition, but it never overrides a live session.

mod types;

pub use types::{AuthenticatedSession, BootstrapOutcome, Credentials, Session, UserDescriptor};

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};

use atelier_core::{Email, Role, UserId};

use self::types::PersistedCredentials;
use crate::api::{ApiError, AuthApi, LoginRequest, TokenResponse};
use crate::error::{Result, StoreError};
use crate::storage::{self, Storage, StorageError, keys};

/// Process-wide session handle. Clones share state.
pub struct SessionStore<A> {
    inner: Arc<SessionInner<A>>,
}

struct SessionInner<A> {
    api: Arc<A>,
    storage: Arc<dyn Storage>,
    request_timeout: Duration,
    state: RwLock<Session>,
    /// Serializes refreshes so concurrent 401s spend the refresh token once.
    refresh_lock: Mutex<()>,
    identity: watch::Sender<Option<UserId>>,
}

impl<A> Clone for SessionStore<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> SessionStore<A> {
    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Selectors
    // =========================================================================

    /// Copy of the current session.
    #[must_use]
    pub fn current(&self) -> Session {
        self.read().clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<UserDescriptor> {
        self.read().user().cloned()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.read().user_id().cloned()
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.read().role()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read().is_authenticated()
    }

    /// Watch the current identity. The value changes on login, logout, and
    /// bootstrap restore.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.inner.identity.subscribe()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Restore the persisted session, if any. Purely local; never touches
    /// the network.
    ///
    /// A live session is never overwritten. Corrupt persisted data (bad
    /// JSON, missing fields, one blob without the other) is deleted and the
    /// session is left signed out.
    #[instrument(skip(self))]
    pub fn bootstrap(&self) -> BootstrapOutcome {
        // Held for the whole check so a concurrent login cannot interleave
        let mut state = self.write();
        if state.is_authenticated() {
            debug!("Session already live, skipping restore");
            return BootstrapOutcome::AlreadyAuthenticated;
        }

        let store = self.inner.storage.as_ref();
        let tokens = storage::load_json::<PersistedCredentials>(store, keys::AUTH_TOKENS);
        let user = storage::load_json::<UserDescriptor>(store, keys::AUTH_USER);

        let outcome = match (tokens, user) {
            (Ok(None), Ok(None)) => BootstrapOutcome::NoSession,
            (Ok(Some(tokens)), Ok(Some(user))) => {
                match tokens.into_credentials() {
                    Some(tokens) if user.role.is_authenticated() => {
                        info!(user_id = %user.id, "Restored persisted session");
                        let user_id = user.id.clone();
                        *state = Session::Authenticated(AuthenticatedSession { user, tokens });
                        drop(state);
                        self.announce(Some(user_id));
                        return BootstrapOutcome::Restored;
                    }
                    _ => self.discard_corrupt("token blob is incomplete"),
                }
            }
            (Err(e @ StorageError::Io { .. }), _) | (_, Err(e @ StorageError::Io { .. })) => {
                warn!(error = %e, "Could not read persisted session");
                BootstrapOutcome::NoSession
            }
            (Err(e), _) | (_, Err(e)) => self.discard_corrupt(&e.to_string()),
            (Ok(Some(_)), Ok(None)) | (Ok(None), Ok(Some(_))) => {
                self.discard_corrupt("one session blob is missing")
            }
        };

        *state = Session::Guest;
        drop(state);
        self.announce(None);
        outcome
    }

    fn discard_corrupt(&self, reason: &str) -> BootstrapOutcome {
        warn!(reason = %reason, "Persisted session is corrupt, discarding");
        self.remove_persisted();
        BootstrapOutcome::Recovered
    }

    /// Drop the session locally: memory, both blobs, and the identity.
    fn clear_local(&self) {
        *self.write() = Session::Guest;
        self.remove_persisted();
        self.announce(None);
    }

    fn install(&self, session: AuthenticatedSession) {
        let user_id = session.user.id.clone();
        self.persist(&session);
        *self.write() = Session::Authenticated(session);
        self.announce(Some(user_id));
    }

    fn announce(&self, user_id: Option<UserId>) {
        self.inner.identity.send_if_modified(|current| {
            if *current == user_id {
                false
            } else {
                *current = user_id;
                true
            }
        });
    }

    fn persist(&self, session: &AuthenticatedSession) {
        let store = self.inner.storage.as_ref();
        let tokens = PersistedCredentials::from_credentials(&session.tokens);
        let result = storage::save_json(store, keys::AUTH_TOKENS, &tokens)
            .and_then(|()| storage::save_json(store, keys::AUTH_USER, &session.user));
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist session");
        }
    }

    fn remove_persisted(&self) {
        for key in [keys::AUTH_TOKENS, keys::AUTH_USER] {
            if let Err(e) = self.inner.storage.remove(key) {
                warn!(key, error = %e, "Failed to remove persisted session");
            }
        }
    }

    async fn timed<T>(
        &self,
        request: impl Future<Output = std::result::Result<T, ApiError>> + Send,
    ) -> std::result::Result<T, ApiError> {
        tokio::time::timeout(self.inner.request_timeout, request)
            .await
            .unwrap_or(Err(ApiError::Timeout))
    }
}

impl<A: AuthApi> SessionStore<A> {
    /// Create a signed-out store. Call [`Self::bootstrap`] to restore a
    /// persisted session.
    #[must_use]
    pub fn new(api: Arc<A>, storage: Arc<dyn Storage>, request_timeout: Duration) -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            inner: Arc::new(SessionInner {
                api,
                storage,
                request_timeout,
                state: RwLock::new(Session::Guest),
                refresh_lock: Mutex::new(()),
                identity,
            }),
        }
    }

    /// Sign in and persist the new session.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed email (no request is sent), `Auth` for
    /// rejected credentials, otherwise the network or server error.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<UserDescriptor> {
        let email = Email::parse(email)?;
        if password.expose_secret().is_empty() {
            return Err(StoreError::Validation("password must not be empty".to_string()));
        }

        let request = LoginRequest {
            email: email.as_str().to_owned(),
            password: password.expose_secret().to_owned(),
        };
        let response = self
            .timed(self.inner.api.login(&request))
            .await
            .map_err(|e| match e {
                ApiError::Unauthorized => {
                    StoreError::Auth("invalid email or password".to_string())
                }
                other => StoreError::from(other),
            })?;

        let session = authenticated(response)?;
        let user = session.user.clone();
        info!(user_id = %user.id, role = %user.role, "Signed in");
        self.install(session);
        Ok(user)
    }

    /// Sign out. The server is told on a best-effort basis; local state is
    /// always cleared.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let token = match &*self.read() {
            Session::Authenticated(session) => Some(session.tokens.access_token.clone()),
            Session::Guest => None,
        };

        if let Some(token) = token {
            if let Err(e) = self.timed(self.inner.api.logout(&token)).await {
                warn!(error = %e, "Server logout failed, clearing local session anyway");
            }
        }

        self.clear_local();
        info!("Signed out");
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// `stale` is the access token the caller saw rejected. If another task
    /// already refreshed it, the new token is returned without a request.
    ///
    /// # Errors
    ///
    /// `Auth` if signed out or the refresh fails; on failure the session is
    /// signed out and its persisted copy deleted.
    #[instrument(skip_all)]
    pub async fn refresh(&self, stale: &SecretString) -> Result<SecretString> {
        let _guard = self.inner.refresh_lock.lock().await;

        let refresh_token = match &*self.read() {
            Session::Guest => return Err(StoreError::Auth("not signed in".to_string())),
            Session::Authenticated(session) => {
                if session.tokens.access_token.expose_secret() != stale.expose_secret() {
                    debug!("Token already refreshed by another task");
                    return Ok(session.tokens.access_token.clone());
                }
                session.tokens.refresh_token.clone()
            }
        };

        let result = self
            .timed(self.inner.api.refresh(&refresh_token))
            .await
            .map_err(StoreError::from)
            .and_then(authenticated);

        if !self.holds_refresh_token(&refresh_token) {
            // Signed out or replaced while the request was in flight
            return Err(StoreError::Auth("session changed during refresh".to_string()));
        }

        match result {
            Ok(session) => {
                let access = session.tokens.access_token.clone();
                debug!(user_id = %session.user.id, "Refreshed access token");
                self.install(session);
                Ok(access)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, signing out");
                self.clear_local();
                Err(StoreError::Auth(format!("session refresh failed: {e}")))
            }
        }
    }

    /// Current access token, refreshed first if it is known to be expired.
    ///
    /// # Errors
    ///
    /// `Auth` if signed out or an expired token cannot be refreshed.
    pub async fn access_token(&self) -> Result<SecretString> {
        let (token, expired) = match &*self.read() {
            Session::Guest => return Err(StoreError::Auth("not signed in".to_string())),
            Session::Authenticated(session) => (
                session.tokens.access_token.clone(),
                session.tokens.is_expired(Utc::now()),
            ),
        };

        if expired {
            debug!("Access token expired, refreshing");
            return self.refresh(&token).await;
        }
        Ok(token)
    }

    fn holds_refresh_token(&self, refresh_token: &SecretString) -> bool {
        match &*self.read() {
            Session::Authenticated(session) => {
                session.tokens.refresh_token.expose_secret() == refresh_token.expose_secret()
            }
            Session::Guest => false,
        }
    }
}

fn authenticated(response: TokenResponse) -> Result<AuthenticatedSession> {
    if !response.user.role.is_authenticated() {
        return Err(StoreError::Server(
            "auth endpoint returned a guest identity".to_string(),
        ));
    }
    if response.access_token.is_empty() || response.refresh_token.is_empty() {
        return Err(StoreError::Server("auth endpoint returned an empty token".to_string()));
    }
    Ok(AuthenticatedSession::from_response(response, Utc::now()))
}
