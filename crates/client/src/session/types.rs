//! Session types and their persisted forms.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use atelier_core::{Email, Role, UserId};

use crate::api::TokenResponse;

/// Public profile of the signed-in user, as returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDescriptor {
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<Email>,
    pub role: Role,
    pub email_verified: bool,
}

/// Bearer credentials. Both tokens are redacted from `Debug` output.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    /// When the access token stops being accepted, if known.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Whether the access token is known to have expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A signed-in actor. Holding one means both tokens are present.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub user: UserDescriptor,
    pub tokens: Credentials,
}

impl AuthenticatedSession {
    pub(crate) fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let expires_at = response.expires_at(now);
        Self {
            user: response.user,
            tokens: Credentials {
                access_token: SecretString::from(response.access_token),
                refresh_token: SecretString::from(response.refresh_token),
                expires_at,
            },
        }
    }
}

/// The current actor.
#[derive(Debug, Clone, Default)]
pub enum Session {
    /// Anonymous visitor. Holds no tokens.
    #[default]
    Guest,
    Authenticated(AuthenticatedSession),
}

impl Session {
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    #[must_use]
    pub const fn user(&self) -> Option<&UserDescriptor> {
        match self {
            Self::Guest => None,
            Self::Authenticated(session) => Some(&session.user),
        }
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        self.user().map(|user| &user.id)
    }

    /// Role of the current actor; `Guest` when signed out.
    #[must_use]
    pub fn role(&self) -> Role {
        self.user().map_or(Role::Guest, |user| user.role)
    }
}

/// What [`SessionStore::bootstrap`](super::SessionStore::bootstrap) did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// A live session already existed and was left untouched.
    AlreadyAuthenticated,
    /// The persisted session was restored.
    Restored,
    /// Nothing was persisted (or storage was unreadable); signed out.
    NoSession,
    /// Persisted data was corrupt and has been deleted; signed out.
    Recovered,
}

/// Token blob stored under `atelier.auth.tokens`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PersistedCredentials {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl PersistedCredentials {
    pub fn from_credentials(tokens: &Credentials) -> Self {
        Self {
            access_token: tokens.access_token.expose_secret().to_owned(),
            refresh_token: tokens.refresh_token.expose_secret().to_owned(),
            expires_at: tokens.expires_at,
        }
    }

    /// Turn the blob back into credentials, rejecting empty tokens.
    pub fn into_credentials(self) -> Option<Credentials> {
        if self.access_token.trim().is_empty() || self.refresh_token.trim().is_empty() {
            return None;
        }
        Some(Credentials {
            access_token: SecretString::from(self.access_token),
            refresh_token: SecretString::from(self.refresh_token),
            expires_at: self.expires_at,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn credentials(expires_at: Option<DateTime<Utc>>) -> Credentials {
        Credentials {
            access_token: SecretString::from("access-secret".to_string()),
            refresh_token: SecretString::from("refresh-secret".to_string()),
            expires_at,
        }
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", credentials(None));
        assert!(!rendered.contains("access-secret"));
        assert!(!rendered.contains("refresh-secret"));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        assert!(!credentials(None).is_expired(now));
        assert!(credentials(Some(now - Duration::try_seconds(1).unwrap())).is_expired(now));
        assert!(!credentials(Some(now + Duration::try_seconds(60).unwrap())).is_expired(now));
    }

    #[test]
    fn test_empty_tokens_rejected() {
        let blob = PersistedCredentials {
            access_token: String::new(),
            refresh_token: "r".to_string(),
            expires_at: None,
        };
        assert!(blob.into_credentials().is_none());
    }

    #[test]
    fn test_guest_selectors() {
        let session = Session::Guest;
        assert!(!session.is_authenticated());
        assert_eq!(session.role(), Role::Guest);
        assert!(session.user_id().is_none());
    }

    #[test]
    fn test_descriptor_email_is_validated() {
        let raw = r#"{"id":"u_1","display_name":"Layla","email":"not-an-email","role":"client","email_verified":true}"#;
        assert!(serde_json::from_str::<UserDescriptor>(raw).is_err());
    }
}
