//! Session identity.
//!
//! Session issuance belongs to the backend's auth service; this module only
//! holds the resulting credential and resolves the identity behind it.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{BellError, Result};
use crate::http::{build_client, ensure_success};

/// Bearer credential plus the identity it belongs to.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub user_id: String,
    pub tenant_id: String,
}

impl Credentials {
    pub fn new(
        token: impl Into<String>,
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Result<Self> {
        let credentials = Self {
            token: token.into(),
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
        };
        if credentials.token.is_empty() {
            return Err(BellError::session("empty bearer token"));
        }
        if credentials.tenant_id.is_empty() {
            return Err(BellError::session("session has no tenant"));
        }
        Ok(credentials)
    }
}

// Keep the token out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

/// Shared holder for the current session credential.
///
/// Cloning yields another handle to the same slot. Clearing it (logout)
/// stops the push channel from reconnecting.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    inner: Arc<RwLock<Option<Credentials>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        let store = Self::new();
        store.set(credentials);
        store
    }

    pub fn set(&self, credentials: Credentials) {
        *self.inner.write() = Some(credentials);
    }

    pub fn clear(&self) {
        self.inner.write().take();
    }

    pub fn current(&self) -> Option<Credentials> {
        self.inner.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.read().as_ref().map(|c| c.token.clone())
    }
}

/// User record returned by `GET /auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Thin client for the backend's auth routes.
#[derive(Debug, Clone)]
pub struct AuthClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl AuthClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self { client, config })
    }

    /// Exchange email and password for a bearer token.
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let url = self.config.rest_url("/auth/login")?;
        debug!(%url, "Logging in");
        let response = self
            .client
            .post(url)
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        let token: TokenResponse = ensure_success(response)?.json().await?;
        Ok(token.access_token)
    }

    /// Resolve the user behind a bearer token.
    pub async fn me(&self, token: &str) -> Result<SessionUser> {
        let url = self.config.rest_url("/auth/me")?;
        let response = self.client.get(url).bearer_auth(token).send().await?;
        Ok(ensure_success(response)?.json().await?)
    }

    /// Build session credentials for `token`.
    pub async fn establish(&self, token: &str) -> Result<Credentials> {
        let user = self.me(token).await?;
        let tenant_id = user
            .tenant_id
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BellError::session(format!("user {} has no tenant", user.id)))?;
        info!(user_id = %user.id, tenant_id = %tenant_id, role = %user.role, "Session established");
        Credentials::new(token, user.id, tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_reject_missing_tenant() {
        assert!(Credentials::new("tok", "u1", "").is_err());
        assert!(Credentials::new("", "u1", "t1").is_err());
        assert!(Credentials::new("tok", "u1", "t1").is_ok());
    }

    #[test]
    fn test_debug_redacts_token() {
        let credentials = Credentials::new("secret-token", "u1", "t1").unwrap();
        let printed = format!("{credentials:?}");
        assert!(!printed.contains("secret-token"));
        assert!(printed.contains("u1"));
    }

    #[test]
    fn test_store_is_shared_between_clones() {
        let store = CredentialStore::new();
        let other = store.clone();
        assert!(other.token().is_none());

        store.set(Credentials::new("tok", "u1", "t1").unwrap());
        assert_eq!(other.token().as_deref(), Some("tok"));

        other.clear();
        assert!(store.current().is_none());
    }
}
