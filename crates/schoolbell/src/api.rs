//! REST access to the notification store.

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::auth::CredentialStore;
use crate::config::ClientConfig;
use crate::error::{BellError, Result};
use crate::http::{build_client, ensure_success};
use crate::model::Notification;

/// The four notification routes the client consumes.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// `GET /notifications`: every notification for the session user, newest first.
    async fn list(&self) -> Result<Vec<Notification>>;

    /// `PUT /notifications/{id}/read`
    async fn mark_read(&self, id: &str) -> Result<()>;

    /// `PUT /notifications/read-all`
    async fn mark_all_read(&self) -> Result<()>;

    /// `DELETE /notifications/{id}`
    async fn delete(&self, id: &str) -> Result<()>;
}

/// [`NotificationApi`] over HTTP, authenticated with the stored bearer token.
#[derive(Debug, Clone)]
pub struct RestNotificationApi {
    client: reqwest::Client,
    config: ClientConfig,
    credentials: CredentialStore,
}

impl RestNotificationApi {
    pub fn new(config: ClientConfig, credentials: CredentialStore) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self::with_client(client, config, credentials))
    }

    pub fn with_client(
        client: reqwest::Client,
        config: ClientConfig,
        credentials: CredentialStore,
    ) -> Self {
        Self {
            client,
            config,
            credentials,
        }
    }

    fn token(&self) -> Result<String> {
        self.credentials
            .token()
            .ok_or_else(|| BellError::session("no credential stored"))
    }

    fn collection_url(&self) -> Result<Url> {
        self.config.rest_url("/notifications")
    }

    fn item_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.collection_url()?;
        url.path_segments_mut()
            .map_err(|_| BellError::config("base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn put(&self, url: Url) -> Result<()> {
        debug!(%url, "PUT");
        let response = self
            .client
            .put(url)
            .bearer_auth(self.token()?)
            .send()
            .await?;
        ensure_success(response)?;
        Ok(())
    }
}

#[async_trait]
impl NotificationApi for RestNotificationApi {
    async fn list(&self) -> Result<Vec<Notification>> {
        let url = self.collection_url()?;
        debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .bearer_auth(self.token()?)
            .send()
            .await?;
        Ok(ensure_success(response)?.json().await?)
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        self.put(self.item_url(&[id, "read"])?).await
    }

    async fn mark_all_read(&self) -> Result<()> {
        self.put(self.item_url(&["read-all"])?).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let url = self.item_url(&[id])?;
        debug!(%url, "DELETE");
        let response = self
            .client
            .delete(url)
            .bearer_auth(self.token()?)
            .send()
            .await?;
        ensure_success(response)?;
        Ok(())
    }
}
