use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use schoolbell::{
    AuthClient, BellError, ChannelStatus, ClientConfig, CredentialStore, FeedScope, FeedSnapshot,
    NotificationApi, NotificationSession, PermissionState, RestNotificationApi,
};
use tracing::{info, warn};

use crate::cli::{AlertMode, OutputFormat};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::notifier::TerminalNotifier;
use crate::output::OutputManager;

pub struct CommandExecutor {
    config: AppConfig,
    output: OutputManager,
}

impl CommandExecutor {
    pub fn new(config: AppConfig, colored: bool) -> Self {
        Self {
            config,
            output: OutputManager::new(colored),
        }
    }

    /// Resolve the configured token into session credentials.
    async fn credentials(&self, client: &ClientConfig) -> Result<CredentialStore> {
        let token = self.config.token()?;
        let auth = AuthClient::new(client.clone())?;
        let credentials = auth.establish(token).await?;
        Ok(CredentialStore::with_credentials(credentials))
    }

    async fn api(&self) -> Result<(RestNotificationApi, FeedScope)> {
        let client = self.config.client_config()?;
        let store = self.credentials(&client).await?;
        let scope = store
            .current()
            .map(|c| FeedScope::from(&c))
            .ok_or_else(|| BellError::session("no credential stored"))?;
        Ok((RestNotificationApi::new(client, store)?, scope))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let auth = AuthClient::new(self.config.client_config()?)?;
        let token = auth.login(email, password).await?;
        let credentials = auth.establish(&token).await?;
        info!(user_id = %credentials.user_id, tenant_id = %credentials.tenant_id, "Signed in");
        println!("{token}");
        Ok(())
    }

    pub async fn list(&self, unread_only: bool, format: OutputFormat) -> Result<()> {
        let (api, scope) = self.api().await?;
        let notifications: Vec<_> = api
            .list()
            .await?
            .into_iter()
            .filter(|n| scope.admits(n))
            .collect();
        let snapshot = FeedSnapshot {
            unread: notifications.iter().filter(|n| !n.read).count(),
            notifications,
        };
        print!(
            "{}",
            self.output
                .format_feed(&snapshot, unread_only, format, Utc::now())?
        );
        if format == OutputFormat::Json {
            println!();
        }
        Ok(())
    }

    pub async fn mark_read(&self, id: &str) -> Result<()> {
        let (api, _) = self.api().await?;
        api.mark_read(id).await.map_err(|e| not_found(e, id))?;
        println!("✓ Marked {id} as read");
        Ok(())
    }

    pub async fn mark_all_read(&self) -> Result<()> {
        let (api, _) = self.api().await?;
        api.mark_all_read().await?;
        println!("✓ Marked all notifications as read");
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let (api, _) = self.api().await?;
        api.delete(id).await.map_err(|e| not_found(e, id))?;
        println!("✓ Deleted {id}");
        Ok(())
    }

    /// Print the feed, then every new arrival until Ctrl-C.
    pub async fn watch(&self, alerts: Option<AlertMode>) -> Result<()> {
        let client = self.config.client_config()?;
        let store = self.credentials(&client).await?;
        let permission = match alerts {
            Some(AlertMode::On) => PermissionState::Granted,
            Some(AlertMode::Off) => PermissionState::Denied,
            Some(AlertMode::Ask) => PermissionState::Default,
            None => self.config.alerts,
        };
        let notifier = Arc::new(TerminalNotifier::new(permission));
        let session = NotificationSession::connect_rest(client, store, notifier)?;

        let mut view = session.engine().subscribe();
        let mut status = session.subscribe_status();
        session.start().await;

        let snapshot = view.borrow_and_update().clone();
        print!(
            "{}",
            self.output
                .format_feed(&snapshot, false, OutputFormat::Pretty, Utc::now())?
        );
        let mut seen: HashSet<String> = snapshot.notifications.iter().map(|n| n.id.clone()).collect();
        let mut unread = snapshot.unread;

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let outcome = loop {
            tokio::select! {
                result = &mut ctrl_c => {
                    info!("Interrupted, closing session");
                    break result.map_err(AppError::from);
                }

                changed = view.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                    let snapshot = view.borrow_and_update().clone();
                    let now = Utc::now();
                    for notification in snapshot.notifications.iter().rev() {
                        if !seen.contains(&notification.id) {
                            print!("{}", self.output.format_notification(notification, now));
                        }
                    }
                    seen = snapshot.notifications.iter().map(|n| n.id.clone()).collect();
                    if snapshot.unread != unread {
                        unread = snapshot.unread;
                        println!("unread: {unread}");
                    }
                }

                changed = status.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                    let current = status.borrow_and_update().clone();
                    eprintln!("{}", self.output.format_status(&current));
                    if current == ChannelStatus::Closed {
                        warn!("Push channel closed");
                        break Err(BellError::connection("push channel closed").into());
                    }
                }
            }
        };

        session.shutdown().await;
        outcome
    }
}

fn not_found(error: BellError, id: &str) -> AppError {
    if error.is_not_found() {
        AppError::NotFound(id.to_string())
    } else {
        error.into()
    }
}
