//! Session orchestration.
//!
//! Wires the reconciliation engine, the push channel and the desktop
//! notifier together for one signed-in user.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::{debug, info};

use crate::api::{NotificationApi, RestNotificationApi};
use crate::auth::CredentialStore;
use crate::channel::{ChannelStatus, InboundSink, PushChannel};
use crate::config::ClientConfig;
use crate::desktop::{DesktopNotifier, PermissionState};
use crate::engine::NotificationEngine;
use crate::error::{BellError, Result};
use crate::feed::FeedScope;
use crate::model::Notification;

/// Routes pushed notifications into the engine and raises desktop alerts.
struct Dispatcher {
    engine: Arc<NotificationEngine>,
    notifier: Arc<dyn DesktopNotifier>,
}

impl InboundSink for Dispatcher {
    fn deliver(&self, notification: Notification) {
        let alert = notification.clone();
        if !self.engine.receive(notification) {
            return;
        }
        // Checked per delivery so a revoked permission applies immediately.
        if self.notifier.permission() == PermissionState::Granted {
            self.notifier.show(&alert);
        }
    }
}

/// Notification subsystem for one signed-in user.
pub struct NotificationSession {
    engine: Arc<NotificationEngine>,
    channel: PushChannel,
    notifier: Arc<dyn DesktopNotifier>,
    credentials: CredentialStore,
    permission_requested: AtomicBool,
}

impl NotificationSession {
    /// Create a session over an arbitrary [`NotificationApi`].
    ///
    /// Fails when no credential is stored: the session's scope comes from it.
    pub fn new(
        config: ClientConfig,
        credentials: CredentialStore,
        api: Arc<dyn NotificationApi>,
        notifier: Arc<dyn DesktopNotifier>,
    ) -> Result<Self> {
        config.validate()?;
        let current = credentials
            .current()
            .ok_or_else(|| BellError::session("no credential stored"))?;

        let engine = Arc::new(NotificationEngine::new(api, FeedScope::from(&current)));
        let sink = Arc::new(Dispatcher {
            engine: engine.clone(),
            notifier: notifier.clone(),
        });
        let channel = PushChannel::new(config, credentials.clone(), sink);

        Ok(Self {
            engine,
            channel,
            notifier,
            credentials,
            permission_requested: AtomicBool::new(false),
        })
    }

    /// Create a session talking to the backend over HTTP.
    pub fn connect_rest(
        config: ClientConfig,
        credentials: CredentialStore,
        notifier: Arc<dyn DesktopNotifier>,
    ) -> Result<Self> {
        let api = RestNotificationApi::new(config.clone(), credentials.clone())?;
        Self::new(config, credentials, Arc::new(api), notifier)
    }

    /// Start the session: settle the desktop permission, load the snapshot,
    /// then open the push channel.
    ///
    /// Returns whether the push channel was started.
    pub async fn start(&self) -> bool {
        self.ensure_permission().await;
        self.engine.refresh().await;
        let started = self.channel.connect();
        info!(
            unread = self.engine.unread_count(),
            push = started,
            "Notification session started"
        );
        started
    }

    async fn ensure_permission(&self) {
        if self.permission_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.notifier.permission() == PermissionState::Default {
            let state = self.notifier.request_permission().await;
            debug!(?state, "Desktop notification permission requested");
        }
    }

    pub fn engine(&self) -> &Arc<NotificationEngine> {
        &self.engine
    }

    pub fn channel_status(&self) -> ChannelStatus {
        self.channel.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ChannelStatus> {
        self.channel.subscribe_status()
    }

    /// End the session: tear the channel down, then drop the feed.
    pub async fn shutdown(&self) {
        self.channel.shutdown().await;
        self.engine.teardown();
        info!("Notification session ended");
    }

    /// Forget the credential and end the session.
    pub async fn logout(&self) {
        self.credentials.clear();
        self.shutdown().await;
    }
}
