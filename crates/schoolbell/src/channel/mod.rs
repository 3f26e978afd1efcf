//! Push channel manager.
//!
//! Keeps one authenticated WebSocket open per session and feeds every decoded
//! notification to an [`InboundSink`]. The connection is driven by a single
//! task running an explicit state machine; each phase owns its timers, so
//! leaving a phase drops them:
//!
//! ```text
//! Connecting ──ok──▶ Open ──lost──▶ Backoff ──timer──▶ Connecting
//!      │ err ───────────────────────▲
//!      └──── shutdown from any phase ──▶ Closing ──▶ Closed
//! ```
//!
//! A missing credential ends the task without retrying; [`PushChannel::connect`]
//! can be called again once a session exists.

pub mod frame;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::auth::CredentialStore;
use crate::config::ClientConfig;
use crate::http::install_rustls_provider;
use crate::model::Notification;

use self::frame::Inbound;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on waiting for the close handshake during shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Receiver of decoded notifications.
pub trait InboundSink: Send + Sync + 'static {
    fn deliver(&self, notification: Notification);
}

/// Connection health, published for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Never started.
    Idle,
    Connecting {
        attempt: u32,
    },
    Open,
    /// Waiting `delay` before reconnection attempt number `attempt`.
    Reconnecting {
        attempt: u32,
        delay: Duration,
    },
    Closing,
    Closed,
}

impl ChannelStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

enum Phase {
    Connecting {
        attempt: u32,
    },
    Open {
        stream: Box<WsStream>,
        heartbeat: Interval,
    },
    Backoff {
        attempt: u32,
        timer: Pin<Box<Sleep>>,
    },
    Closing {
        reconnect: Option<Pin<Box<Sleep>>>,
        heartbeat: Option<Interval>,
        stream: Option<Box<WsStream>>,
    },
    Closed,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Self::Connecting { .. } => "connecting",
            Self::Open { .. } => "open",
            Self::Backoff { .. } => "backoff",
            Self::Closing { .. } => "closing",
            Self::Closed => "closed",
        }
    }
}

/// Owns the push connection for one session.
pub struct PushChannel {
    config: ClientConfig,
    credentials: CredentialStore,
    sink: Arc<dyn InboundSink>,
    status_tx: Arc<watch::Sender<ChannelStatus>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PushChannel {
    pub fn new(
        config: ClientConfig,
        credentials: CredentialStore,
        sink: Arc<dyn InboundSink>,
    ) -> Self {
        let (status_tx, _) = watch::channel(ChannelStatus::Idle);
        Self {
            config,
            credentials,
            sink,
            status_tx: Arc::new(status_tx),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn status(&self) -> ChannelStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ChannelStatus> {
        self.status_tx.subscribe()
    }

    /// Start the connection task.
    ///
    /// Returns false without doing anything when no credential is stored,
    /// when the task is already running, or after [`PushChannel::shutdown`].
    pub fn connect(&self) -> bool {
        if self.cancel.is_cancelled() {
            debug!("Push channel was shut down; not reconnecting");
            return false;
        }
        if self.credentials.token().is_none() {
            debug!("No credential stored; push channel stays closed");
            return false;
        }

        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        install_rustls_provider();
        let supervisor = Supervisor {
            config: self.config.clone(),
            credentials: self.credentials.clone(),
            sink: self.sink.clone(),
            status_tx: self.status_tx.clone(),
            cancel: self.cancel.clone(),
        };
        *task = Some(tokio::spawn(supervisor.run()));
        true
    }

    /// Tear the channel down and wait for the connection task to finish.
    ///
    /// The task cancels the pending reconnect timer, then the heartbeat,
    /// then closes the transport. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
            && !e.is_cancelled()
        {
            error!(error = %e, "Push channel task panicked");
        }
        self.status_tx.send_replace(ChannelStatus::Closed);
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Supervisor {
    config: ClientConfig,
    credentials: CredentialStore,
    sink: Arc<dyn InboundSink>,
    status_tx: Arc<watch::Sender<ChannelStatus>>,
    cancel: CancellationToken,
}

impl Supervisor {
    async fn run(self) {
        let mut phase = Phase::Connecting { attempt: 0 };
        loop {
            trace!(phase = phase.name(), "Push channel transition");
            phase = match phase {
                Phase::Connecting { attempt } => self.connect(attempt).await,
                Phase::Open { stream, heartbeat } => self.pump(stream, heartbeat).await,
                Phase::Backoff { attempt, timer } => self.wait(attempt, timer).await,
                Phase::Closing {
                    reconnect,
                    heartbeat,
                    stream,
                } => self.teardown(reconnect, heartbeat, stream).await,
                Phase::Closed => break,
            };
        }
        self.set_status(ChannelStatus::Closed);
        debug!("Push channel task stopped");
    }

    fn set_status(&self, status: ChannelStatus) {
        self.status_tx.send_replace(status);
    }

    fn closing() -> Phase {
        Phase::Closing {
            reconnect: None,
            heartbeat: None,
            stream: None,
        }
    }

    async fn connect(&self, attempt: u32) -> Phase {
        if self.cancel.is_cancelled() {
            return Self::closing();
        }

        // Re-read on every attempt: a logout clears the store.
        let Some(token) = self.credentials.token() else {
            info!("Credential cleared; push channel will not reconnect");
            return Phase::Closed;
        };
        let url = match self.config.stream_url(&token) {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "Invalid push channel URL");
                return Phase::Closed;
            }
        };

        self.set_status(ChannelStatus::Connecting { attempt });
        debug!(
            host = url.host_str().unwrap_or_default(),
            path = url.path(),
            attempt,
            "Connecting push channel"
        );

        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Self::closing(),

            result = connect_async(url.as_str()) => match result {
                Ok((stream, _)) => {
                    info!("Push channel connected");
                    self.set_status(ChannelStatus::Open);
                    let period = self.config.heartbeat_interval;
                    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
                    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    Phase::Open {
                        stream: Box::new(stream),
                        heartbeat,
                    }
                }
                Err(e) => {
                    warn!(error = %e, attempt, "Push channel connection failed");
                    self.backoff(attempt)
                }
            },
        }
    }

    async fn pump(&self, mut stream: Box<WsStream>, mut heartbeat: Interval) -> Phase {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    return Phase::Closing {
                        reconnect: None,
                        heartbeat: Some(heartbeat),
                        stream: Some(stream),
                    };
                }

                _ = heartbeat.tick() => {
                    let ping = frame::heartbeat(&self.config.heartbeat_payload);
                    if let Err(e) = stream.send(ping).await {
                        warn!(error = %e, "Failed to send heartbeat");
                        break;
                    }
                    trace!("Sent heartbeat");
                }

                next = stream.next() => match next {
                    Some(Ok(message)) => match frame::decode(&message) {
                        Ok(Inbound::Notification(notification)) => {
                            self.sink.deliver(*notification);
                        }
                        Ok(Inbound::KeepAlive) => trace!("Keep-alive frame"),
                        Ok(Inbound::Closed) => {
                            info!("Push channel closed by server");
                            break;
                        }
                        Err(e) => warn!(error = %e, "Dropping malformed push frame"),
                    },
                    Some(Err(e)) => {
                        warn!(error = %e, "Push channel error");
                        break;
                    }
                    None => {
                        info!("Push channel stream ended");
                        break;
                    }
                },
            }
        }

        // The transport is gone; the heartbeat must not outlive it.
        drop(heartbeat);
        drop(stream);
        self.backoff(0)
    }

    fn backoff(&self, attempt: u32) -> Phase {
        let policy = &self.config.reconnect;
        if !policy.allows(attempt) {
            error!(attempts = attempt, "Giving up on push channel reconnection");
            return Phase::Closed;
        }
        let delay = policy.delay_for_attempt(attempt);
        let next = attempt + 1;
        info!(
            attempt = next,
            delay_ms = delay.as_millis() as u64,
            "Scheduling push channel reconnection"
        );
        self.set_status(ChannelStatus::Reconnecting {
            attempt: next,
            delay,
        });
        Phase::Backoff {
            attempt: next,
            timer: Box::pin(tokio::time::sleep(delay)),
        }
    }

    async fn wait(&self, attempt: u32, mut timer: Pin<Box<Sleep>>) -> Phase {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Phase::Closing {
                reconnect: Some(timer),
                heartbeat: None,
                stream: None,
            },

            _ = &mut timer => Phase::Connecting { attempt },
        }
    }

    /// Release everything in a fixed order: reconnect timer, heartbeat, transport.
    async fn teardown(
        &self,
        reconnect: Option<Pin<Box<Sleep>>>,
        heartbeat: Option<Interval>,
        stream: Option<Box<WsStream>>,
    ) -> Phase {
        self.set_status(ChannelStatus::Closing);

        if let Some(timer) = reconnect {
            drop(timer);
            debug!("Cancelled pending reconnection");
        }
        if let Some(heartbeat) = heartbeat {
            drop(heartbeat);
            debug!("Cancelled heartbeat");
        }
        if let Some(mut stream) = stream {
            // Inherent close handshake; `SinkExt::close` would shadow it on the box.
            match tokio::time::timeout(CLOSE_TIMEOUT, (*stream).close(None)).await {
                Ok(Ok(())) => debug!("Push channel closed"),
                Ok(Err(e)) => debug!(error = %e, "Push channel close failed"),
                Err(_) => debug!("Push channel close timed out"),
            }
        }
        Phase::Closed
    }
}
