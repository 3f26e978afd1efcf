//! Schoolbell: real-time notifications for the school dashboard.
//!
//! Keeps a client-side notification feed consistent with the backend by
//! merging three sources: the REST snapshot, the live push channel, and the
//! user's own mark-read/delete actions.
//!
//! ## Core Types
//!
//! - [`Notification`] - A single notification record
//! - [`NotificationEngine`] - Owns the feed and the unread count
//! - [`PushChannel`] - Self-healing WebSocket for live delivery
//! - [`NotificationSession`] - Wires the above together for one user
//!
//! ## Seams
//!
//! - [`NotificationApi`] - REST routes, [`RestNotificationApi`] over HTTP
//! - [`DesktopNotifier`] - Platform alerts, [`LogNotifier`] as the default
//! - [`InboundSink`] - Where the push channel hands decoded notifications

pub mod api;
pub mod auth;
pub mod channel;
pub mod config;
pub mod desktop;
pub mod engine;
pub mod error;
pub mod feed;
pub mod http;
pub mod model;
pub mod session;

pub use api::{NotificationApi, RestNotificationApi};
pub use auth::{AuthClient, CredentialStore, Credentials, SessionUser};
pub use channel::{ChannelStatus, InboundSink, PushChannel};
pub use config::{ClientConfig, ReconnectPolicy};
pub use desktop::{DesktopNotifier, LogNotifier, PermissionState};
pub use engine::NotificationEngine;
pub use error::{BellError, Result};
pub use feed::{FeedScope, FeedSnapshot, Received};
pub use model::{Notification, NotificationKind, badge_label};
pub use session::NotificationSession;
