//! OS-level alerts for freshly pushed notifications.

use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::Notification;

/// Permission to raise platform notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    /// The user has not been asked yet.
    #[default]
    Default,
}

impl PermissionState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Default => 0,
            Self::Granted => 1,
            Self::Denied => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Granted,
            2 => Self::Denied,
            _ => Self::Default,
        }
    }
}

impl std::str::FromStr for PermissionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            "default" => Ok(Self::Default),
            other => Err(format!("unknown permission state: {other}")),
        }
    }
}

/// Platform surface for desktop alerts.
///
/// `permission` is consulted on every delivery, so a revocation takes effect
/// without reconnecting.
#[async_trait]
pub trait DesktopNotifier: Send + Sync {
    /// Current permission state.
    fn permission(&self) -> PermissionState;

    /// Ask the user for permission. Called at most once per session.
    async fn request_permission(&self) -> PermissionState;

    /// Raise an alert for `notification`.
    fn show(&self, notification: &Notification);
}

/// Notifier that records alerts as tracing events.
///
/// `request_permission` resolves a `Default` state to whatever was configured
/// with [`LogNotifier::answer_requests_with`].
#[derive(Debug)]
pub struct LogNotifier {
    state: AtomicU8,
    answer: AtomicU8,
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new(PermissionState::Default)
    }
}

impl LogNotifier {
    pub fn new(initial: PermissionState) -> Self {
        Self {
            state: AtomicU8::new(initial.to_u8()),
            answer: AtomicU8::new(PermissionState::Granted.to_u8()),
        }
    }

    pub fn answer_requests_with(self, answer: PermissionState) -> Self {
        self.answer.store(answer.to_u8(), Ordering::SeqCst);
        self
    }

    /// Change the permission state, e.g. when the user revokes it.
    pub fn set_permission(&self, state: PermissionState) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }
}

#[async_trait]
impl DesktopNotifier for LogNotifier {
    fn permission(&self) -> PermissionState {
        PermissionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    async fn request_permission(&self) -> PermissionState {
        let answer = self.answer.load(Ordering::SeqCst);
        // Only a pending request can change the state.
        let _ = self.state.compare_exchange(
            PermissionState::Default.to_u8(),
            answer,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.permission()
    }

    fn show(&self, notification: &Notification) {
        info!(
            target: "schoolbell::desktop",
            notification_id = %notification.id,
            kind = %notification.kind,
            "{} {}: {}",
            notification.kind.icon(),
            notification.title,
            notification.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_resolves_only_default() {
        let notifier = LogNotifier::default().answer_requests_with(PermissionState::Denied);
        assert_eq!(notifier.permission(), PermissionState::Default);
        assert_eq!(notifier.request_permission().await, PermissionState::Denied);

        let granted = LogNotifier::new(PermissionState::Granted)
            .answer_requests_with(PermissionState::Denied);
        assert_eq!(granted.request_permission().await, PermissionState::Granted);
    }

    #[test]
    fn test_parse_permission() {
        assert_eq!("Granted".parse::<PermissionState>(), Ok(PermissionState::Granted));
        assert_eq!(" denied ".parse::<PermissionState>(), Ok(PermissionState::Denied));
        assert!("maybe".parse::<PermissionState>().is_err());
    }
}
