use std::io::{IsTerminal, Write};

use async_trait::async_trait;
use parking_lot::Mutex;
use schoolbell::{DesktopNotifier, Notification, PermissionState};
use tracing::debug;

/// Alerts by ringing the terminal bell and printing to stderr.
pub struct TerminalNotifier {
    state: Mutex<PermissionState>,
}

impl TerminalNotifier {
    pub fn new(state: PermissionState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    fn alert_line(notification: &Notification) -> String {
        format!(
            "\x07{} {}: {}",
            notification.kind.icon(),
            notification.title,
            notification.message
        )
    }
}

#[async_trait]
impl DesktopNotifier for TerminalNotifier {
    fn permission(&self) -> PermissionState {
        *self.state.lock()
    }

    async fn request_permission(&self) -> PermissionState {
        let mut state = self.state.lock();
        if *state == PermissionState::Default {
            // Nobody to ring for when stderr is redirected.
            *state = if std::io::stderr().is_terminal() {
                PermissionState::Granted
            } else {
                PermissionState::Denied
            };
            debug!(state = ?*state, "Resolved terminal alert permission");
        }
        *state
    }

    fn show(&self, notification: &Notification) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", Self::alert_line(notification));
        let _ = stderr.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schoolbell::NotificationKind;

    #[test]
    fn test_alert_line_rings_bell() {
        let n = Notification::new("n1", "t1", "u1", NotificationKind::Attendance, "Absent", "Period 2");
        assert_eq!(TerminalNotifier::alert_line(&n), "\x07📅 Absent: Period 2");
    }

    #[tokio::test]
    async fn test_decided_permission_is_kept() {
        let notifier = TerminalNotifier::new(PermissionState::Denied);
        assert_eq!(notifier.request_permission().await, PermissionState::Denied);

        let notifier = TerminalNotifier::new(PermissionState::Granted);
        assert_eq!(notifier.request_permission().await, PermissionState::Granted);
    }
}
