//! Notification records as served by the backend.
//!
//! The same JSON shape arrives from both `GET /notifications` and the push
//! channel, so a single type covers both sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a notification. Drives iconography only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Assignment,
    Fee,
    Attendance,
    /// Platform announcements. Unknown categories are folded in here so a new
    /// server-side category never makes a record undecodable.
    #[serde(other)]
    System,
}

impl NotificationKind {
    /// Glyph shown next to the notification title.
    pub fn icon(self) -> &'static str {
        match self {
            Self::Assignment => "📚",
            Self::Fee => "💰",
            Self::Attendance => "📅",
            Self::System => "🔔",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::Fee => "fee",
            Self::Attendance => "attendance",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Opaque identifier, stable for the record's lifetime
    pub id: String,
    /// Tenant (school) the record belongs to
    pub tenant_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Recipient
    pub user_id: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Create a new unread notification stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            title: title.into(),
            message: message.into(),
            kind,
            user_id: user_id.into(),
            read: false,
            created_at: Utc::now(),
        }
    }

    /// Set the read flag.
    pub fn with_read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    /// Set the creation timestamp.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Whether this record may be shown to the given session identity.
    pub fn is_addressed_to(&self, tenant_id: &str, user_id: &str) -> bool {
        !self.tenant_id.is_empty() && self.tenant_id == tenant_id && self.user_id == user_id
    }

    /// Human-friendly age relative to `now` ("Just now", "5m ago", "3h ago",
    /// "2d ago", or a calendar date once older than a week).
    pub fn relative_age(&self, now: DateTime<Utc>) -> String {
        let elapsed = now.signed_duration_since(self.created_at);
        let mins = elapsed.num_minutes();
        let hours = elapsed.num_hours();
        let days = elapsed.num_days();

        if mins < 1 {
            "Just now".to_string()
        } else if mins < 60 {
            format!("{mins}m ago")
        } else if hours < 24 {
            format!("{hours}h ago")
        } else if days < 7 {
            format!("{days}d ago")
        } else {
            self.created_at.format("%Y-%m-%d").to_string()
        }
    }
}

/// Badge text for an unread count; empty when nothing is unread.
pub fn badge_label(unread: usize) -> String {
    match unread {
        0 => String::new(),
        1..=9 => unread.to_string(),
        _ => "9+".to_string(),
    }
}
