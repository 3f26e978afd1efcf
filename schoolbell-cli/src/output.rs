use chrono::{DateTime, Utc};
#[cfg(feature = "colored-output")]
use colored::*;
use schoolbell::{ChannelStatus, FeedSnapshot, Notification, badge_label};

use crate::{cli::OutputFormat, error::Result};

pub struct OutputManager {
    colored: bool,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    pub fn format_feed(
        &self,
        snapshot: &FeedSnapshot,
        unread_only: bool,
        format: OutputFormat,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let shown: Vec<&Notification> = snapshot
            .notifications
            .iter()
            .filter(|n| !unread_only || !n.read)
            .collect();

        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&serde_json::json!({
                "unread": snapshot.unread,
                "notifications": shown,
            }))?),
            OutputFormat::Pretty => Ok(self.format_pretty(&shown, snapshot.unread, now)),
        }
    }

    fn format_pretty(&self, shown: &[&Notification], unread: usize, now: DateTime<Utc>) -> String {
        let mut output = self.format_header(unread);
        output.push('\n');

        if shown.is_empty() {
            output.push_str(&self.colorize("  No notifications", Color::Dimmed, false));
            output.push('\n');
            return output;
        }

        for notification in shown {
            output.push_str(&self.format_notification(notification, now));
        }
        output
    }

    fn format_header(&self, unread: usize) -> String {
        let badge = badge_label(unread);
        let title = self.colorize("Notifications", Color::Green, true);
        if badge.is_empty() {
            title
        } else {
            format!("{title} {}", self.colorize(&format!("({badge})"), Color::Yellow, true))
        }
    }

    /// Two lines per notification: icon, title and age, then the message.
    pub fn format_notification(&self, notification: &Notification, now: DateTime<Utc>) -> String {
        let marker = if notification.read { " " } else { "●" };
        let title = self.colorize(&notification.title, Color::Cyan, !notification.read);
        let age = self.colorize(&notification.relative_age(now), Color::Dimmed, false);
        format!(
            "{} {} {}  {}  [{}]\n    {}\n",
            self.colorize(marker, Color::Blue, false),
            notification.kind.icon(),
            title,
            age,
            notification.id,
            notification.message,
        )
    }

    pub fn format_status(&self, status: &ChannelStatus) -> String {
        let text = match status {
            ChannelStatus::Idle => "idle".to_string(),
            ChannelStatus::Connecting { attempt: 0 } => "connecting".to_string(),
            ChannelStatus::Connecting { attempt } => format!("connecting (attempt {attempt})"),
            ChannelStatus::Open => "live".to_string(),
            ChannelStatus::Reconnecting { attempt, delay } => {
                format!("reconnecting in {:.1}s (attempt {attempt})", delay.as_secs_f64())
            }
            ChannelStatus::Closing => "closing".to_string(),
            ChannelStatus::Closed => "offline".to_string(),
        };
        let color = if status.is_open() {
            Color::Green
        } else {
            Color::Yellow
        };
        format!("{} {}", self.colorize("push:", Color::Dimmed, false), self.colorize(&text, color, false))
    }

    fn colorize(&self, text: &str, color: Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let colored_text = match color {
                    Color::Green => text.green(),
                    Color::Yellow => text.yellow(),
                    Color::Blue => text.blue(),
                    Color::Cyan => text.cyan(),
                    Color::Dimmed => text.dimmed(),
                };
                if bold {
                    colored_text.bold().to_string()
                } else {
                    colored_text.to_string()
                }
            } else {
                text.to_string()
            }
        }

        #[cfg(not(feature = "colored-output"))]
        {
            let _ = (color, bold, self.colored);
            text.to_string()
        }
    }
}

#[derive(Clone, Copy)]
enum Color {
    Green,
    Yellow,
    Blue,
    Cyan,
    Dimmed,
}
