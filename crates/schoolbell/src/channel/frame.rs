//! Wire contract of the push channel.
//!
//! Server → client: each text frame is exactly one JSON-encoded notification.
//! Client → server: opaque keep-alive pings. The backend answers a ping with
//! a literal `pong` text frame, which carries no information.

use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::{BellError, Result};
use crate::model::Notification;

const PONG_REPLY: &str = "pong";

/// What a single inbound frame means to the channel.
#[derive(Debug, PartialEq)]
pub enum Inbound {
    Notification(Box<Notification>),
    /// Keep-alive reply or transport control frame.
    KeepAlive,
    /// The server closed the connection.
    Closed,
}

/// Build the keep-alive frame.
pub fn heartbeat(payload: &str) -> Message {
    Message::text(payload)
}

/// Classify and decode an inbound frame.
pub fn decode(message: &Message) -> Result<Inbound> {
    match message {
        Message::Text(text) => decode_text(text.as_str()),
        Message::Binary(bytes) => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| BellError::protocol(format!("binary frame is not UTF-8: {e}")))?;
            decode_text(text)
        }
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(Inbound::KeepAlive),
        Message::Close(_) => Ok(Inbound::Closed),
    }
}

fn decode_text(text: &str) -> Result<Inbound> {
    let trimmed = text.trim();
    if trimmed == PONG_REPLY {
        return Ok(Inbound::KeepAlive);
    }
    let notification: Notification = serde_json::from_str(trimmed)?;
    Ok(Inbound::Notification(Box::new(notification)))
}
