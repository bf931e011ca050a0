//! Live channel wire frames.
//!
//! Every frame is a JSON text message `{"event": <name>, "data": <payload>}`.
//! The client joins its room with `join`; the server pushes `new-notification`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ClientError;
use crate::models::notification::Notification;

pub const JOIN_EVENT: &str = "join";
pub const NEW_NOTIFICATION_EVENT: &str = "new-notification";

// ── Frames ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    /// Room registration for the given user.
    pub fn join(user_id: &str) -> Self {
        Self {
            event: JOIN_EVENT.to_string(),
            data: Value::String(user_id.to_string()),
        }
    }
}

// ── Events surfaced to subscribers ────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Room joined. `reconnect` is true for every connection after the first.
    Connected { reconnect: bool },
    Disconnected,
    /// This subscriber fell behind and `skipped` events were dropped.
    Lagged { skipped: u64 },
    Notification(Notification),
}

/// Outcome of decoding one inbound text frame.
#[derive(Debug)]
pub enum Inbound {
    Notification(Notification),
    /// Well-formed frame for an event this client does not handle.
    Ignored(String),
}

/// Decode an inbound frame, validating `new-notification` payloads against the
/// `Notification` schema.
pub fn decode(text: &str) -> Result<Inbound, ClientError> {
    let frame: Frame = serde_json::from_str(text)
        .map_err(|e| ClientError::Malformed(format!("invalid frame: {}", e)))?;

    if frame.event != NEW_NOTIFICATION_EVENT {
        return Ok(Inbound::Ignored(frame.event));
    }

    let notification: Notification = serde_json::from_value(frame.data).map_err(|e| {
        ClientError::Malformed(format!("invalid {} payload: {}", NEW_NOTIFICATION_EVENT, e))
    })?;
    if notification.id.is_empty() {
        return Err(ClientError::Malformed("notification without id".into()));
    }
    Ok(Inbound::Notification(notification))
}
