//! The realtime event contract.
//!
//! Every frame on the wire is a JSON envelope `{"event": <name>, "data": ...}`.
//! Inbound frames deserialize into [`ClientEvent`]; outbound frames serialize
//! from [`ServerEvent`]. Dispatching on typed variants instead of raw event
//! names means malformed payloads are rejected at the router boundary and
//! unknown event names simply fail to parse (and are ignored, so newer
//! clients can speak to older servers).

use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, Notification, NotificationKey, UserId};

/// Events a client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Bind this connection to a user identity.
    #[serde(rename_all = "camelCase")]
    Join { user_id: UserId },

    /// Persist a chat message and fan it out to the live parties.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        sender: UserId,
        receiver: UserId,
        message: String,
    },

    /// Mark every message from `sender` to `receiver` as seen.
    ///
    /// `sender` is the counterpart whose messages are now seen; `receiver`
    /// is the viewer doing the seeing.
    #[serde(rename_all = "camelCase")]
    SeenMessages { sender: UserId, receiver: UserId },

    /// Relay an already-persisted notification to its recipient.
    ///
    /// Mostly issued server-internally by the HTTP side after its own
    /// writes commit, but accepted over the wire as well.
    #[serde(rename_all = "camelCase")]
    SendNotification {
        recipient_id: UserId,
        notification: Notification,
    },
}

impl ClientEvent {
    /// Get the event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::SendMessage { .. } => "send_message",
            Self::SeenMessages { .. } => "seen_messages",
            Self::SendNotification { .. } => "send_notification",
        }
    }
}

/// Events the server pushes to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A chat message involving this user was persisted.
    ///
    /// Sent to both the receiver and the sender when bound.
    ReceiveMessage(ChatMessage),

    /// The user identified by `from` has seen this client's messages.
    #[serde(rename_all = "camelCase")]
    MessagesSeen { from: UserId },

    /// Live push of a persisted notification.
    ReceiveNotification(Notification),

    /// Drop a previously delivered notification from the live UI.
    RemoveNotification(NotificationKey),
}

impl ServerEvent {
    /// Get the event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReceiveMessage(_) => "receive_message",
            Self::MessagesSeen { .. } => "messages_seen",
            Self::ReceiveNotification(_) => "receive_notification",
            Self::RemoveNotification(_) => "remove_notification",
        }
    }
}
