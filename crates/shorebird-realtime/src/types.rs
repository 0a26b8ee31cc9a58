//! Domain types shared across the realtime core.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::RealtimeError;

/// Maximum accepted length of a user identity string.
pub const MAX_USER_ID_LEN: usize = 64;

/// A validated user identity.
///
/// Identities are opaque strings issued by the identity store; this core only
/// enforces their shape (non-empty, bounded length, restricted alphabet).
/// Whether the user actually exists is the identity store's concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Parse and validate a user identity.
    pub fn parse(s: impl Into<String>) -> Result<Self, RealtimeError> {
        let s = s.into();
        if s.is_empty() || s.len() > MAX_USER_ID_LEN {
            return Err(RealtimeError::invalid_user_id(s));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'))
        {
            return Err(RealtimeError::invalid_user_id(s));
        }
        Ok(Self(s))
    }

    /// Get the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Deserialization goes through `parse` so malformed identities are rejected
// at the router boundary rather than surfacing downstream.
impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        UserId::parse(s).map_err(serde::de::Error::custom)
    }
}

/// Identifier of a single live realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh connection id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Delivery state of a chat message.
///
/// The state only moves forward: sent -> delivered -> seen. `Delivered` is
/// part of the data model but no current flow sets it; the send path leaves
/// messages at `Sent` and `seen_messages` jumps them straight to `Seen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Seen,
}

impl MessageStatus {
    /// Stable string form used in storage and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Seen => "seen",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Sent => 0,
            Self::Delivered => 1,
            Self::Seen => 2,
        }
    }

    /// Whether a transition to `next` moves the state forward.
    ///
    /// Status never regresses; stores use this to guard bulk updates.
    pub fn can_advance_to(&self, next: MessageStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl FromStr for MessageStatus {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "seen" => Ok(Self::Seen),
            other => Err(RealtimeError::store(format!(
                "unknown message status: {other}"
            ))),
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted chat message.
///
/// Body, sender, and receiver are immutable after creation; only `status`
/// moves, and only forward. Both parties of the conversation may query it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message id (UUID v7, time-sortable)
    pub id: String,
    /// Sending user
    pub sender: UserId,
    /// Receiving user
    pub receiver: UserId,
    /// Message body
    #[serde(rename = "message")]
    pub body: String,
    /// Delivery state
    pub status: MessageStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// A notification already persisted upstream, carried to a live connection.
///
/// This core transports notifications; it does not create them. The payload
/// mirrors what the notification store writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Notification id
    pub id: String,
    /// Recipient user
    pub recipient: UserId,
    /// Notification kind (e.g. "friend_request", "friend_accept")
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable message
    pub message: String,
    /// Id of the originating object (e.g. the friend request), used for retraction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Retraction key for a previously delivered notification.
///
/// Instructs the client to drop the matching notification from its live UI.
/// Best-effort only; durable removal happens upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationKey {
    /// Id of the originating object
    pub request_id: String,
    /// Notification kind
    #[serde(rename = "type")]
    pub kind: String,
}

/// A user record as seen by the identity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: UserId,
    pub display_name: Option<String>,
    pub is_online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_accepts_common_shapes() {
        for id in ["alice", "6650f1e2a1b2c3d4e5f60789", "did:plc:abc-123", "a.b_c"] {
            assert!(UserId::parse(id).is_ok(), "expected {id} to parse");
        }
    }

    #[test]
    fn test_user_id_rejects_malformed() {
        assert!(UserId::parse("").is_err());
        assert!(UserId::parse("has space").is_err());
        assert!(UserId::parse("new\nline").is_err());
        assert!(UserId::parse("x".repeat(MAX_USER_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_user_id_deserialize_validates() {
        let ok: Result<UserId, _> = serde_json::from_str(r#""alice""#);
        assert!(ok.is_ok());

        let bad: Result<UserId, _> = serde_json::from_str(r#""not a valid id!""#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_status_is_monotonic() {
        assert!(MessageStatus::Sent.can_advance_to(MessageStatus::Seen));
        assert!(MessageStatus::Sent.can_advance_to(MessageStatus::Delivered));
        assert!(MessageStatus::Delivered.can_advance_to(MessageStatus::Seen));
        assert!(!MessageStatus::Seen.can_advance_to(MessageStatus::Sent));
        assert!(!MessageStatus::Seen.can_advance_to(MessageStatus::Delivered));
        assert!(!MessageStatus::Sent.can_advance_to(MessageStatus::Sent));
    }

    #[test]
    fn test_status_round_trips_through_storage_form() {
        for status in [
            MessageStatus::Sent,
            MessageStatus::Delivered,
            MessageStatus::Seen,
        ] {
            assert_eq!(status.as_str().parse::<MessageStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_chat_message_wire_shape() {
        let msg = ChatMessage {
            id: "0193e5a0-0000-7000-8000-000000000000".to_string(),
            sender: UserId::parse("u1").unwrap(),
            receiver: UserId::parse("u2").unwrap(),
            body: "hi".to_string(),
            status: MessageStatus::Sent,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["message"], "hi");
        assert_eq!(json["status"], "sent");
        assert_eq!(json["sender"], "u1");
        assert!(json["createdAt"].is_string());
    }
}
