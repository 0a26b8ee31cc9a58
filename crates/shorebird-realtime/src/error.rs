//! Error types for the realtime core.

use thiserror::Error;

/// Realtime core errors.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// A user identity failed the format check
    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),

    /// A store (messages, users, notifications) operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// An event payload could not be encoded for the wire
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RealtimeError {
    /// Create a new invalid-user-id error.
    pub fn invalid_user_id(id: impl Into<String>) -> Self {
        Self::InvalidUserId(id.into())
    }

    /// Create a new store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
