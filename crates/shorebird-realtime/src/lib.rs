//! # shorebird-realtime
//!
//! Realtime presence & messaging core for Shorebird Social.
//!
//! This crate implements the bidirectional event channel behind the social
//! app: online/offline presence, live chat delivery with the
//! sent -> delivered -> seen state machine, and notification fan-out. It is
//! designed to be embedded in `shorebird-server` for unified deployment.
//!
//! ## Architecture
//!
//! - **Presence Registry**: maps a user identity to at most one live
//!   connection (last bind wins) plus an online flag
//! - **Event Router**: validates the typed event contract at the connection
//!   boundary and drives the per-connection session state machine
//! - **Message Delivery Engine**: persist-then-fan-out chat sends and bulk
//!   seen-marking
//! - **Notification Fan-out**: transport-only push and retraction of
//!   notifications persisted upstream
//!
//! Storage is an external collaborator, consumed through the [`UserStore`]
//! and [`MessageStore`] traits so the core carries no database dependency.
//! Everything runs in a single process; there is no cross-process registry
//! and no durable queue of live events.

pub mod delivery;
pub mod event;
pub mod notify;
pub mod presence;
pub mod router;

mod error;
mod types;

pub use delivery::MessageDeliveryEngine;
pub use error::RealtimeError;
pub use event::{ClientEvent, ServerEvent};
pub use notify::NotificationFanout;
pub use presence::{PresenceRegistry, PresenceSnapshot, SendResult};
pub use router::{ConnectionSession, EventRouter};
pub use types::*;

use std::future::Future;

/// User-identity store collaborator.
///
/// This trait lets `shorebird-server` provide access to the user records
/// without a circular dependency. Presence writes through it are
/// best-effort: a failure is logged and never blocks the in-memory state
/// transition.
pub trait UserStore: Send + Sync + 'static {
    /// Persist the online flag (and last-seen timestamp) on the user record.
    fn set_online_status(
        &self,
        user: &UserId,
        online: bool,
    ) -> impl Future<Output = Result<(), RealtimeError>> + Send;

    /// Look up a user record by id.
    fn find_by_id(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<Option<UserRecord>, RealtimeError>> + Send;
}

/// Chat-message store collaborator.
pub trait MessageStore: Send + Sync + 'static {
    /// Persist a new message with status `sent` and return it in full.
    fn create(
        &self,
        sender: &UserId,
        receiver: &UserId,
        body: &str,
    ) -> impl Future<Output = Result<ChatMessage, RealtimeError>> + Send;

    /// Bulk-advance every not-yet-seen message from `counterpart` to
    /// `viewer` to status `seen`. Returns the number of rows updated.
    fn mark_seen(
        &self,
        counterpart: &UserId,
        viewer: &UserId,
    ) -> impl Future<Output = Result<u64, RealtimeError>> + Send;

    /// Fetch the full two-way history between `a` and `b`, oldest first.
    fn find_conversation(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, RealtimeError>> + Send;
}
