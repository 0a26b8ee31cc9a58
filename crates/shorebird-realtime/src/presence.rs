//! Presence Registry implementation.
//!
//! Tracks which users currently have a live realtime connection, and holds
//! the outbound channel used to push events to each one.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::event::ServerEvent;
use crate::types::{ConnectionId, UserId};
use crate::UserStore;

/// Presence state for one user identity.
///
/// Entries are created on first join and never removed; unbinding clears the
/// connection and flips the user offline but keeps the last-seen timestamp.
#[derive(Debug)]
struct PresenceEntry {
    /// Currently bound connection, if any
    connection_id: Option<ConnectionId>,
    /// Outbound channel to the bound connection
    sender: Option<mpsc::Sender<ServerEvent>>,
    /// Whether the user is online right now
    is_online: bool,
    /// Last presence transition
    last_seen_at: DateTime<Utc>,
}

/// Read-only view of a user's presence state.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceSnapshot {
    pub connection_id: Option<ConnectionId>,
    pub is_online: bool,
    pub last_seen_at: DateTime<Utc>,
}

/// Result of attempting to push an event to a user's live connection.
#[derive(Debug)]
pub enum SendResult {
    /// Event was queued for delivery
    Sent,
    /// The user has no bound connection
    NotConnected,
    /// The outbound channel is full (backpressure)
    ChannelFull,
    /// The outbound channel is closed; the stale binding was evicted
    ChannelClosed,
}

/// Registry mapping user identities to their live connection.
///
/// Explicitly constructed and shared by reference (`Arc`) with the event
/// router and delivery engine; there is no hidden module-level instance.
/// At most one connection is bound per user: a second `join` from a new
/// device silently rebinds and the earlier connection is dropped from the
/// registry (last bind wins).
///
/// The `is_online` flag is also written through the [`UserStore`] so other
/// parts of the app can read it from the user record. That write is
/// best-effort: a failure is logged and the in-memory transition stands.
pub struct PresenceRegistry<U: UserStore> {
    entries: DashMap<UserId, PresenceEntry>,
    users: Arc<U>,
}

impl<U: UserStore> PresenceRegistry<U> {
    /// Create a new presence registry backed by the given user store.
    pub fn new(users: Arc<U>) -> Self {
        info!("Creating presence registry");
        Self {
            entries: DashMap::new(),
            users,
        }
    }

    /// Bind a user to a live connection and flip them online.
    ///
    /// Overwrites any existing binding for the user (reconnects, or a second
    /// device taking over the session).
    #[instrument(skip(self, sender), fields(user = %user, connection = %connection_id))]
    pub async fn bind(
        &self,
        user: UserId,
        connection_id: ConnectionId,
        sender: mpsc::Sender<ServerEvent>,
    ) {
        let now = Utc::now();
        {
            let mut entry = self
                .entries
                .entry(user.clone())
                .or_insert_with(|| PresenceEntry {
                    connection_id: None,
                    sender: None,
                    is_online: false,
                    last_seen_at: now,
                });
            if entry.connection_id.is_some() {
                debug!("Replaced existing binding (last bind wins)");
            } else {
                debug!("Bound new connection");
            }
            entry.connection_id = Some(connection_id);
            entry.sender = Some(sender);
            entry.is_online = true;
            entry.last_seen_at = now;
        }

        // Best-effort write-through; in-memory state is already committed.
        if let Err(e) = self.users.set_online_status(&user, true).await {
            warn!(error = %e, "Failed to persist online status");
        }
    }

    /// Unbind whichever user owns this connection and flip them offline.
    ///
    /// No-op if the connection was never bound (disconnect before join) or
    /// has been superseded by a rebind — a stale disconnect must not knock a
    /// freshly rebound user offline. Returns the user that was unbound.
    #[instrument(skip(self), fields(connection = %connection_id))]
    pub async fn unbind(&self, connection_id: ConnectionId) -> Option<UserId> {
        let owner = self.entries.iter().find_map(|entry| {
            (entry.value().connection_id == Some(connection_id)).then(|| entry.key().clone())
        });

        let Some(user) = owner else {
            debug!("Connection was not bound");
            return None;
        };

        if let Some(mut entry) = self.entries.get_mut(&user) {
            // Re-check under the entry lock; a rebind may have raced us.
            if entry.connection_id != Some(connection_id) {
                debug!("Binding already superseded");
                return None;
            }
            entry.connection_id = None;
            entry.sender = None;
            entry.is_online = false;
            entry.last_seen_at = Utc::now();
        }
        debug!(user = %user, "Unbound connection");

        if let Err(e) = self.users.set_online_status(&user, false).await {
            warn!(error = %e, "Failed to persist offline status");
        }

        Some(user)
    }

    /// Whether the user currently has a live connection.
    pub fn is_online(&self, user: &UserId) -> bool {
        self.entries
            .get(user)
            .map(|e| e.value().is_online)
            .unwrap_or(false)
    }

    /// The connection currently bound for the user, if any.
    pub fn connection_for(&self, user: &UserId) -> Option<ConnectionId> {
        self.entries.get(user).and_then(|e| e.value().connection_id)
    }

    /// Presence snapshot for a user, or None if they never joined.
    pub fn snapshot(&self, user: &UserId) -> Option<PresenceSnapshot> {
        self.entries.get(user).map(|e| PresenceSnapshot {
            connection_id: e.value().connection_id,
            is_online: e.value().is_online,
            last_seen_at: e.value().last_seen_at,
        })
    }

    /// Number of users with a live connection right now.
    pub fn connected_count(&self) -> usize {
        self.entries.iter().filter(|e| e.value().is_online).count()
    }

    /// Push an event to the user's live connection, if any.
    ///
    /// Uses `try_send`: there is no queue or retry for live events, an
    /// unbound or backpressured recipient simply misses it. A closed channel
    /// means the connection died without unbinding; the stale binding is
    /// evicted on the spot.
    #[instrument(skip(self, event), fields(to = %user, event = event.name()))]
    pub fn send_to(&self, user: &UserId, event: ServerEvent) -> SendResult {
        let sender = match self.entries.get(user) {
            Some(entry) => match entry.value().sender.clone() {
                Some(sender) => sender,
                None => {
                    debug!("Recipient not connected");
                    return SendResult::NotConnected;
                }
            },
            None => {
                debug!("Recipient unknown to registry");
                return SendResult::NotConnected;
            }
        };

        match sender.try_send(event) {
            Ok(()) => {
                debug!("Event queued for delivery");
                SendResult::Sent
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Outbound channel full, dropping live event");
                SendResult::ChannelFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Outbound channel closed, evicting stale binding");
                if let Some(mut entry) = self.entries.get_mut(user) {
                    entry.connection_id = None;
                    entry.sender = None;
                    entry.is_online = false;
                    entry.last_seen_at = Utc::now();
                }
                SendResult::ChannelClosed
            }
        }
    }
}

impl<U: UserStore> fmt::Debug for PresenceRegistry<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}
