//! Notification fan-out.
//!
//! Pushes persisted notifications to the recipient's live connection and
//! retracts ones that became stale (a cancelled friend request, for
//! instance) so open clients can drop them from their tray.

use std::sync::Arc;

use tracing::instrument;

use crate::event::ServerEvent;
use crate::presence::{PresenceRegistry, SendResult};
use crate::types::{Notification, NotificationKey, UserId};
use crate::UserStore;

/// Live push side of the notification pipeline.
///
/// The caller persists the notification first; fan-out only covers the
/// recipient's current connection. An offline recipient misses the push and
/// picks the notification up from storage on their next fetch, so every
/// method here is infallible best-effort.
pub struct NotificationFanout<U: UserStore> {
    presence: Arc<PresenceRegistry<U>>,
}

impl<U: UserStore> NotificationFanout<U> {
    pub fn new(presence: Arc<PresenceRegistry<U>>) -> Self {
        Self { presence }
    }

    /// Push a notification to the recipient's live connection, if any.
    #[instrument(skip(self, notification), fields(recipient = %recipient))]
    pub fn deliver(&self, recipient: &UserId, notification: Notification) -> SendResult {
        self.presence
            .send_to(recipient, ServerEvent::ReceiveNotification(notification))
    }

    /// Tell the recipient's live connection to drop a stale notification.
    #[instrument(skip(self, key), fields(recipient = %recipient))]
    pub fn retract(&self, recipient: &UserId, key: NotificationKey) -> SendResult {
        self.presence
            .send_to(recipient, ServerEvent::RemoveNotification(key))
    }
}
