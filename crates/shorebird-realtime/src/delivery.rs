//! Message Delivery Engine.
//!
//! Persist-then-fan-out: a chat message is written to the store first, and
//! only on success pushed to the live connections of both participants.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::event::ServerEvent;
use crate::presence::PresenceRegistry;
use crate::types::{ChatMessage, UserId};
use crate::{MessageStore, RealtimeError, UserStore};

/// Orchestrates chat message persistence and live fan-out.
///
/// Live delivery is best-effort: an offline recipient simply does not get
/// the push and sees the message on their next history fetch. Persistence
/// is not — a store failure aborts the send and nothing is emitted.
pub struct MessageDeliveryEngine<U: UserStore, M: MessageStore> {
    presence: Arc<PresenceRegistry<U>>,
    messages: Arc<M>,
}

impl<U: UserStore, M: MessageStore> MessageDeliveryEngine<U, M> {
    pub fn new(presence: Arc<PresenceRegistry<U>>, messages: Arc<M>) -> Self {
        Self { presence, messages }
    }

    /// Persist a new message and push it to both participants.
    ///
    /// The receiver is pushed first, then the sender gets the same stored
    /// message echoed back so their view carries the canonical id and
    /// timestamp. The stored status stays `sent` even when the receiver is
    /// online; only a seen acknowledgement advances it, so messages jump
    /// straight from `sent` to `seen`.
    #[instrument(skip(self, body), fields(sender = %sender, receiver = %receiver))]
    pub async fn send(
        &self,
        sender: &UserId,
        receiver: &UserId,
        body: &str,
    ) -> Result<ChatMessage, RealtimeError> {
        let message = self.messages.create(sender, receiver, body).await?;
        debug!(message_id = %message.id, "Stored message");

        self.presence
            .send_to(receiver, ServerEvent::ReceiveMessage(message.clone()));
        self.presence
            .send_to(sender, ServerEvent::ReceiveMessage(message.clone()));

        Ok(message)
    }

    /// Record that `viewer` has seen every message from `counterpart`.
    ///
    /// Advances the stored status, then notifies the counterpart's live
    /// connection so they can render read receipts. The notification is
    /// emitted even when no rows changed; it is idempotent on the client.
    #[instrument(skip(self), fields(viewer = %viewer, counterpart = %counterpart))]
    pub async fn mark_seen(
        &self,
        viewer: &UserId,
        counterpart: &UserId,
    ) -> Result<u64, RealtimeError> {
        let updated = self.messages.mark_seen(counterpart, viewer).await?;
        debug!(updated, "Marked messages seen");

        self.presence.send_to(
            counterpart,
            ServerEvent::MessagesSeen {
                from: viewer.clone(),
            },
        );

        Ok(updated)
    }

    /// Fetch the two-way history between `viewer` and `peer`, oldest first.
    ///
    /// Opening a conversation implies reading it, so messages from the peer
    /// are marked seen before the history is returned.
    #[instrument(skip(self), fields(viewer = %viewer, peer = %peer))]
    pub async fn conversation(
        &self,
        viewer: &UserId,
        peer: &UserId,
    ) -> Result<Vec<ChatMessage>, RealtimeError> {
        self.messages.mark_seen(peer, viewer).await?;
        self.messages.find_conversation(viewer, peer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemoryMessageStore, MemoryUserStore};
    use crate::types::{ConnectionId, MessageStatus};
    use tokio::sync::mpsc;

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    struct Fixture {
        presence: Arc<PresenceRegistry<MemoryUserStore>>,
        messages: Arc<MemoryMessageStore>,
        engine: MessageDeliveryEngine<MemoryUserStore, MemoryMessageStore>,
    }

    fn fixture() -> Fixture {
        let presence = Arc::new(PresenceRegistry::new(Arc::new(MemoryUserStore::new())));
        let messages = Arc::new(MemoryMessageStore::new());
        let engine = MessageDeliveryEngine::new(Arc::clone(&presence), Arc::clone(&messages));
        Fixture {
            presence,
            messages,
            engine,
        }
    }

    async fn connect(
        fx: &Fixture,
        id: &str,
    ) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(16);
        fx.presence.bind(user(id), ConnectionId::new(), tx).await;
        rx
    }

    #[tokio::test]
    async fn test_send_persists_and_fans_out_to_both() {
        let fx = fixture();
        let mut alice_rx = connect(&fx, "alice").await;
        let mut bob_rx = connect(&fx, "bob").await;

        let stored = fx.engine.send(&user("alice"), &user("bob"), "hello").await.unwrap();
        assert_eq!(stored.status, MessageStatus::Sent);

        let to_bob = bob_rx.recv().await.unwrap();
        let to_alice = alice_rx.recv().await.unwrap();
        match (to_bob, to_alice) {
            (ServerEvent::ReceiveMessage(b), ServerEvent::ReceiveMessage(a)) => {
                // Both sides get the same stored message.
                assert_eq!(a.id, stored.id);
                assert_eq!(b.id, stored.id);
                assert_eq!(b.body, "hello");
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_to_offline_receiver_still_persists() {
        let fx = fixture();
        let mut alice_rx = connect(&fx, "alice").await;

        let stored = fx.engine.send(&user("alice"), &user("bob"), "hello").await.unwrap();

        // Status does not advance to delivered; the receiver being offline
        // or online makes no difference to the stored record.
        assert_eq!(stored.status, MessageStatus::Sent);
        assert_eq!(fx.messages.messages.lock().unwrap().len(), 1);
        assert!(alice_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_send_store_failure_emits_nothing() {
        let fx = fixture();
        let mut alice_rx = connect(&fx, "alice").await;
        let mut bob_rx = connect(&fx, "bob").await;
        fx.messages.fail_create(true);

        let result = fx.engine.send(&user("alice"), &user("bob"), "hello").await;
        assert!(result.is_err());
        assert!(alice_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mark_seen_advances_only_one_direction() {
        let fx = fixture();
        fx.engine.send(&user("alice"), &user("bob"), "one").await.unwrap();
        fx.engine.send(&user("bob"), &user("alice"), "two").await.unwrap();

        // Bob reads his conversation with Alice.
        let updated = fx.engine.mark_seen(&user("bob"), &user("alice")).await.unwrap();
        assert_eq!(updated, 1);

        let messages = fx.messages.messages.lock().unwrap();
        let from_alice = messages.iter().find(|m| m.sender == user("alice")).unwrap();
        let from_bob = messages.iter().find(|m| m.sender == user("bob")).unwrap();
        assert_eq!(from_alice.status, MessageStatus::Seen);
        assert_eq!(from_bob.status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn test_mark_seen_notifies_counterpart() {
        let fx = fixture();
        let mut alice_rx = connect(&fx, "alice").await;
        fx.engine.send(&user("alice"), &user("bob"), "hi").await.unwrap();
        let _ = alice_rx.recv().await; // sender echo

        fx.engine.mark_seen(&user("bob"), &user("alice")).await.unwrap();

        match alice_rx.recv().await.unwrap() {
            ServerEvent::MessagesSeen { from } => assert_eq!(from, user("bob")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mark_seen_is_idempotent() {
        let fx = fixture();
        fx.engine.send(&user("alice"), &user("bob"), "hi").await.unwrap();

        assert_eq!(fx.engine.mark_seen(&user("bob"), &user("alice")).await.unwrap(), 1);
        assert_eq!(fx.engine.mark_seen(&user("bob"), &user("alice")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_conversation_marks_incoming_seen() {
        let fx = fixture();
        fx.engine.send(&user("alice"), &user("bob"), "one").await.unwrap();
        fx.engine.send(&user("bob"), &user("alice"), "two").await.unwrap();

        let history = fx.engine.conversation(&user("bob"), &user("alice")).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].body, "one");
        assert_eq!(history[0].status, MessageStatus::Seen);
        // Bob's own outgoing message is untouched.
        assert_eq!(history[1].status, MessageStatus::Sent);
    }
}
