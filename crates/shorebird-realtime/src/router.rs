//! Per-connection session state and inbound event dispatch.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::delivery::MessageDeliveryEngine;
use crate::event::{ClientEvent, ServerEvent};
use crate::notify::NotificationFanout;
use crate::presence::PresenceRegistry;
use crate::types::{ConnectionId, UserId};
use crate::{MessageStore, UserStore};

/// State carried by one realtime connection.
///
/// A fresh connection is anonymous; the first `join` binds it to a user
/// identity. The outbound channel is handed to the presence registry at
/// bind time so other components can push events to this connection.
pub struct ConnectionSession {
    id: ConnectionId,
    user: Option<UserId>,
    outbound: mpsc::Sender<ServerEvent>,
}

impl ConnectionSession {
    pub fn new(outbound: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            id: ConnectionId::new(),
            user: None,
            outbound,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The identity bound to this connection, if it has joined.
    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }
}

/// Dispatches inbound client events against the realtime components.
///
/// One router instance is shared by every connection; the per-connection
/// state lives in [`ConnectionSession`]. A faulty event never tears the
/// connection down: malformed frames, unknown event names, and store
/// failures are logged and the connection keeps serving.
pub struct EventRouter<U: UserStore, M: MessageStore> {
    presence: Arc<PresenceRegistry<U>>,
    delivery: Arc<MessageDeliveryEngine<U, M>>,
    notifications: Arc<NotificationFanout<U>>,
}

impl<U: UserStore, M: MessageStore> EventRouter<U, M> {
    pub fn new(
        presence: Arc<PresenceRegistry<U>>,
        delivery: Arc<MessageDeliveryEngine<U, M>>,
        notifications: Arc<NotificationFanout<U>>,
    ) -> Self {
        Self {
            presence,
            delivery,
            notifications,
        }
    }

    /// Handle one raw text frame from the connection.
    ///
    /// Frames that do not parse into a known event are dropped with a log
    /// line; deserialization also rejects malformed user ids, so nothing
    /// past this point needs to re-validate them.
    #[instrument(skip(self, session, raw), fields(connection = %session.id))]
    pub async fn handle_frame(&self, session: &mut ConnectionSession, raw: &str) {
        match serde_json::from_str::<ClientEvent>(raw) {
            Ok(event) => self.handle(session, event).await,
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable frame");
            }
        }
    }

    /// Dispatch one already-parsed client event.
    #[instrument(skip(self, session, event), fields(connection = %session.id, event = event.name()))]
    pub async fn handle(&self, session: &mut ConnectionSession, event: ClientEvent) {
        // Everything but a join requires a bound identity.
        if session.user.is_none() && !matches!(event, ClientEvent::Join { .. }) {
            debug!("Dropping event from unbound connection");
            return;
        }

        match event {
            ClientEvent::Join { user_id } => {
                // A session switching identity must release the old binding
                // first, or the old user stays online with this connection's
                // sender and keeps receiving the new user's traffic.
                if let Some(prev) = &session.user {
                    if *prev != user_id {
                        debug!(from = %prev, to = %user_id, "Session switching identity");
                        self.presence.unbind(session.id).await;
                    }
                }
                self.presence
                    .bind(user_id.clone(), session.id, session.outbound.clone())
                    .await;
                session.user = Some(user_id);
            }
            ClientEvent::SendMessage {
                sender,
                receiver,
                message,
            } => {
                if let Err(e) = self.delivery.send(&sender, &receiver, &message).await {
                    warn!(error = %e, sender = %sender, "Failed to deliver message");
                }
            }
            ClientEvent::SeenMessages { sender, receiver } => {
                // `receiver` is the viewer acknowledging `sender`'s messages.
                if let Err(e) = self.delivery.mark_seen(&receiver, &sender).await {
                    warn!(error = %e, viewer = %receiver, "Failed to mark messages seen");
                }
            }
            ClientEvent::SendNotification {
                recipient_id,
                notification,
            } => {
                self.notifications.deliver(&recipient_id, notification);
            }
        }
    }

    /// Tear down the session's presence binding when the connection closes.
    #[instrument(skip(self, session), fields(connection = %session.id))]
    pub async fn disconnect(&self, session: &ConnectionSession) {
        if let Some(user) = self.presence.unbind(session.id).await {
            debug!(user = %user, "Connection disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemoryMessageStore, MemoryUserStore};
    use crate::types::MessageStatus;
    use tokio::sync::mpsc::Receiver;

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    struct Fixture {
        presence: Arc<PresenceRegistry<MemoryUserStore>>,
        messages: Arc<MemoryMessageStore>,
        router: EventRouter<MemoryUserStore, MemoryMessageStore>,
    }

    fn fixture() -> Fixture {
        let presence = Arc::new(PresenceRegistry::new(Arc::new(MemoryUserStore::new())));
        let messages = Arc::new(MemoryMessageStore::new());
        let delivery = Arc::new(MessageDeliveryEngine::new(
            Arc::clone(&presence),
            Arc::clone(&messages),
        ));
        let notifications = Arc::new(NotificationFanout::new(Arc::clone(&presence)));
        let router = EventRouter::new(Arc::clone(&presence), delivery, notifications);
        Fixture {
            presence,
            messages,
            router,
        }
    }

    fn session() -> (ConnectionSession, Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (ConnectionSession::new(tx), rx)
    }

    async fn join(fx: &Fixture, session: &mut ConnectionSession, id: &str) {
        fx.router
            .handle(session, ClientEvent::Join { user_id: user(id) })
            .await;
    }

    #[tokio::test]
    async fn test_join_binds_session_and_presence() {
        let fx = fixture();
        let (mut session, _rx) = session();

        join(&fx, &mut session, "alice").await;

        assert_eq!(session.user(), Some(&user("alice")));
        assert!(fx.presence.is_online(&user("alice")));
        assert_eq!(fx.presence.connection_for(&user("alice")), Some(session.id()));
    }

    #[tokio::test]
    async fn test_events_before_join_are_ignored() {
        let fx = fixture();
        let (mut session, _rx) = session();

        fx.router
            .handle(
                &mut session,
                ClientEvent::SendMessage {
                    sender: user("alice"),
                    receiver: user("bob"),
                    message: "hi".to_string(),
                },
            )
            .await;

        assert!(fx.messages.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_two_user_message_exchange() {
        let fx = fixture();
        let (mut alice, mut alice_rx) = session();
        let (mut bob, mut bob_rx) = session();
        join(&fx, &mut alice, "alice").await;
        join(&fx, &mut bob, "bob").await;

        fx.router
            .handle_frame(
                &mut alice,
                r#"{"event":"send_message","data":{"sender":"alice","receiver":"bob","message":"hello bob"}}"#,
            )
            .await;

        let received = bob_rx.recv().await.unwrap();
        match received {
            ServerEvent::ReceiveMessage(m) => {
                assert_eq!(m.sender, user("alice"));
                assert_eq!(m.body, "hello bob");
                assert_eq!(m.status, MessageStatus::Sent);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        // Sender echo carries the same canonical message.
        assert!(matches!(
            alice_rx.recv().await.unwrap(),
            ServerEvent::ReceiveMessage(_)
        ));

        // Bob acknowledges; Alice's connection gets the read receipt.
        fx.router
            .handle_frame(
                &mut bob,
                r#"{"event":"seen_messages","data":{"sender":"alice","receiver":"bob"}}"#,
            )
            .await;
        match alice_rx.recv().await.unwrap() {
            ServerEvent::MessagesSeen { from } => assert_eq!(from, user("bob")),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection_usable() {
        let fx = fixture();
        let (mut session, _rx) = session();

        fx.router.handle_frame(&mut session, "not json at all").await;
        fx.router
            .handle_frame(&mut session, r#"{"event":"no_such_event","data":{}}"#)
            .await;
        fx.router
            .handle_frame(&mut session, r#"{"event":"join","data":{"userId":""}}"#)
            .await;

        // Still anonymous, still able to join properly afterwards.
        assert_eq!(session.user(), None);
        join(&fx, &mut session, "alice").await;
        assert!(fx.presence.is_online(&user("alice")));
    }

    #[tokio::test]
    async fn test_rejoin_rebinds_to_new_connection() {
        let fx = fixture();
        let (mut old, _old_rx) = session();
        let (mut new, _new_rx) = session();

        join(&fx, &mut old, "alice").await;
        join(&fx, &mut new, "alice").await;

        assert_eq!(fx.presence.connection_for(&user("alice")), Some(new.id()));

        // The stale connection's disconnect must not knock Alice offline.
        fx.router.disconnect(&old).await;
        assert!(fx.presence.is_online(&user("alice")));
    }

    #[tokio::test]
    async fn test_join_as_different_user_releases_old_identity() {
        let fx = fixture();
        let (mut switching, mut switching_rx) = session();
        let (mut carol, _carol_rx) = session();
        join(&fx, &mut carol, "carol").await;

        join(&fx, &mut switching, "alice").await;
        join(&fx, &mut switching, "bob").await;

        // The old identity went offline; only the new one is bound.
        assert!(!fx.presence.is_online(&user("alice")));
        assert!(fx.presence.is_online(&user("bob")));
        assert_eq!(switching.user(), Some(&user("bob")));

        // Traffic for the abandoned identity no longer reaches this socket.
        fx.router
            .handle(
                &mut carol,
                ClientEvent::SendMessage {
                    sender: user("carol"),
                    receiver: user("alice"),
                    message: "for alice".to_string(),
                },
            )
            .await;
        assert!(switching_rx.try_recv().is_err());

        // Disconnect clears the one remaining binding; no ghost stays online.
        fx.router.disconnect(&switching).await;
        assert!(!fx.presence.is_online(&user("alice")));
        assert!(!fx.presence.is_online(&user("bob")));
    }

    #[tokio::test]
    async fn test_disconnect_unbinds_presence() {
        let fx = fixture();
        let (mut session, _rx) = session();
        join(&fx, &mut session, "alice").await;

        fx.router.disconnect(&session).await;

        assert!(!fx.presence.is_online(&user("alice")));
    }

    #[tokio::test]
    async fn test_disconnect_before_join_is_harmless() {
        let fx = fixture();
        let (session, _rx) = session();
        fx.router.disconnect(&session).await;
    }

    #[tokio::test]
    async fn test_send_notification_relays_to_recipient() {
        let fx = fixture();
        let (mut alice, _alice_rx) = session();
        let (mut bob, mut bob_rx) = session();
        join(&fx, &mut alice, "alice").await;
        join(&fx, &mut bob, "bob").await;

        fx.router
            .handle_frame(
                &mut alice,
                r#"{"event":"send_notification","data":{"recipientId":"bob","notification":{"id":"n1","recipient":"bob","type":"friend_request","message":"alice sent you a friend request","requestId":"fr-1","createdAt":"2026-08-29T12:00:00Z"}}}"#,
            )
            .await;

        match bob_rx.recv().await.unwrap() {
            ServerEvent::ReceiveNotification(n) => {
                assert_eq!(n.kind, "friend_request");
                assert_eq!(n.request_id.as_deref(), Some("fr-1"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
