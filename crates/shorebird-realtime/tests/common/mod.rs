//! Shared fixtures for the realtime integration tests.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use shorebird_realtime::{
    ChatMessage, MessageStatus, MessageStore, RealtimeError, UserId, UserRecord, UserStore,
};

/// Initialize tracing once for the whole test binary.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

pub fn user(id: &str) -> UserId {
    UserId::parse(id).unwrap()
}

/// In-memory [`UserStore`] double.
#[derive(Default)]
pub struct MockUserStore {
    records: Mutex<HashMap<UserId, UserRecord>>,
}

impl MockUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MockUserStore {
    async fn set_online_status(&self, user: &UserId, online: bool) -> Result<(), RealtimeError> {
        let mut records = self.records.lock().unwrap();
        let record = records.entry(user.clone()).or_insert_with(|| UserRecord {
            id: user.clone(),
            display_name: None,
            is_online: false,
            last_seen_at: None,
        });
        record.is_online = online;
        record.last_seen_at = Some(Utc::now());
        Ok(())
    }

    async fn find_by_id(&self, user: &UserId) -> Result<Option<UserRecord>, RealtimeError> {
        Ok(self.records.lock().unwrap().get(user).cloned())
    }
}

/// In-memory [`MessageStore`] double.
#[derive(Default)]
pub struct MockMessageStore {
    pub messages: Mutex<Vec<ChatMessage>>,
}

impl MockMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_of(&self, id: &str) -> Option<MessageStatus> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.status)
    }
}

impl MessageStore for MockMessageStore {
    async fn create(
        &self,
        sender: &UserId,
        receiver: &UserId,
        body: &str,
    ) -> Result<ChatMessage, RealtimeError> {
        let message = ChatMessage {
            id: Uuid::now_v7().to_string(),
            sender: sender.clone(),
            receiver: receiver.clone(),
            body: body.to_string(),
            status: MessageStatus::Sent,
            created_at: Utc::now(),
        };
        self.messages.lock().unwrap().push(message.clone());
        Ok(message)
    }

    async fn mark_seen(
        &self,
        counterpart: &UserId,
        viewer: &UserId,
    ) -> Result<u64, RealtimeError> {
        let mut messages = self.messages.lock().unwrap();
        let mut updated = 0;
        for msg in messages.iter_mut() {
            if msg.sender == *counterpart
                && msg.receiver == *viewer
                && msg.status.can_advance_to(MessageStatus::Seen)
            {
                msg.status = MessageStatus::Seen;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn find_conversation(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Vec<ChatMessage>, RealtimeError> {
        let mut history: Vec<ChatMessage> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| {
                (m.sender == *a && m.receiver == *b) || (m.sender == *b && m.receiver == *a)
            })
            .cloned()
            .collect();
        history.sort_by(|x, y| x.created_at.cmp(&y.created_at));
        Ok(history)
    }
}
