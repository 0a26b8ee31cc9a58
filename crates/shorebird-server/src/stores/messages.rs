//! Message repository backed by the messages table.

use chrono::{DateTime, Utc};
use libsql::Row;
use shorebird_realtime::{ChatMessage, MessageStatus, MessageStore, RealtimeError, UserId};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::Database;

/// Repository for direct-message rows.
pub struct MessageRepository {
    db: Database,
}

impl MessageRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn row_to_message(row: &Row) -> Result<ChatMessage, RealtimeError> {
    let id: String = row
        .get(0)
        .map_err(|e| RealtimeError::store(format!("Failed to read message id: {}", e)))?;
    let sender: String = row
        .get(1)
        .map_err(|e| RealtimeError::store(format!("Failed to read sender: {}", e)))?;
    let receiver: String = row
        .get(2)
        .map_err(|e| RealtimeError::store(format!("Failed to read receiver: {}", e)))?;
    let body: String = row
        .get(3)
        .map_err(|e| RealtimeError::store(format!("Failed to read body: {}", e)))?;
    let status: String = row
        .get(4)
        .map_err(|e| RealtimeError::store(format!("Failed to read status: {}", e)))?;
    let created_at: String = row
        .get(5)
        .map_err(|e| RealtimeError::store(format!("Failed to read created_at: {}", e)))?;

    Ok(ChatMessage {
        id,
        sender: UserId::parse(sender)?,
        receiver: UserId::parse(receiver)?,
        body,
        status: status
            .parse::<MessageStatus>()
            .map_err(|e| RealtimeError::store(format!("Invalid status: {}", e)))?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RealtimeError::store(format!("Invalid created_at: {}", e)))?,
    })
}

impl MessageStore for MessageRepository {
    #[instrument(skip(self, body), fields(sender = %sender, receiver = %receiver))]
    async fn create(
        &self,
        sender: &UserId,
        receiver: &UserId,
        body: &str,
    ) -> Result<ChatMessage, RealtimeError> {
        // UUID v7 keeps ids time-sortable alongside created_at.
        let id = Uuid::now_v7().to_string();
        let created_at = Utc::now();

        let conn = self.db.connection();
        let conn = conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO messages (id, sender_id, receiver_id, body, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            libsql::params![
                id.clone(),
                sender.as_str(),
                receiver.as_str(),
                body,
                MessageStatus::Sent.as_str(),
                created_at.to_rfc3339()
            ],
        )
        .await
        .map_err(|e| RealtimeError::store(format!("Failed to insert message: {}", e)))?;

        debug!(message_id = %id, "Created message");

        Ok(ChatMessage {
            id,
            sender: sender.clone(),
            receiver: receiver.clone(),
            body: body.to_string(),
            status: MessageStatus::Sent,
            created_at,
        })
    }

    #[instrument(skip(self), fields(counterpart = %counterpart, viewer = %viewer))]
    async fn mark_seen(
        &self,
        counterpart: &UserId,
        viewer: &UserId,
    ) -> Result<u64, RealtimeError> {
        let conn = self.db.connection();
        let conn = conn.lock().await;
        let updated = conn
            .execute(
                r#"
                UPDATE messages SET status = ?
                WHERE sender_id = ? AND receiver_id = ? AND status != ?
                "#,
                libsql::params![
                    MessageStatus::Seen.as_str(),
                    counterpart.as_str(),
                    viewer.as_str(),
                    MessageStatus::Seen.as_str()
                ],
            )
            .await
            .map_err(|e| RealtimeError::store(format!("Failed to mark messages seen: {}", e)))?;

        debug!(updated, "Marked messages seen");
        Ok(updated)
    }

    #[instrument(skip(self), fields(a = %a, b = %b))]
    async fn find_conversation(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<Vec<ChatMessage>, RealtimeError> {
        let conn = self.db.connection();
        let conn = conn.lock().await;
        let mut rows = conn
            .query(
                r#"
                SELECT id, sender_id, receiver_id, body, status, created_at
                FROM messages
                WHERE (sender_id = ? AND receiver_id = ?)
                   OR (sender_id = ? AND receiver_id = ?)
                ORDER BY created_at ASC
                "#,
                libsql::params![a.as_str(), b.as_str(), b.as_str(), a.as_str()],
            )
            .await
            .map_err(|e| RealtimeError::store(format!("Failed to query conversation: {}", e)))?;

        let mut messages = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| RealtimeError::store(format!("Failed to read message row: {}", e)))?
        {
            messages.push(row_to_message(&row)?);
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MigrationRunner;

    async fn repository() -> MessageRepository {
        let db = Database::in_memory("test").await.unwrap();
        MigrationRunner::embedded().run(&db).await.unwrap();
        MessageRepository::new(db)
    }

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_fetch_conversation() {
        let repo = repository().await;
        let alice = user("alice");
        let bob = user("bob");

        let first = repo.create(&alice, &bob, "hello").await.unwrap();
        repo.create(&bob, &alice, "hi yourself").await.unwrap();
        // A third party's messages stay out of the thread.
        repo.create(&user("carol"), &bob, "unrelated").await.unwrap();

        let history = repo.find_conversation(&alice, &bob).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first.id);
        assert_eq!(history[0].status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn test_mark_seen_counts_and_is_directional() {
        let repo = repository().await;
        let alice = user("alice");
        let bob = user("bob");

        repo.create(&alice, &bob, "one").await.unwrap();
        repo.create(&alice, &bob, "two").await.unwrap();
        repo.create(&bob, &alice, "three").await.unwrap();

        // Bob reads Alice's messages.
        let updated = repo.mark_seen(&alice, &bob).await.unwrap();
        assert_eq!(updated, 2);

        // Repeat acknowledgement touches nothing.
        assert_eq!(repo.mark_seen(&alice, &bob).await.unwrap(), 0);

        let history = repo.find_conversation(&alice, &bob).await.unwrap();
        let from_bob = history.iter().find(|m| m.sender == bob).unwrap();
        assert_eq!(from_bob.status, MessageStatus::Sent);
    }
}
