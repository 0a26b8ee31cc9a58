//! Notification persistence and the persist-then-push pipeline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use libsql::Row;
use shorebird_realtime::{
    Notification, NotificationFanout, NotificationKey, RealtimeError, UserId, UserStore,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::Database;

/// Repository for notification rows.
pub struct NotificationRepository {
    db: Database,
}

impl NotificationRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a new notification and return it in full.
    #[instrument(skip(self, message), fields(recipient = %recipient, kind))]
    pub async fn create(
        &self,
        recipient: &UserId,
        kind: &str,
        message: &str,
        request_id: Option<&str>,
    ) -> Result<Notification, RealtimeError> {
        let id = Uuid::now_v7().to_string();
        let created_at = Utc::now();

        let conn = self.db.connection();
        let conn = conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO notifications (id, recipient_id, kind, message, request_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            libsql::params![
                id.clone(),
                recipient.as_str(),
                kind,
                message,
                request_id,
                created_at.to_rfc3339()
            ],
        )
        .await
        .map_err(|e| RealtimeError::store(format!("Failed to insert notification: {}", e)))?;

        debug!(notification_id = %id, "Created notification");

        Ok(Notification {
            id,
            recipient: recipient.clone(),
            kind: kind.to_string(),
            message: message.to_string(),
            request_id: request_id.map(str::to_string),
            created_at,
        })
    }

    /// Delete the notifications spawned by an originating object.
    ///
    /// Returns the number of rows removed.
    #[instrument(skip(self))]
    pub async fn delete_by_request(
        &self,
        request_id: &str,
        kind: &str,
    ) -> Result<u64, RealtimeError> {
        let conn = self.db.connection();
        let conn = conn.lock().await;
        let deleted = conn
            .execute(
                "DELETE FROM notifications WHERE request_id = ? AND kind = ?",
                libsql::params![request_id, kind],
            )
            .await
            .map_err(|e| RealtimeError::store(format!("Failed to delete notification: {}", e)))?;

        debug!(deleted, "Deleted notifications");
        Ok(deleted)
    }

    /// Fetch a user's notifications, newest first.
    #[instrument(skip(self), fields(recipient = %recipient))]
    pub async fn list_for_recipient(
        &self,
        recipient: &UserId,
    ) -> Result<Vec<Notification>, RealtimeError> {
        let conn = self.db.connection();
        let conn = conn.lock().await;
        let mut rows = conn
            .query(
                r#"
                SELECT id, recipient_id, kind, message, request_id, created_at
                FROM notifications
                WHERE recipient_id = ?
                ORDER BY created_at DESC
                "#,
                libsql::params![recipient.as_str()],
            )
            .await
            .map_err(|e| RealtimeError::store(format!("Failed to query notifications: {}", e)))?;

        let mut notifications = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| RealtimeError::store(format!("Failed to read notification row: {}", e)))?
        {
            notifications.push(row_to_notification(&row)?);
        }
        Ok(notifications)
    }
}

fn row_to_notification(row: &Row) -> Result<Notification, RealtimeError> {
    let id: String = row
        .get(0)
        .map_err(|e| RealtimeError::store(format!("Failed to read notification id: {}", e)))?;
    let recipient: String = row
        .get(1)
        .map_err(|e| RealtimeError::store(format!("Failed to read recipient: {}", e)))?;
    let kind: String = row
        .get(2)
        .map_err(|e| RealtimeError::store(format!("Failed to read kind: {}", e)))?;
    let message: String = row
        .get(3)
        .map_err(|e| RealtimeError::store(format!("Failed to read message: {}", e)))?;
    let request_id: Option<String> = row
        .get(4)
        .map_err(|e| RealtimeError::store(format!("Failed to read request id: {}", e)))?;
    let created_at: String = row
        .get(5)
        .map_err(|e| RealtimeError::store(format!("Failed to read created_at: {}", e)))?;

    Ok(Notification {
        id,
        recipient: UserId::parse(recipient)?,
        kind,
        message,
        request_id,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RealtimeError::store(format!("Invalid created_at: {}", e)))?,
    })
}

/// Persist-then-push pipeline for notifications.
///
/// The row is written first; the live push only happens once the write
/// committed, so an open client never shows a notification that a reload
/// would lose.
pub struct NotificationService<U: UserStore> {
    repository: Arc<NotificationRepository>,
    fanout: Arc<NotificationFanout<U>>,
}

impl<U: UserStore> NotificationService<U> {
    pub fn new(repository: Arc<NotificationRepository>, fanout: Arc<NotificationFanout<U>>) -> Self {
        Self { repository, fanout }
    }

    /// Persist a notification and push it to the recipient's live connection.
    pub async fn notify(
        &self,
        recipient: &UserId,
        kind: &str,
        message: &str,
        request_id: Option<&str>,
    ) -> Result<Notification, RealtimeError> {
        let notification = self
            .repository
            .create(recipient, kind, message, request_id)
            .await?;
        self.fanout.deliver(recipient, notification.clone());
        Ok(notification)
    }

    /// Remove a notification durably and retract it from the live UI.
    pub async fn retract(
        &self,
        recipient: &UserId,
        request_id: &str,
        kind: &str,
    ) -> Result<u64, RealtimeError> {
        let deleted = self.repository.delete_by_request(request_id, kind).await?;
        self.fanout.retract(
            recipient,
            NotificationKey {
                request_id: request_id.to_string(),
                kind: kind.to_string(),
            },
        );
        Ok(deleted)
    }
}
