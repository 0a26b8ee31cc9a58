//! User repository backed by the users table.

use chrono::{DateTime, Utc};
use libsql::Row;
use shorebird_realtime::{RealtimeError, UserId, UserRecord, UserStore};
use tracing::{debug, instrument};

use crate::db::Database;

/// Repository for user records.
///
/// Presence writes upsert, so a user the realtime layer has seen always has
/// a row even before any profile data exists for them.
pub struct UserRepository {
    db: Database,
}

impl UserRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn row_to_record(row: &Row) -> Result<UserRecord, RealtimeError> {
    let id: String = row
        .get(0)
        .map_err(|e| RealtimeError::store(format!("Failed to read user id: {}", e)))?;
    let display_name: Option<String> = row
        .get(1)
        .map_err(|e| RealtimeError::store(format!("Failed to read display name: {}", e)))?;
    let is_online: i64 = row
        .get(2)
        .map_err(|e| RealtimeError::store(format!("Failed to read online flag: {}", e)))?;
    let last_seen_at: Option<String> = row
        .get(3)
        .map_err(|e| RealtimeError::store(format!("Failed to read last seen: {}", e)))?;

    let last_seen_at = last_seen_at
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| RealtimeError::store(format!("Invalid last_seen_at: {}", e)))
        })
        .transpose()?;

    Ok(UserRecord {
        id: UserId::parse(id)?,
        display_name,
        is_online: is_online != 0,
        last_seen_at,
    })
}

impl UserStore for UserRepository {
    #[instrument(skip(self), fields(user = %user))]
    async fn set_online_status(&self, user: &UserId, online: bool) -> Result<(), RealtimeError> {
        let conn = self.db.connection();
        let conn = conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO users (id, is_online, last_seen_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                is_online = excluded.is_online,
                last_seen_at = excluded.last_seen_at
            "#,
            libsql::params![user.as_str(), online as i64, Utc::now().to_rfc3339()],
        )
        .await
        .map_err(|e| RealtimeError::store(format!("Failed to update online status: {}", e)))?;

        debug!(online, "Updated online status");
        Ok(())
    }

    #[instrument(skip(self), fields(user = %user))]
    async fn find_by_id(&self, user: &UserId) -> Result<Option<UserRecord>, RealtimeError> {
        let conn = self.db.connection();
        let conn = conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT id, display_name, is_online, last_seen_at FROM users WHERE id = ?",
                libsql::params![user.as_str()],
            )
            .await
            .map_err(|e| RealtimeError::store(format!("Failed to query user: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| RealtimeError::store(format!("Failed to read user row: {}", e)))?
        {
            Some(row) => Ok(Some(row_to_record(&row)?)),
            None => Ok(None),
        }
    }
}
