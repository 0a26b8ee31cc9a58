//! Database migration system for Shorebird Server
//!
//! Compile-time embedded SQL migrations with version tracking via a
//! `_migrations` table, applied automatically on startup.

use super::{Database, DatabaseError};
use tracing::{debug, info, instrument};

/// Represents a single database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number (must be unique and incrementing)
    pub version: i64,
    /// Description of what this migration does
    pub description: String,
    /// SQL to execute for the migration
    pub sql: &'static str,
}

/// Initial schema - users, messages, and notifications
pub const V0001_INITIAL_SCHEMA: &str = r#"
-- User records backing presence and profiles
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,                    -- User identifier
    display_name TEXT,                      -- Display name
    is_online INTEGER NOT NULL DEFAULT 0,   -- Presence flag, written through by realtime
    last_seen_at TEXT,                      -- Last presence transition (RFC 3339)
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Direct messages between two users
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,                    -- Message ID (UUID v7, time-sortable)
    sender_id TEXT NOT NULL,                -- Sending user
    receiver_id TEXT NOT NULL,              -- Receiving user
    body TEXT NOT NULL,                     -- Message text
    status TEXT NOT NULL DEFAULT 'sent',    -- 'sent', 'delivered', 'seen'
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Conversation lookups run both directions
CREATE INDEX IF NOT EXISTS idx_messages_sender_receiver ON messages(sender_id, receiver_id);
CREATE INDEX IF NOT EXISTS idx_messages_receiver_sender ON messages(receiver_id, sender_id);

-- Notifications delivered to a user's tray
CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,                    -- Notification ID (UUID v7)
    recipient_id TEXT NOT NULL,             -- Receiving user
    kind TEXT NOT NULL,                     -- e.g. 'friend_request'
    message TEXT NOT NULL,                  -- Human-readable text
    request_id TEXT,                        -- Source entity for retraction
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient_id);
CREATE INDEX IF NOT EXISTS idx_notifications_request ON notifications(request_id, kind);
"#;

/// Get all migrations in order
pub fn all() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema".to_string(),
        sql: V0001_INITIAL_SCHEMA,
    }]
}

/// Applies pending migrations in version order
pub struct MigrationRunner {
    migrations: Vec<Migration>,
}

impl MigrationRunner {
    /// Create a new migration runner with the given migrations
    pub fn new(migrations: Vec<Migration>) -> Self {
        let mut sorted = migrations;
        sorted.sort_by_key(|m| m.version);
        Self { migrations: sorted }
    }

    /// Create a runner with the full embedded migration set
    pub fn embedded() -> Self {
        Self::new(all())
    }

    /// Run all pending migrations on the database
    #[instrument(skip_all, fields(db_name = %db.name()))]
    pub async fn run(&self, db: &Database) -> Result<Vec<i64>, DatabaseError> {
        let conn = db.connection();
        let conn = conn.lock().await;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::MigrationFailed(format!("Failed to create migrations table: {}", e))
        })?;

        let mut applied: Vec<i64> = Vec::new();
        let mut rows = conn
            .query("SELECT version FROM _migrations ORDER BY version", ())
            .await
            .map_err(|e| {
                DatabaseError::MigrationFailed(format!("Failed to query migrations: {}", e))
            })?;

        while let Some(row) = rows.next().await.map_err(|e| {
            DatabaseError::MigrationFailed(format!("Failed to read migration row: {}", e))
        })? {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::MigrationFailed(format!("Failed to get version from row: {}", e))
            })?;
            applied.push(version);
        }

        debug!("Already applied migrations: {:?}", applied);

        let mut newly_applied = Vec::new();
        for migration in &self.migrations {
            if applied.contains(&migration.version) {
                debug!("Skipping already applied migration v{}", migration.version);
                continue;
            }

            info!(
                "Applying migration v{}: {}",
                migration.version, migration.description
            );

            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::MigrationFailed(format!(
                    "Migration v{} failed: {}",
                    migration.version, e
                ))
            })?;

            conn.execute(
                "INSERT INTO _migrations (version, description) VALUES (?, ?)",
                libsql::params![migration.version, migration.description.clone()],
            )
            .await
            .map_err(|e| {
                DatabaseError::MigrationFailed(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e
                ))
            })?;

            newly_applied.push(migration.version);
        }

        if newly_applied.is_empty() {
            debug!("Database schema is up to date");
        } else {
            info!("Applied migrations: {:?}", newly_applied);
        }

        Ok(newly_applied)
    }
}
