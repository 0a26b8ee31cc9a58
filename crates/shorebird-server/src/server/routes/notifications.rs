//! Notification endpoints.
//!
//! The HTTP side of the app (friend requests and the like) calls these to
//! persist a notification and push it to the recipient in one step, and to
//! withdraw one when its source goes away.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use shorebird_realtime::{Notification, UserId};

use super::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotification {
    pub recipient_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetractNotification {
    pub recipient_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub request_id: String,
}

/// POST /api/v1/notifications
///
/// Persists the notification, then pushes it to the recipient's live
/// connection if they have one.
pub async fn create_notification(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateNotification>,
) -> Result<Json<Notification>, ApiError> {
    let recipient = UserId::parse(body.recipient_id)?;
    let notification = state
        .notifications
        .notify(&recipient, &body.kind, &body.message, body.request_id.as_deref())
        .await?;
    Ok(Json(notification))
}

/// DELETE /api/v1/notifications
///
/// Removes the notifications spawned by an originating object and tells
/// the recipient's open client to drop them.
pub async fn delete_notification(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RetractNotification>,
) -> Result<Json<Value>, ApiError> {
    let recipient = UserId::parse(body.recipient_id)?;
    let deleted = state
        .notifications
        .retract(&recipient, &body.request_id, &body.kind)
        .await?;
    Ok(Json(json!({ "deleted": deleted })))
}

/// GET /api/v1/users/:id/notifications
///
/// The recipient's notification tray, newest first.
pub async fn list_notifications(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let recipient = UserId::parse(id)?;
    let notifications = state
        .notification_repository
        .list_for_recipient(&recipient)
        .await?;
    Ok(Json(notifications))
}
