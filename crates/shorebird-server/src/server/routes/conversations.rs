//! Conversation history endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use shorebird_realtime::{ChatMessage, UserId};

use super::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    /// The user reading the thread. Until an auth layer exists the viewer
    /// identifies themselves in the query string.
    pub viewer: String,
}

/// GET /api/v1/conversations/:peer_id?viewer=<user>
///
/// Returns the full two-way history, oldest first. Fetching a thread marks
/// the peer's messages as seen, mirroring the realtime acknowledgement.
pub async fn get_conversation(
    Path(peer_id): Path<String>,
    Query(query): Query<ConversationQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let viewer = UserId::parse(query.viewer)?;
    let peer = UserId::parse(peer_id)?;

    let history = state.delivery.conversation(&viewer, &peer).await?;
    Ok(Json(history))
}
