//! User presence endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use shorebird_realtime::{UserId, UserStore};

use super::ApiError;
use crate::server::AppState;

/// GET /api/v1/users/:id
///
/// Returns the user record with its presence fields. The stored online
/// flag is authoritative here; the in-memory registry feeds it.
pub async fn get_user(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let user = UserId::parse(id)?;

    match state.users.find_by_id(&user).await? {
        Some(record) => Ok(Json(record).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "user not found" })),
        )
            .into_response()),
    }
}
