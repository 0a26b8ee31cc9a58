//! HTTP and WebSocket route handlers.

pub mod conversations;
pub mod notifications;
pub mod users;
pub mod ws;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use shorebird_realtime::RealtimeError;

/// Error envelope returned by the JSON API.
pub struct ApiError(RealtimeError);

impl From<RealtimeError> for ApiError {
    fn from(e: RealtimeError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RealtimeError::InvalidUserId(_) => StatusCode::BAD_REQUEST,
            RealtimeError::Store(_) | RealtimeError::Encode(_) | RealtimeError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
