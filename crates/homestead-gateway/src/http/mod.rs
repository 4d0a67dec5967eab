pub mod events;
pub mod health;
pub mod jobs;
pub mod sessions;
pub mod tasks;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use homestead_core::HomesteadError;
use serde_json::json;

/// Wraps `HomesteadError` so every handler can `?`-propagate into an HTTP
/// response without a per-endpoint match.
pub struct ApiError(pub HomesteadError);

impl From<HomesteadError> for ApiError {
    fn from(e: HomesteadError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            HomesteadError::Validation(_) => StatusCode::BAD_REQUEST,
            HomesteadError::NotFound(_) => StatusCode::NOT_FOUND,
            HomesteadError::Conflict(_) => StatusCode::CONFLICT,
            HomesteadError::Transport(_) => StatusCode::BAD_GATEWAY,
            HomesteadError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            HomesteadError::Backend(_) => StatusCode::BAD_GATEWAY,
            HomesteadError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "error": self.0.code(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}
