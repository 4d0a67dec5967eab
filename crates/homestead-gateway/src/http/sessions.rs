use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use homestead_sessions::Session;
use serde::Deserialize;

use crate::app::AppState;
use crate::http::ApiError;

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    pub chat_id: i64,
}

/// GET /api/sessions?chat_id=
pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SessionsQuery>,
) -> Result<Json<Vec<Session>>, ApiError> {
    let sessions = state.sessions.list(q.chat_id).map_err(homestead_core::HomesteadError::from)?;
    Ok(Json(sessions))
}

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub chat_id: i64,
    pub name: String,
}

/// POST /api/sessions/activate
pub async fn activate_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActivateRequest>,
) -> Result<Json<Session>, ApiError> {
    let session = state
        .sessions
        .activate(req.chat_id, &req.name)
        .map_err(homestead_core::HomesteadError::from)?;
    Ok(Json(session))
}
