//! Bearer-token gate for the HTTP/WS surface. One shared secret, checked by
//! middleware — the trusted-shared-secret model, not cryptographic channel
//! authentication.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::app::AppState;

pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.gateway.auth_token.as_deref() else {
        // No token configured: the gateway is running in open/dev mode.
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => next.run(req).await,
        _ => (StatusCode::UNAUTHORIZED, "missing or invalid bearer token").into_response(),
    }
}

/// Validates a WS connection's `?token=` query parameter, since browser
/// WebSocket clients cannot set arbitrary request headers.
pub fn check_ws_token(state: &AppState, provided: Option<&str>) -> bool {
    match state.config.gateway.auth_token.as_deref() {
        None => true,
        Some(expected) => provided == Some(expected),
    }
}
