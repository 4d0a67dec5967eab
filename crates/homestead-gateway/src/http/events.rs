use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use homestead_eventlog::{EventLogQuery, LogLevel, LogRecord};
use serde::Deserialize;

use crate::app::AppState;
use crate::http::ApiError;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub until: Option<chrono::DateTime<chrono::Utc>>,
    pub level: Option<String>,
    pub source_prefix: Option<String>,
    pub substring: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/events — structured log query surface, mapped from query-string params.
pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<EventsQuery>,
) -> Result<Json<Vec<LogRecord>>, ApiError> {
    let level = q
        .level
        .as_deref()
        .map(|s| s.to_uppercase().parse::<LogLevel>())
        .transpose()
        .map_err(homestead_core::HomesteadError::Validation)?;

    let query = EventLogQuery {
        since: q.since,
        until: q.until,
        level,
        source_prefix: q.source_prefix,
        substring: q.substring,
        limit: q.limit.unwrap_or(200),
    };

    let records = state
        .eventlog
        .query(&query)
        .map_err(|e| homestead_core::HomesteadError::Internal(e.to_string()))?;
    Ok(Json(records))
}
