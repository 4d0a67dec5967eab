use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use homestead_scheduler::{Job, NewJob};

use crate::app::AppState;
use crate::http::ApiError;

/// GET /api/jobs
pub async fn list_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Job>>, ApiError> {
    let jobs = state.scheduler.jobs().list().map_err(homestead_core::HomesteadError::from)?;
    Ok(Json(jobs))
}

/// POST /api/jobs
pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    Json(new_job): Json<NewJob>,
) -> Result<Json<Job>, ApiError> {
    let job = state.scheduler.jobs().create(new_job).map_err(homestead_core::HomesteadError::from)?;
    Ok(Json(job))
}

/// POST /api/jobs/:id/run_now
pub async fn run_now_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job = state.scheduler.run_now(&id).await.map_err(homestead_core::HomesteadError::from)?;
    Ok(Json(job))
}

/// POST /api/jobs/:id/enable
pub async fn enable_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job = state.scheduler.jobs().enable(&id).map_err(homestead_core::HomesteadError::from)?;
    Ok(Json(job))
}

/// POST /api/jobs/:id/disable
pub async fn disable_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job = state.scheduler.jobs().disable(&id).map_err(homestead_core::HomesteadError::from)?;
    Ok(Json(job))
}

/// DELETE /api/jobs/:id
pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(), ApiError> {
    state.scheduler.jobs().delete(&id).map_err(homestead_core::HomesteadError::from)?;
    Ok(())
}
