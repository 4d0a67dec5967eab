use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use homestead_tasks::{NewTask, Task, TaskStatus};
use serde::Deserialize;

use crate::app::AppState;
use crate::http::ApiError;

#[derive(Debug, Deserialize)]
pub struct TasksQuery {
    pub status: Option<TaskStatus>,
}

/// GET /api/tasks?status=
pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TasksQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = state.tasks.list(q.status).map_err(homestead_core::HomesteadError::from)?;
    Ok(Json(tasks))
}

/// POST /api/tasks
pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    Json(new_task): Json<NewTask>,
) -> Result<Json<Task>, ApiError> {
    let task = state.tasks.create(new_task).map_err(homestead_core::HomesteadError::from)?;
    Ok(Json(task))
}
