use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use homestead_core::HomesteadConfig;
use homestead_eventlog::EventLogStore;
use homestead_outbox::OutboxStore;
use homestead_scheduler::SchedulerEngine;
use homestead_sessions::SessionManager;
use homestead_tasks::TaskStore;
use tower_http::trace::TraceLayer;

/// Central shared state — passed as `Arc<AppState>` to every Axum handler.
pub struct AppState {
    pub config: HomesteadConfig,
    pub model_tags: Vec<String>,
    pub eventlog: Arc<EventLogStore>,
    pub outbox: Arc<OutboxStore>,
    pub sessions: Arc<SessionManager>,
    pub tasks: Arc<TaskStore>,
    pub scheduler: Arc<SchedulerEngine>,
    pub turn_queue: Arc<homestead_turnqueue::TurnQueue>,
}

/// Assemble the full Axum router: `/health` is open (liveness probes don't
/// carry a bearer token); everything else, including the `/ws` upgrade,
/// sits behind the shared bearer-token middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    // `/ws` checks the `?token=` query param itself (browser WS clients can't
    // set an Authorization header), so it stays outside the bearer middleware.
    let open = Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws", get(crate::ws::ws_handler));

    let guarded = Router::new()
        .route("/api/sessions", get(crate::http::sessions::list_handler))
        .route(
            "/api/sessions/activate",
            post(crate::http::sessions::activate_handler),
        )
        .route("/api/events", get(crate::http::events::query_handler))
        .route(
            "/api/tasks",
            get(crate::http::tasks::list_handler).post(crate::http::tasks::create_handler),
        )
        .route(
            "/api/jobs",
            get(crate::http::jobs::list_handler).post(crate::http::jobs::create_handler),
        )
        .route(
            "/api/jobs/{id}/run_now",
            post(crate::http::jobs::run_now_handler),
        )
        .route(
            "/api/jobs/{id}/enable",
            post(crate::http::jobs::enable_handler),
        )
        .route(
            "/api/jobs/{id}/disable",
            post(crate::http::jobs::disable_handler),
        )
        .route(
            "/api/jobs/{id}",
            delete(crate::http::jobs::delete_handler),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_bearer,
        ));

    open.merge(guarded)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
