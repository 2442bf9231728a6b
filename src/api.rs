use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::error::PollError;
use crate::scheduler::{CycleReport, PollScheduler, SourceStatus};

#[derive(Clone)]
pub struct AppState {
    schedulers: Arc<Vec<PollScheduler>>,
}

impl AppState {
    fn find(&self, name: &str) -> Option<&PollScheduler> {
        self.schedulers.iter().find(|s| s.name() == name)
    }
}

/// Status surface over the running schedulers. `/metrics` is merged in by the
/// binary, since it needs the installed recorder.
pub fn create_router(schedulers: Vec<PollScheduler>) -> Router {
    let state = AppState {
        schedulers: Arc::new(schedulers),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/sources", get(list_sources))
        .route("/sources/{name}/latest", get(latest_snapshot))
        .route("/sources/{name}/poll", post(poll_now))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn list_sources(State(state): State<AppState>) -> Json<Vec<SourceStatus>> {
    Json(state.schedulers.iter().map(PollScheduler::status).collect())
}

async fn latest_snapshot(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let Some(sched) = state.find(&name) else {
        return (StatusCode::NOT_FOUND, format!("unknown source `{name}`")).into_response();
    };
    match sched.latest_snapshot().await {
        Ok(Some(json)) => ([(header::CONTENT_TYPE, "application/json")], json).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, format!("no snapshot for `{name}` yet")).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

async fn poll_now(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CycleReport>, (StatusCode, String)> {
    let sched = state
        .find(&name)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown source `{name}`")))?;
    sched
        .poll_once()
        .await
        .map(Json)
        .map_err(|e| {
            let status = match e {
                PollError::NotReady { .. } => StatusCode::SERVICE_UNAVAILABLE,
                PollError::Fetch { .. } => StatusCode::BAD_GATEWAY,
            };
            (status, e.to_string())
        })
}
