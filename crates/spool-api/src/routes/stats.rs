use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use spool_core::QueueStats;

use crate::error::AppResult;
use crate::state::AppState;

/// GET /stats -- the same snapshot the monitor CLI prints.
async fn stats(State(state): State<AppState>) -> AppResult<Json<QueueStats>> {
    Ok(Json(state.monitor.snapshot().await?))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(stats))
}
