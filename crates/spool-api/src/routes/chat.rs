use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use spool_core::domain::{ChatMessage, JobArgs};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub result: String,
}

/// POST /chat -- enqueue the conversation and wait for the worker's answer.
async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> AppResult<Json<ChatResponse>> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let args = JobArgs::new(request.messages);
    if args.is_empty() {
        return Err(AppError::BadRequest("messages must not be empty".into()));
    }

    tracing::info!(messages = args.len(), "chat request received");
    let result = state.dispatcher.dispatch(args).await?;

    Ok(Json(ChatResponse { result }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/chat", post(chat))
}
