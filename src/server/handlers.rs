use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use super::models::{method_from_path, request_body, HealthResponse, RejectedRequest};
use super::AppState;
use crate::executor::MemoryExecutor;
use crate::resolver::RequestParser;

pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse::healthy())
}

/// `POST /{method}`: resolves the body under the method named by the path.
///
/// Resolution is synchronous, so it runs on the blocking pool with a fresh
/// executor over the shared store.
pub async fn resolve_handler(
    State(state): State<Arc<AppState>>,
    Path(segment): Path<String>,
    Json(payload): Json<Value>,
) -> Response {
    let method = match method_from_path(&segment) {
        Ok(method) => method,
        Err(e) => {
            return (StatusCode::NOT_FOUND, Json(RejectedRequest::new(404, e.to_string())))
                .into_response()
        }
    };
    let Some(request) = request_body(payload) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(RejectedRequest::new(400, "request body must be a JSON object")),
        )
            .into_response();
    };
    log::debug!("/{} called with {} top-level key(s)", segment, request.len());

    let task_state = Arc::clone(&state);
    let resolved = tokio::task::spawn_blocking(move || {
        let mut executor = MemoryExecutor::new(Arc::clone(&task_state.store));
        let parser = RequestParser::new(
            &task_state.config.resolver,
            task_state.verifier.as_ref(),
            task_state.structures.as_ref(),
        );
        parser.parse(method, &request, &mut executor)
    })
    .await;

    match resolved {
        Ok(outcome) => Json(outcome.response).into_response(),
        Err(e) => {
            log::error!("{} resolution task failed: {}", method, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RejectedRequest::new(500, "resolution task failed")),
            )
                .into_response()
        }
    }
}
