// crates/visage-api/src/tasks.rs
// ============================================================================
// Module: Tasks Router
// Description: Single-task detail reads.
// Purpose: Expose a pairwise comparison task by id.
// Dependencies: axum, visage-core, visage-store-sqlite
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use visage_core::TaskId;

use crate::AppState;
use crate::ApiError;
use crate::record_request;

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the `/tasks/{id}` route.
#[must_use]
pub fn router() -> Router<AppState> {
    Router::new().route("/tasks/{id}", get(get_detail))
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

async fn get_detail(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let started = Instant::now();
    let task_id = TaskId::new(id);
    let task = state.store.get_task(&task_id).map_err(|err| ApiError::from_store(err, state.metrics.as_ref()))?;
    let response = match task {
        Some(task) => (StatusCode::OK, Json(task)).into_response(),
        None => ApiError::NotFound(format!("task {}", task_id.as_str())).into_response(),
    };
    record_request(&state, "/tasks/{id}", started, response.status());
    Ok(response)
}
