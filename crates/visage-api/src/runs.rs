// crates/visage-api/src/runs.rs
// ============================================================================
// Module: Runs Router
// Description: Single-run detail reads.
// Purpose: Expose a run's row plus its computed metric bundle.
// Dependencies: axum, visage-core
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
use visage_core::RunId;

use crate::AppState;
use crate::ApiError;
use crate::overview::get_run_detail;
use crate::record_request;

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the `/runs/{id}` route.
#[must_use]
pub fn router() -> Router<AppState> {
    Router::new().route("/runs/{id}", get(get_detail))
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

async fn get_detail(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let started = Instant::now();
    let run_id = RunId::new(id);
    let detail = get_run_detail(&state.store, &run_id).map_err(|err| ApiError::from_store(err, state.metrics.as_ref()))?;
    let response = match detail {
        Some(detail) => (StatusCode::OK, Json(detail)).into_response(),
        None => ApiError::NotFound(format!("run {}", run_id.as_str())).into_response(),
    };
    record_request(&state, "/runs/{id}", started, response.status());
    Ok(response)
}
