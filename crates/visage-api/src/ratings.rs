// crates/visage-api/src/ratings.rs
// ============================================================================
// Module: Ratings Router
// Description: Rating submission.
// Purpose: Accept one human rating for a task and transition it to done.
// Dependencies: axum, visage-core, visage-store-sqlite
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use visage_core::RatingChoice;
use visage_core::TaskId;

use crate::AppState;
use crate::ApiError;
use crate::record_request;

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the `/ratings` route.
#[must_use]
pub fn router() -> Router<AppState> {
    Router::new().route("/ratings", post(submit_rating))
}

// ============================================================================
// SECTION: Request / Response Bodies
// ============================================================================

#[derive(Debug, Deserialize)]
struct SubmitRatingRequest {
    task_id: String,
    rater_id: String,
    choice_realism: RatingChoice,
    choice_lipsync: RatingChoice,
    #[serde(default)]
    choice_targetmatch: Option<RatingChoice>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitRatingResponse {
    rating_id: String,
    task_id: String,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

async fn submit_rating(State(state): State<AppState>, Json(body): Json<SubmitRatingRequest>) -> Result<Response, ApiError> {
    let started = Instant::now();
    let task_id = TaskId::new(body.task_id);
    let rating = state
        .store
        .insert_rating(&task_id, &body.rater_id, body.choice_realism, body.choice_lipsync, body.choice_targetmatch, body.notes.as_deref())
        .map_err(|err| ApiError::from_store(err, state.metrics.as_ref()))?;
    let response_body = SubmitRatingResponse { rating_id: rating.rating_id.into_string(), task_id: rating.task_id.into_string() };
    let response = (StatusCode::CREATED, Json(response_body)).into_response();
    record_request(&state, "/ratings", started, response.status());
    Ok(response)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
