// crates/visage-api/src/artifacts.rs
// ============================================================================
// Module: Artifacts Router
// Description: Serves the canonical per-run video artifact from disk.
// Purpose: Let a viewer fetch `output_canon.mp4` without touching the
//          filesystem directly.
// Dependencies: axum, tokio
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Instant;

use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;

use crate::AppState;
use crate::ApiError;
use crate::record_request;

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the `/artifacts/runs/{run_id}/output_canon.mp4` route.
#[must_use]
pub fn router() -> Router<AppState> {
    Router::new().route("/artifacts/runs/{run_id}/output_canon.mp4", get(get_canon_artifact))
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

async fn get_canon_artifact(State(state): State<AppState>, Path(run_id): Path<String>) -> Result<Response, ApiError> {
    let started = Instant::now();
    if run_id.contains('/') || run_id.contains("..") {
        let response = ApiError::Validation(format!("invalid run_id {run_id}")).into_response();
        record_request(&state, "/artifacts/runs/{run_id}/output_canon.mp4", started, response.status());
        return Ok(response);
    }

    let path = state.artifacts_root.join("runs").join(&run_id).join("output_canon.mp4");
    let response = match tokio::fs::read(&path).await {
        Ok(bytes) => (StatusCode::OK, [(header::CONTENT_TYPE, "video/mp4")], bytes).into_response(),
        Err(_) => ApiError::NotFound(format!("canonical artifact for run {run_id}")).into_response(),
    };
    record_request(&state, "/artifacts/runs/{run_id}/output_canon.mp4", started, response.status());
    Ok(response)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;
    use visage_store_sqlite::Store;

    use super::*;
    use crate::NoopApiMetrics;

    fn state_with_root(root: std::path::PathBuf) -> AppState {
        AppState::new(Store::open_in_memory().unwrap(), root, Arc::new(NoopApiMetrics))
    }

    #[tokio::test]
    async fn serves_existing_artifact() {
        let dir = tempdir().unwrap();
        let run_dir = dir.path().join("runs").join("run-1");
        std::fs::create_dir_all(&run_dir).unwrap();
        std::fs::write(run_dir.join("output_canon.mp4"), b"fake mp4 bytes").unwrap();

        let state = state_with_root(dir.path().to_path_buf());
        let response = get_canon_artifact(State(state), Path("run-1".to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_artifact_is_not_found() {
        let dir = tempdir().unwrap();
        let state = state_with_root(dir.path().to_path_buf());
        let response = get_canon_artifact(State(state), Path("run-absent".to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn run_id_with_path_traversal_is_rejected() {
        let dir = tempdir().unwrap();
        let state = state_with_root(dir.path().to_path_buf());
        let response = get_canon_artifact(State(state), Path("../escape".to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
