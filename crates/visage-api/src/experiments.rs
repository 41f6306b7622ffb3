// crates/visage-api/src/experiments.rs
// ============================================================================
// Module: Experiments Router
// Description: Experiment-scoped reads and writes: overview, pair
//              generation, next-open-task, summary, export.
// Purpose: Group every `/experiments/{id}/...` route behind one module, per
//          the grounding codebase's one-router-module-per-resource layout.
// Dependencies: axum, visage-core, visage-pairwise, visage-store-sqlite
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
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Serialize;
use visage_core::ExperimentId;
use visage_pairwise::compute_summary;
use visage_pairwise::generate_pairs;
use visage_pairwise::next_open_task;

use crate::AppState;
use crate::ApiError;
use crate::overview::get_experiment_overview;
use crate::record_request;

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds every `/experiments/...` route.
#[must_use]
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/experiments/{id}", get(get_overview))
        .route("/experiments/{id}/tasks", post(create_tasks))
        .route("/experiments/{id}/tasks/next", get(next_task))
        .route("/experiments/{id}/summary", get(summary))
        .route("/experiments/{id}/export", get(export))
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

async fn get_overview(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let started = Instant::now();
    let experiment_id = ExperimentId::new(id);
    let overview = get_experiment_overview(&state.store, &experiment_id).map_err(|err| ApiError::from_store(err, state.metrics.as_ref()))?;
    let response = match overview {
        Some(overview) => (StatusCode::OK, Json(overview)).into_response(),
        None => ApiError::NotFound(format!("experiment {}", experiment_id.as_str())).into_response(),
    };
    record_request(&state, "/experiments/{id}", started, response.status());
    Ok(response)
}

#[derive(Debug, Serialize)]
struct TasksCreatedBody {
    tasks_created: u64,
    experiment_id: String,
}

async fn create_tasks(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let started = Instant::now();
    let experiment_id = ExperimentId::new(id);
    let outcome = generate_pairs(&state.store, &experiment_id).map_err(|err| ApiError::from_store(err, state.metrics.as_ref()))?;
    let body = TasksCreatedBody { tasks_created: outcome.created_count, experiment_id: experiment_id.into_string() };
    let response = (StatusCode::CREATED, Json(body)).into_response();
    record_request(&state, "/experiments/{id}/tasks", started, response.status());
    Ok(response)
}

async fn next_task(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let started = Instant::now();
    let experiment_id = ExperimentId::new(id);
    let task = next_open_task(&state.store, &experiment_id).map_err(|err| ApiError::from_store(err, state.metrics.as_ref()))?;
    let response = match task {
        Some(task) => (StatusCode::OK, Json(task)).into_response(),
        None => ApiError::NotFound(format!("no open task for experiment {}", experiment_id.as_str())).into_response(),
    };
    record_request(&state, "/experiments/{id}/tasks/next", started, response.status());
    Ok(response)
}

async fn summary(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let started = Instant::now();
    let experiment_id = ExperimentId::new(id);
    let summary = compute_summary(&state.store, &experiment_id).map_err(|err| ApiError::from_store(err, state.metrics.as_ref()))?;
    let response = (StatusCode::OK, Json(summary)).into_response();
    record_request(&state, "/experiments/{id}/summary", started, response.status());
    Ok(response)
}

async fn export(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let started = Instant::now();
    let experiment_id = ExperimentId::new(id);
    let overview = get_experiment_overview(&state.store, &experiment_id).map_err(|err| ApiError::from_store(err, state.metrics.as_ref()))?;
    let Some(overview) = overview else {
        let response = ApiError::NotFound(format!("experiment {}", experiment_id.as_str())).into_response();
        record_request(&state, "/experiments/{id}/export", started, response.status());
        return Ok(response);
    };
    let payload = serde_json::to_vec_pretty(&overview)
        .map_err(|err| ApiError::from_store(visage_store_sqlite::StoreError::Violation(format!("export serialization failed: {err}")), state.metrics.as_ref()))?;
    let filename = format!("{}_export.json", experiment_id.as_str());
    let response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        payload,
    )
        .into_response();
    record_request(&state, "/experiments/{id}/export", started, response.status());
    Ok(response)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use visage_core::identifiers::GenerationSpecId;
    use visage_core::identifiers::ItemId;
    use visage_core::identity;
    use visage_core::model::DatasetItem;
    use visage_core::model::Experiment as CoreExperiment;
    use visage_core::model::GenerationSpec;
    use visage_core::model::Run;
    use visage_core::state::ExperimentStatus;
    use visage_core::state::RunStatus;
    use visage_core::RunId;
    use visage_store_sqlite::RunOutcome;
    use visage_store_sqlite::Store;

    use super::*;
    use crate::NoopApiMetrics;

    fn seeded_state() -> (AppState, ExperimentId) {
        let store = Store::open_in_memory().unwrap();
        let item_id = ItemId::new("item-1");
        store
            .insert_dataset_item(&DatasetItem {
                item_id: item_id.clone(),
                subject_id: "subject-1".to_string(),
                source_video_uri: "source.mp4".to_string(),
                audio_uri: "audio.wav".to_string(),
                ref_image_uri: None,
                metadata_json: None,
            })
            .unwrap();
        let generation_spec_id = GenerationSpecId::new("spec-1");
        store
            .insert_generation_spec(&GenerationSpec {
                generation_spec_id: generation_spec_id.clone(),
                provider: "mock".to_string(),
                model: "mock-v1".to_string(),
                model_version: None,
                prompt_template: "Generate a talking head video.".to_string(),
                params_json: Some("{}".to_string()),
                seed_policy_json: None,
            })
            .unwrap();
        let experiment_id = ExperimentId::new("exp-1");
        store
            .insert_experiment(&CoreExperiment { experiment_id: experiment_id.clone(), generation_spec_id, status: ExperimentStatus::Draft, created_at: time::OffsetDateTime::now_utc() })
            .unwrap();

        for variant_key in ["seed=1", "seed=2"] {
            let spec_hash = "deadbeef".to_string();
            let run_id = RunId::new(identity::run_id(experiment_id.as_str(), item_id.as_str(), variant_key, &spec_hash));
            store
                .enqueue_run(&Run {
                    run_id: run_id.clone(),
                    experiment_id: experiment_id.clone(),
                    item_id: item_id.clone(),
                    variant_key: variant_key.to_string(),
                    spec_hash,
                    status: RunStatus::Queued,
                    output_canon_uri: None,
                    output_sha256: None,
                    started_at: None,
                    ended_at: None,
                    error_code: None,
                    error_detail: None,
                })
                .unwrap();
            store.claim_queued_runs(1, "worker-1").unwrap();
            store.finish_run(&run_id, RunOutcome::Succeeded { canon_uri: "c.mp4".to_string(), canon_sha256: "abc".to_string() }).unwrap();
        }

        let state = AppState::new(store, std::env::temp_dir(), Arc::new(NoopApiMetrics));
        (state, experiment_id)
    }

    #[tokio::test]
    async fn get_overview_404s_for_missing_experiment() {
        let state = AppState::new(Store::open_in_memory().unwrap(), std::env::temp_dir(), Arc::new(NoopApiMetrics));
        let response = get_overview(State(state), Path("nope".to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_tasks_generates_pairs_and_next_task_then_dries_up() {
        let (state, experiment_id) = seeded_state();

        let create_response = create_tasks(State(state.clone()), Path(experiment_id.as_str().to_string())).await.unwrap();
        assert_eq!(create_response.status(), StatusCode::CREATED);

        let next_response = next_task(State(state.clone()), Path(experiment_id.as_str().to_string())).await.unwrap();
        assert_eq!(next_response.status(), StatusCode::OK);

        let summary_response = summary(State(state), Path(experiment_id.as_str().to_string())).await.unwrap();
        assert_eq!(summary_response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn export_streams_json_with_content_disposition() {
        let (state, experiment_id) = seeded_state();
        let response = export(State(state), Path(experiment_id.as_str().to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers().get(header::CONTENT_DISPOSITION).unwrap().to_str().unwrap();
        assert!(disposition.contains("exp-1_export.json"));
    }
}
