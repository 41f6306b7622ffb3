// crates/visage-api/src/overview.rs
// ============================================================================
// Module: Read API
// Description: The two read operations that fix the API's observable
//              surface: experiment overview and run detail.
// Purpose: Keep projection logic (which rows compose one response) in one
//          place, shared by the HTTP handlers and any other embedder.
// Dependencies: visage-core, visage-store-sqlite, visage-metrics, visage-pairwise
// ============================================================================

//! ## Overview
//! [`get_experiment_overview`] and [`get_run_detail`] return `Ok(None)` when
//! the requested entity itself is absent (the HTTP layer turns that into a
//! 404). A missing row that the schema's foreign keys guarantee should exist
//! — a run's experiment, an experiment's generation spec — is instead
//! reported as [`visage_store_sqlite::StoreError::Violation`], the same
//! crash-loud signal the orchestrator uses for the same class of bug.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use visage_core::DatasetItem;
use visage_core::Experiment;
use visage_core::ExperimentId;
use visage_core::GenerationSpec;
use visage_core::MetricResultStatus;
use visage_core::Run;
use visage_core::RunId;
use visage_core::Task;
use visage_metrics::MetricBundleV1;
use visage_pairwise::Summary;
use visage_pairwise::compute_summary;
use visage_store_sqlite::Store;
use visage_store_sqlite::StoreError;

/// A `GET /experiments/{id}` response: the experiment's full context plus
/// the current aggregate [`Summary`].
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentOverview {
    /// The experiment row itself.
    pub experiment: Experiment,
    /// The generation spec the experiment was created against.
    pub generation_spec: GenerationSpec,
    /// The dataset item inferred from the experiment's first run, by
    /// ascending `run_id`. `None` if the experiment has no runs yet.
    pub dataset_item: Option<DatasetItem>,
    /// One [`RunDetail`] per run, ordered by ascending `run_id`.
    pub runs: Vec<RunDetail>,
    /// The current pairwise-comparison summary.
    pub summary: Summary,
}

/// A `GET /runs/{id}` response: the run row plus its computed metric bundle,
/// when one exists.
#[derive(Debug, Clone, Serialize)]
pub struct RunDetail {
    /// The run row itself.
    pub run: Run,
    /// The run's `MetricBundleV1`, including its derived `status_badge` and
    /// `reasons`. `None` if metrics have not been computed (or failed).
    pub metric_bundle: Option<MetricBundleV1>,
}

/// A `GET /tasks/{id}` (or `.../tasks/next`) response.
///
/// Tasks carry no derived projection beyond their own row, so this is the
/// row type itself.
pub type TaskDetail = Task;

/// Builds the full read-side view of an experiment: its metadata, spec,
/// inferred dataset item, every run's detail, and the current summary.
///
/// # Errors
///
/// Returns `Ok(None)` if `experiment_id` does not exist. Returns
/// [`StoreError`] for any other read failure, including
/// [`StoreError::Violation`] if a foreign-key-guaranteed row (the
/// experiment's generation spec, or a run's dataset item) is unexpectedly
/// missing.
pub fn get_experiment_overview(
    store: &Store,
    experiment_id: &ExperimentId,
) -> Result<Option<ExperimentOverview>, StoreError> {
    let Some(experiment) = store.get_experiment(experiment_id)? else {
        return Ok(None);
    };
    let generation_spec = store.get_generation_spec(&experiment.generation_spec_id)?.ok_or_else(|| {
        StoreError::Violation(format!(
            "generation_spec {} referenced by experiment {} is missing",
            experiment.generation_spec_id.as_str(),
            experiment_id.as_str()
        ))
    })?;

    let mut runs = store.list_runs_by_status(experiment_id, None)?;
    runs.sort_by(|a, b| a.run_id.cmp(&b.run_id));

    let dataset_item = match runs.first() {
        Some(first) => Some(store.get_dataset_item(&first.item_id)?.ok_or_else(|| {
            StoreError::Violation(format!(
                "dataset_item {} referenced by run {} is missing",
                first.item_id.as_str(),
                first.run_id.as_str()
            ))
        })?),
        None => None,
    };

    let mut run_details = Vec::with_capacity(runs.len());
    for run in runs {
        let metric_bundle = fetch_metric_bundle(store, &run.run_id)?;
        run_details.push(RunDetail { run, metric_bundle });
    }

    let summary = compute_summary(store, experiment_id)?;

    Ok(Some(ExperimentOverview { experiment, generation_spec, dataset_item, runs: run_details, summary }))
}

/// Builds the read-side view of a single run: its row plus its computed
/// metric bundle, when one exists.
///
/// # Errors
///
/// Returns `Ok(None)` if `run_id` does not exist. Returns [`StoreError`] for
/// any other read failure.
pub fn get_run_detail(store: &Store, run_id: &RunId) -> Result<Option<RunDetail>, StoreError> {
    let Some(run) = store.get_run(run_id)? else {
        return Ok(None);
    };
    let metric_bundle = fetch_metric_bundle(store, run_id)?;
    Ok(Some(RunDetail { run, metric_bundle }))
}

/// Looks up the run's `MetricBundleV1/1` result and deserializes it, if it
/// was computed successfully.
fn fetch_metric_bundle(store: &Store, run_id: &RunId) -> Result<Option<MetricBundleV1>, StoreError> {
    let results = store.list_metric_results_for_run(run_id)?;
    let Some(result) = results
        .into_iter()
        .find(|result| result.metric_name == "MetricBundleV1" && result.metric_version == "1" && result.status == MetricResultStatus::Computed)
    else {
        return Ok(None);
    };
    let bundle: MetricBundleV1 = serde_json::from_str(&result.value_json).map_err(|err| {
        StoreError::Violation(format!("metric_result {} for run {} holds malformed JSON: {err}", result.metric_result_id.as_str(), run_id.as_str()))
    })?;
    Ok(Some(bundle))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use visage_core::GenerationSpecId;
    use visage_core::ItemId;
    use visage_core::MetricResult;
    use visage_core::MetricResultId;
    use visage_core::identity;
    use visage_core::state::ExperimentStatus;
    use visage_core::state::RunStatus;
    use visage_store_sqlite::RunOutcome;

    use super::*;

    fn build_experiment(store: &Store) -> (ExperimentId, ItemId) {
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
            .insert_experiment(&Experiment {
                experiment_id: experiment_id.clone(),
                generation_spec_id,
                status: ExperimentStatus::Draft,
                created_at: time::OffsetDateTime::now_utc(),
            })
            .unwrap();
        (experiment_id, item_id)
    }

    fn succeed_run(store: &Store, experiment_id: &ExperimentId, item_id: &ItemId, variant_key: &str) -> RunId {
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
        run_id
    }

    #[test]
    fn get_experiment_overview_returns_none_for_missing_experiment() {
        let store = Store::open_in_memory().unwrap();
        let result = get_experiment_overview(&store, &ExperimentId::new("nope")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn get_experiment_overview_infers_dataset_item_from_first_run() {
        let store = Store::open_in_memory().unwrap();
        let (experiment_id, item_id) = build_experiment(&store);
        succeed_run(&store, &experiment_id, &item_id, "seed=1");
        succeed_run(&store, &experiment_id, &item_id, "seed=2");

        let overview = get_experiment_overview(&store, &experiment_id).unwrap().unwrap();
        assert_eq!(overview.dataset_item.unwrap().item_id, item_id);
        assert_eq!(overview.runs.len(), 2);
        let run_ids: Vec<_> = overview.runs.iter().map(|detail| detail.run.run_id.as_str().to_string()).collect();
        let mut sorted = run_ids.clone();
        sorted.sort();
        assert_eq!(run_ids, sorted);
    }

    #[test]
    fn get_experiment_overview_has_no_dataset_item_without_runs() {
        let store = Store::open_in_memory().unwrap();
        let (experiment_id, _item_id) = build_experiment(&store);
        let overview = get_experiment_overview(&store, &experiment_id).unwrap().unwrap();
        assert!(overview.dataset_item.is_none());
        assert!(overview.runs.is_empty());
    }

    #[test]
    fn get_run_detail_returns_none_for_missing_run() {
        let store = Store::open_in_memory().unwrap();
        let result = get_run_detail(&store, &RunId::new("nope")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn get_run_detail_surfaces_computed_metric_bundle() {
        let store = Store::open_in_memory().unwrap();
        let (experiment_id, item_id) = build_experiment(&store);
        let run_id = succeed_run(&store, &experiment_id, &item_id, "seed=1");

        let bundle = MetricBundleV1 {
            decode_ok: true,
            video_duration_ms: 4_010,
            audio_duration_ms: 4_000,
            av_duration_delta_ms: 10,
            fps: 25.0,
            frame_count: 100,
            scene_cut_count: 0,
            freeze_frame_ratio: 0.0,
            flicker_score: 1.0,
            blur_score: 50.0,
            frame_diff_spike_count: 0,
            face_present_ratio: 0.9,
            face_bbox_jitter: 0.1,
            landmark_jitter: 0.1,
            mouth_open_energy: 0.5,
            mouth_audio_corr: 0.7,
            blink_count: Some(4),
            blink_rate_hz: Some(0.3),
            lse_d: None,
            lse_c: None,
            status_badge: visage_metrics::StatusBadge::Pass,
            reasons: Vec::new(),
        };
        store
            .write_metric_result(&MetricResult {
                metric_result_id: MetricResultId::new("mr-1"),
                run_id: run_id.clone(),
                metric_name: "MetricBundleV1".to_string(),
                metric_version: "1".to_string(),
                value_json: serde_json::to_string(&bundle).unwrap(),
                status: MetricResultStatus::Computed,
                error_detail: None,
                created_at: time::OffsetDateTime::now_utc(),
            })
            .unwrap();

        let detail = get_run_detail(&store, &run_id).unwrap().unwrap();
        assert_eq!(detail.metric_bundle.unwrap().av_duration_delta_ms, 10);
    }

    #[test]
    fn get_run_detail_has_no_bundle_without_computed_metrics() {
        let store = Store::open_in_memory().unwrap();
        let (experiment_id, item_id) = build_experiment(&store);
        let run_id = succeed_run(&store, &experiment_id, &item_id, "seed=1");
        let detail = get_run_detail(&store, &run_id).unwrap().unwrap();
        assert!(detail.metric_bundle.is_none());
    }
}
