// crates/visage-pairwise/src/lib.rs
// ============================================================================
// Module: Visage Pairwise
// Description: Canonical-pair generation for human comparison tasks, and the
//              pure rating aggregator that folds Ratings into a Summary.
// Purpose: Keep "which pairs exist" and "who is winning" as two small, pure
//          functions over a store snapshot, rather than ad-hoc query logic
//          scattered across the API layer.
// Dependencies: visage-core, visage-store-sqlite, rand
// ============================================================================

//! ## Overview
//! [`generate_pairs`] is idempotent: calling it twice in succession against
//! an unchanged set of succeeded runs always yields `created_count = 0` on
//! the second call, because it dedups against [`visage_store_sqlite::Store::existing_pairs`]
//! before inserting. [`compute_summary`] is a pure fold over the store's
//! current tasks-and-ratings snapshot; it never mutates anything.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;

use rand::Rng;
use serde::Serialize;
use visage_core::ExperimentId;
use visage_core::RatingChoice;
use visage_core::RunId;
use visage_core::RunStatus;
use visage_core::Task;
use visage_core::TaskId;
use visage_core::TaskStatus;
use visage_store_sqlite::Store;
use visage_store_sqlite::StoreError;

// ============================================================================
// SECTION: Pair Generation
// ============================================================================

/// Result of a [`generate_pairs`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairGenerationOutcome {
    /// Number of new tasks inserted by this call.
    pub created_count: u64,
    /// Identifiers of the tasks inserted by this call, in insertion order.
    pub task_ids: Vec<TaskId>,
}

/// Generates one comparison [`Task`] for every unordered pair of succeeded
/// runs in `experiment_id` that does not already have one.
///
/// Presentation order for each new task is chosen by a fresh uniform random
/// bit; canonical order is the ascending order of the experiment's succeeded
/// run ids, so `task_ids` is deterministic given the succeeded-run set even
/// though presentation is not. Calling this twice in succession against an
/// unchanged succeeded-run set yields `created_count = 0` on the second call.
///
/// # Errors
///
/// Returns [`StoreError`] if any read or write against the store fails.
pub fn generate_pairs(store: &Store, experiment_id: &ExperimentId) -> Result<PairGenerationOutcome, StoreError> {
    let mut succeeded: Vec<RunId> =
        store.list_runs_by_status(experiment_id, Some(RunStatus::Succeeded))?.into_iter().map(|run| run.run_id).collect();
    if succeeded.len() < 2 {
        return Ok(PairGenerationOutcome { created_count: 0, task_ids: Vec::new() });
    }
    succeeded.sort();

    let existing = store.existing_pairs(experiment_id)?;
    let mut task_ids = Vec::new();
    let mut rng = rand::thread_rng();

    for (index, left) in succeeded.iter().enumerate() {
        for right in &succeeded[index + 1..] {
            if existing.contains(&(left.clone(), right.clone())) {
                continue;
            }
            let flip = rng.r#gen::<bool>();
            let task = store.insert_task(experiment_id, left, right, flip)?;
            task_ids.push(task.task_id);
        }
    }

    Ok(PairGenerationOutcome { created_count: task_ids.len() as u64, task_ids })
}

/// Returns any one open task for `experiment_id`, or `None` if there isn't
/// one. No starvation guarantee is made across callers.
///
/// # Errors
///
/// Returns [`StoreError`] if the query fails.
pub fn next_open_task(store: &Store, experiment_id: &ExperimentId) -> Result<Option<Task>, StoreError> {
    store.open_task(experiment_id)
}

// ============================================================================
// SECTION: Rating Aggregation
// ============================================================================

/// Per-run win rates and recommended pick for an experiment, folded from
/// every rating tied to a `done` task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    /// Fraction of comparisons each run won, in `[0, 1]`.
    pub win_rates: HashMap<RunId, f64>,
    /// The run with the highest win rate; ties break on the lexicographically
    /// smallest run id. `None` if the experiment has no runs.
    pub recommended_pick: Option<RunId>,
    /// Number of ratings folded into this summary.
    pub total_comparisons: u64,
}

/// Folds every rating tied to a `done` task in `experiment_id` into a
/// [`Summary`]. `choice_targetmatch` is persisted but intentionally excluded
/// from this aggregation: the summary is defined over realism and lipsync
/// only.
///
/// # Errors
///
/// Returns [`StoreError`] if any read against the store fails.
pub fn compute_summary(store: &Store, experiment_id: &ExperimentId) -> Result<Summary, StoreError> {
    let runs = store.list_runs_by_status(experiment_id, None)?;
    let mut wins: HashMap<RunId, f64> = runs.iter().map(|run| (run.run_id.clone(), 0.0)).collect();

    let done_tasks = store.list_tasks_by_status(experiment_id, Some(TaskStatus::Done))?;
    let task_ids: Vec<TaskId> = done_tasks.iter().map(|task| task.task_id.clone()).collect();
    let tasks_by_id: HashMap<&TaskId, &Task> = done_tasks.iter().map(|task| (&task.task_id, task)).collect();
    let ratings = store.list_ratings_for_tasks(&task_ids)?;

    let mut comparisons: u64 = 0;
    for rating in &ratings {
        let Some(task) = tasks_by_id.get(&rating.task_id) else { continue };
        comparisons += 1;
        apply_choice(&mut wins, rating.choice_realism, task.flip, &task.left_run_id, &task.right_run_id);
        apply_choice(&mut wins, rating.choice_lipsync, task.flip, &task.left_run_id, &task.right_run_id);
    }

    let denom = if comparisons == 0 { 1.0 } else { 2.0 * comparisons as f64 };
    let win_rates: HashMap<RunId, f64> = wins.into_iter().map(|(run_id, total)| (run_id, total / denom)).collect();

    let recommended_pick = win_rates
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| b.0.cmp(a.0)))
        .map(|(run_id, _)| run_id.clone());

    Ok(Summary { win_rates, recommended_pick, total_comparisons: comparisons })
}

/// Applies one rating dimension's choice to the running win tally, per the
/// flip-aware mapping: `left`/`right` award 0.5 to the run the rater actually
/// preferred (canonical, not presented); `tie` splits 0.25/0.25 regardless of
/// flip; `skip` changes nothing.
fn apply_choice(wins: &mut HashMap<RunId, f64>, choice: RatingChoice, flip: bool, left: &RunId, right: &RunId) {
    match choice {
        RatingChoice::Left if flip => *wins.entry(right.clone()).or_insert(0.0) += 0.5,
        RatingChoice::Left => *wins.entry(left.clone()).or_insert(0.0) += 0.5,
        RatingChoice::Right if flip => *wins.entry(left.clone()).or_insert(0.0) += 0.5,
        RatingChoice::Right => *wins.entry(right.clone()).or_insert(0.0) += 0.5,
        RatingChoice::Tie => {
            *wins.entry(left.clone()).or_insert(0.0) += 0.25;
            *wins.entry(right.clone()).or_insert(0.0) += 0.25;
        }
        RatingChoice::Skip => {}
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use visage_core::DatasetItem;
    use visage_core::Experiment;
    use visage_core::ExperimentStatus;
    use visage_core::GenerationSpec;
    use visage_core::GenerationSpecId;
    use visage_core::ItemId;
    use visage_core::Run;
    use visage_store_sqlite::RunOutcome;

    use super::*;

    fn build_experiment(store: &Store) -> ExperimentId {
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
        experiment_id
    }

    fn succeed_run(store: &Store, experiment_id: &ExperimentId, item_id: &ItemId, variant_key: &str) -> RunId {
        let spec_hash = "deadbeef".to_string();
        let run_id = RunId::new(visage_core::identity::run_id(experiment_id.as_str(), item_id.as_str(), variant_key, &spec_hash));
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
        store
            .finish_run(&run_id, RunOutcome::Succeeded { canon_uri: "c.mp4".to_string(), canon_sha256: "abc".to_string() })
            .unwrap();
        run_id
    }

    #[test]
    fn generate_pairs_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let experiment_id = build_experiment(&store);
        let item_id = ItemId::new("item-1");
        succeed_run(&store, &experiment_id, &item_id, "seed=1");
        succeed_run(&store, &experiment_id, &item_id, "seed=2");
        succeed_run(&store, &experiment_id, &item_id, "seed=3");

        let first = generate_pairs(&store, &experiment_id).unwrap();
        assert_eq!(first.created_count, 3);
        let second = generate_pairs(&store, &experiment_id).unwrap();
        assert_eq!(second.created_count, 0);

        let all_tasks = store.list_tasks_by_status(&experiment_id, None).unwrap();
        assert_eq!(all_tasks.len(), 3);
    }

    #[test]
    fn generate_pairs_returns_zero_below_two_runs() {
        let store = Store::open_in_memory().unwrap();
        let experiment_id = build_experiment(&store);
        let item_id = ItemId::new("item-1");
        succeed_run(&store, &experiment_id, &item_id, "seed=1");
        let outcome = generate_pairs(&store, &experiment_id).unwrap();
        assert_eq!(outcome.created_count, 0);
        assert!(outcome.task_ids.is_empty());
    }

    #[test]
    fn flip_soundness_holds_for_every_generated_task() {
        let store = Store::open_in_memory().unwrap();
        let experiment_id = build_experiment(&store);
        let item_id = ItemId::new("item-1");
        succeed_run(&store, &experiment_id, &item_id, "seed=1");
        succeed_run(&store, &experiment_id, &item_id, "seed=2");
        generate_pairs(&store, &experiment_id).unwrap();

        for task in store.list_tasks_by_status(&experiment_id, None).unwrap() {
            if task.flip {
                assert_eq!(task.presented_left_run_id, task.right_run_id);
                assert_eq!(task.presented_right_run_id, task.left_run_id);
            } else {
                assert_eq!(task.presented_left_run_id, task.left_run_id);
                assert_eq!(task.presented_right_run_id, task.right_run_id);
            }
        }
    }

    #[test]
    fn rating_tally_matches_scenario_s4() {
        let store = Store::open_in_memory().unwrap();
        let experiment_id = build_experiment(&store);
        let item_id = ItemId::new("item-1");
        let r1 = succeed_run(&store, &experiment_id, &item_id, "seed=1");
        let r2 = succeed_run(&store, &experiment_id, &item_id, "seed=2");

        let task = store.insert_task(&experiment_id, &r1, &r2, true).unwrap();
        store
            .insert_rating(&task.task_id, "rater-1", RatingChoice::Left, RatingChoice::Tie, None, None)
            .unwrap();

        let summary = compute_summary(&store, &experiment_id).unwrap();
        assert_eq!(summary.total_comparisons, 1);
        assert_eq!(summary.recommended_pick, Some(r2.clone()));
        assert!((summary.win_rates[&r1] - 0.125).abs() < 1e-9);
        assert!((summary.win_rates[&r2] - 0.375).abs() < 1e-9);
    }

    #[test]
    fn summary_is_empty_without_ratings() {
        let store = Store::open_in_memory().unwrap();
        let experiment_id = build_experiment(&store);
        let item_id = ItemId::new("item-1");
        succeed_run(&store, &experiment_id, &item_id, "seed=1");
        let summary = compute_summary(&store, &experiment_id).unwrap();
        assert_eq!(summary.total_comparisons, 0);
        assert!(summary.win_rates.values().all(|rate| *rate == 0.0));
    }
}
