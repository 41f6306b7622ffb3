// crates/visage-core/src/model.rs
// ============================================================================
// Module: Visage Entity Model
// Description: The eight persisted entities of the experiment runner.
// Purpose: Give every crate a single, shared definition of the data model
//          so the store, orchestrator, and API never drift from each other.
// Dependencies: serde, crate::identifiers, crate::state
// ============================================================================

//! ## Overview
//! These structs mirror the entities in the experiment runner's data model:
//! `DatasetItem`, `GenerationSpec`, `Experiment`, `Run`, `ProviderCall`,
//! `MetricResult`, `Task`, `Rating`. None of them carry behavior beyond
//! simple accessors; mutation happens exclusively through
//! `visage-store-sqlite`'s typed operations.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::identifiers::ExperimentId;
use crate::identifiers::GenerationSpecId;
use crate::identifiers::ItemId;
use crate::identifiers::MetricResultId;
use crate::identifiers::ProviderCallId;
use crate::identifiers::RatingId;
use crate::identifiers::RunId;
use crate::identifiers::TaskId;
use crate::state::ExperimentStatus;
use crate::state::MetricResultStatus;
use crate::state::ProviderCallStatus;
use crate::state::RatingChoice;
use crate::state::RunStatus;
use crate::state::TaskStatus;

// ============================================================================
// SECTION: Dataset Item
// ============================================================================

/// A source dataset item: a video, its driving audio, and an optional
/// reference image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetItem {
    /// Primary key.
    pub item_id: ItemId,
    /// Identifier of the subject appearing in the source video.
    pub subject_id: String,
    /// URI of the source video.
    pub source_video_uri: String,
    /// URI of the driving audio.
    pub audio_uri: String,
    /// URI of an optional reference image.
    pub ref_image_uri: Option<String>,
    /// Opaque metadata, stored verbatim.
    pub metadata_json: Option<String>,
}

// ============================================================================
// SECTION: Generation Spec
// ============================================================================

/// A generation configuration: provider, model, prompt, and parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSpec {
    /// Primary key.
    pub generation_spec_id: GenerationSpecId,
    /// Provider name, e.g. `"mock"`.
    pub provider: String,
    /// Model name.
    pub model: String,
    /// Optional model version string.
    pub model_version: Option<String>,
    /// Prompt template rendered per variant.
    pub prompt_template: String,
    /// Opaque JSON parameter block.
    pub params_json: Option<String>,
    /// Opaque JSON seed policy (list of seeds or a derivation rule).
    pub seed_policy_json: Option<String>,
}

// ============================================================================
// SECTION: Experiment
// ============================================================================

/// An experiment linking a generation spec to a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    /// Primary key.
    pub experiment_id: ExperimentId,
    /// The generation spec this experiment executes.
    pub generation_spec_id: GenerationSpecId,
    /// Current lifecycle status.
    pub status: ExperimentStatus,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
}

// ============================================================================
// SECTION: Run
// ============================================================================

/// A single variant execution within an experiment.
///
/// # Invariants
/// - `UNIQUE(experiment_id, item_id, variant_key)` is enforced by the store.
/// - `run_id` is the content address of the four identifying fields.
/// - `status` only ever moves `queued -> running -> {succeeded, failed}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Content-addressed primary key.
    pub run_id: RunId,
    /// Owning experiment.
    pub experiment_id: ExperimentId,
    /// Dataset item this run was executed against.
    pub item_id: ItemId,
    /// Short string distinguishing runs within one experiment/item.
    pub variant_key: String,
    /// Content address of the fully-instantiated generation request.
    pub spec_hash: String,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// URI of the canonical output artifact, once succeeded.
    pub output_canon_uri: Option<String>,
    /// SHA-256 of the canonical output artifact, once succeeded.
    pub output_sha256: Option<String>,
    /// Timestamp the run transitioned to `running`.
    pub started_at: Option<OffsetDateTime>,
    /// Timestamp the run reached a terminal status.
    pub ended_at: Option<OffsetDateTime>,
    /// Error taxonomy kind, set only when `status == failed`.
    pub error_code: Option<String>,
    /// Human-readable error detail, set only when `status == failed`.
    pub error_detail: Option<String>,
}

// ============================================================================
// SECTION: Provider Call
// ============================================================================

/// A record of a provider invocation, keyed for idempotency.
///
/// # Invariants
/// - `UNIQUE(provider, provider_idempotency_key)`: a given spec incurs cost
///   at most once across the whole store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCall {
    /// Primary key.
    pub provider_call_id: ProviderCallId,
    /// The run this call was made on behalf of.
    pub run_id: RunId,
    /// Provider name.
    pub provider: String,
    /// `H(provider ‖ spec_hash)`.
    pub provider_idempotency_key: String,
    /// Attempt counter, starting at 1.
    pub attempt: u32,
    /// Current lifecycle status.
    pub status: ProviderCallStatus,
    /// Opaque job id returned by the provider, if any.
    pub provider_job_id: Option<String>,
    /// URI of the raw (pre-normalization) artifact, once completed.
    pub raw_artifact_uri: Option<String>,
    /// SHA-256 of the raw artifact, computed by the orchestrator.
    pub raw_artifact_sha256: Option<String>,
    /// Provider-reported cost in US dollars, if known.
    pub cost_usd: Option<f64>,
    /// Provider call latency in milliseconds, if known.
    pub latency_ms: Option<i64>,
    /// Error detail, set only when `status == failed`.
    pub error_detail: Option<String>,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
}

// ============================================================================
// SECTION: Metric Result
// ============================================================================

/// A computed metric bundle for a run.
///
/// # Invariants
/// - `UNIQUE(run_id, metric_name, metric_version)`: different versions may
///   coexist, but the same version is written exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    /// Primary key.
    pub metric_result_id: MetricResultId,
    /// The run this metric bundle was computed for.
    pub run_id: RunId,
    /// Metric bundle name, fixed to `"MetricBundleV1"` by the orchestrator.
    pub metric_name: String,
    /// Metric bundle schema version, fixed to `"1"` by the orchestrator.
    pub metric_version: String,
    /// Serialized `MetricBundleV1` JSON.
    pub value_json: String,
    /// Whether the computation succeeded.
    pub status: MetricResultStatus,
    /// Error detail, set only when `status == failed`.
    pub error_detail: Option<String>,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
}

// ============================================================================
// SECTION: Task
// ============================================================================

/// A pairwise comparison task between two runs.
///
/// # Invariants
/// - The unordered set `{left_run_id, right_run_id}` is unique per
///   experiment.
/// - If `flip` then `presented_left_run_id == right_run_id` and
///   `presented_right_run_id == left_run_id`; otherwise presentation mirrors
///   canonical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Primary key.
    pub task_id: TaskId,
    /// Owning experiment.
    pub experiment_id: ExperimentId,
    /// Canonical left run of the unordered pair.
    pub left_run_id: RunId,
    /// Canonical right run of the unordered pair.
    pub right_run_id: RunId,
    /// Run shown on the left to the rater.
    pub presented_left_run_id: RunId,
    /// Run shown on the right to the rater.
    pub presented_right_run_id: RunId,
    /// Whether presentation order was flipped relative to canonical order.
    pub flip: bool,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
}

// ============================================================================
// SECTION: Rating
// ============================================================================

/// An append-only human rating submission for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    /// Primary key.
    pub rating_id: RatingId,
    /// The task this rating answers.
    pub task_id: TaskId,
    /// Opaque identifier of the rater.
    pub rater_id: String,
    /// Realism comparison choice.
    pub choice_realism: RatingChoice,
    /// Lip-sync comparison choice.
    pub choice_lipsync: RatingChoice,
    /// Optional target-match comparison choice (persisted, not aggregated).
    pub choice_targetmatch: Option<RatingChoice>,
    /// Optional free-text notes.
    pub notes: Option<String>,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
}
