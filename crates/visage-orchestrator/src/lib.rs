// crates/visage-orchestrator/src/lib.rs
// ============================================================================
// Module: Visage Orchestrator
// Description: The per-worker run pipeline: claim a queued run, invoke the
//              provider, normalize its output, compute metrics, and persist
//              the terminal outcome.
// Purpose: Drive one run from `queued` to a terminal status without ever
//          leaving it stuck in `running`.
// Dependencies: visage-core, visage-store-sqlite, visage-providers,
//               visage-normalize, visage-metrics, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`Orchestrator::run_once`] claims up to a limit of queued runs and
//! processes each one, in order, through four steps: build the provider
//! request, call the provider (or reuse a prior completed call), normalize
//! the raw artifact, and compute its metric bundle. Every step's failure is
//! caught, classified into a [`RunFailure`], and persisted via
//! [`visage_store_sqlite::Store::finish_run`] so the worker can move on to
//! the next run rather than crash the process. Store-level errors other
//! than expected not-found lookups are treated as bugs and propagate as a
//! panic, since a worker that successfully claimed a run should never see
//! its prerequisite rows go missing or its own transition rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;
use visage_core::identifiers::RunId;
use visage_core::identity;
use visage_core::model::DatasetItem;
use visage_core::model::Run;
use visage_metrics::MetricsEngine;
use visage_metrics::MetricsError;
use visage_normalize::NormalizeEngine;
use visage_normalize::NormalizeError;
use visage_providers::GenerationInput;
use visage_providers::Provider;
use visage_providers::ProviderError;
use visage_store_sqlite::ProviderCallOutcome;
use visage_store_sqlite::RunOutcome;
use visage_store_sqlite::Store;
use visage_store_sqlite::StoreError;

// ============================================================================
// SECTION: Error Taxonomy
// ============================================================================

/// The error classes a run can fail with, per the persisted taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// A dataset file (audio or reference image) was missing or unreadable.
    InputMissing,
    /// The provider call failed.
    Provider,
    /// Normalization (transcode) failed.
    Normalize,
    /// Metrics computation failed.
    Metrics,
}

impl ErrorCode {
    /// The taxonomy string persisted as `runs.error_code`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputMissing => "input_missing",
            Self::Provider => "provider",
            Self::Normalize => "normalize",
            Self::Metrics => "metrics",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run-level failure: one of the four taxonomy classes plus a detail
/// string, ready to persist via [`RunOutcome::Failed`].
#[derive(Debug, Error, Clone)]
#[error("{code}: {detail}")]
pub struct RunFailure {
    /// The taxonomy class.
    pub code: ErrorCode,
    /// Human-readable detail, persisted verbatim.
    pub detail: String,
}

impl RunFailure {
    fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self { code, detail: detail.into() }
    }
}

impl From<ProviderError> for RunFailure {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InputMissing(detail) => Self::new(ErrorCode::InputMissing, detail),
            ProviderError::CallFailed(detail) => Self::new(ErrorCode::Provider, detail),
        }
    }
}

impl From<NormalizeError> for RunFailure {
    fn from(err: NormalizeError) -> Self {
        Self::new(ErrorCode::Normalize, err.to_string())
    }
}

impl From<MetricsError> for RunFailure {
    fn from(err: MetricsError) -> Self {
        Self::new(ErrorCode::Metrics, err.to_string())
    }
}

// ============================================================================
// SECTION: Observability
// ============================================================================

/// An observable event in the run pipeline, for metrics/telemetry sinks.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent<'a> {
    /// A run was claimed by this worker.
    RunClaimed {
        /// The claimed run.
        run_id: &'a RunId,
    },
    /// A run reached a terminal status.
    RunFinished {
        /// The finished run.
        run_id: &'a RunId,
        /// `true` if the run succeeded.
        succeeded: bool,
        /// Wall-clock time spent processing this run.
        elapsed: Duration,
    },
}

/// Narrow sink for orchestrator events. Implementations must not block the
/// run pipeline; recording should be cheap (counters, log lines).
pub trait OrchestratorMetrics: Send + Sync {
    /// Records one pipeline event.
    fn record_event(&self, event: &OrchestratorEvent<'_>);
}

/// An [`OrchestratorMetrics`] that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOrchestratorMetrics;

impl OrchestratorMetrics for NoopOrchestratorMetrics {
    fn record_event(&self, _event: &OrchestratorEvent<'_>) {}
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Drives queued runs to a terminal status, one worker's worth at a time.
pub struct Orchestrator {
    store: Store,
    provider: Box<dyn Provider>,
    normalizer: Box<dyn NormalizeEngine>,
    metrics_engine: Box<dyn MetricsEngine>,
    artifacts_root: PathBuf,
    max_raw_bytes: u64,
    metrics: Box<dyn OrchestratorMetrics>,
}

impl Orchestrator {
    /// Builds an orchestrator over the given store, using `artifacts_root`
    /// as the parent directory for per-run canonical output paths.
    /// `max_raw_bytes` rejects a freshly generated raw artifact before it is
    /// hashed or normalized, matching `[artifacts].max_raw_bytes`.
    #[must_use]
    pub fn new(
        store: Store,
        provider: Box<dyn Provider>,
        normalizer: Box<dyn NormalizeEngine>,
        metrics_engine: Box<dyn MetricsEngine>,
        artifacts_root: PathBuf,
        max_raw_bytes: u64,
        metrics: Box<dyn OrchestratorMetrics>,
    ) -> Self {
        Self { store, provider, normalizer, metrics_engine, artifacts_root, max_raw_bytes, metrics }
    }

    /// Claims up to `claim_limit` queued runs under `worker_id` and
    /// processes each to completion. Returns the number of runs processed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only if the claim query itself fails; a
    /// failure within an individual run's pipeline is caught and persisted
    /// as a failed run, not returned here.
    pub fn run_once(&self, claim_limit: u32, worker_id: &str) -> Result<usize, StoreError> {
        let claimed = self.store.claim_queued_runs(claim_limit, worker_id)?;
        for run in &claimed {
            self.metrics.record_event(&OrchestratorEvent::RunClaimed { run_id: &run.run_id });
            self.process_run(run);
        }
        Ok(claimed.len())
    }

    fn process_run(&self, run: &Run) {
        let started = Instant::now();
        let outcome = match self.try_process(run) {
            Ok((canon_uri, canon_sha256)) => RunOutcome::Succeeded { canon_uri, canon_sha256 },
            Err(failure) => {
                RunOutcome::Failed { error_code: failure.code.as_str().to_string(), error_detail: failure.detail }
            }
        };
        let succeeded = matches!(outcome, RunOutcome::Succeeded { .. });
        match self.store.finish_run(&run.run_id, outcome) {
            Ok(()) => {}
            #[allow(clippy::panic, reason = "a claimed run's own finish_run transition must never be rejected")]
            Err(err) => panic!("orchestrator bug: finish_run({}) rejected: {err}", run.run_id.as_str()),
        }
        self.metrics.record_event(&OrchestratorEvent::RunFinished {
            run_id: &run.run_id,
            succeeded,
            elapsed: started.elapsed(),
        });
    }

    fn try_process(&self, run: &Run) -> Result<(String, String), RunFailure> {
        let item = self.fetch_item(run)?;
        let prompt_spec = self.fetch_prompt_spec(run)?;

        let input_audio_sha256 = identity::sha256_file(Path::new(&item.audio_uri))
            .map_err(|err| RunFailure::new(ErrorCode::InputMissing, err.to_string()))?;
        let ref_image_sha256 = item
            .ref_image_uri
            .as_deref()
            .map(|uri| identity::sha256_file(Path::new(uri)))
            .transpose()
            .map_err(|err| RunFailure::new(ErrorCode::InputMissing, err.to_string()))?;

        let generation_input = GenerationInput {
            provider: prompt_spec.provider.clone(),
            model: prompt_spec.model.clone(),
            model_version: prompt_spec.model_version.clone(),
            rendered_prompt: prompt_spec.prompt_template.clone(),
            params_json: prompt_spec.params_json.clone().unwrap_or_else(|| "{}".to_string()),
            seed: identity::seed_from_variant_key(&run.variant_key),
            input_audio_uri: item.audio_uri.clone(),
            input_audio_sha256,
            ref_image_uri: item.ref_image_uri.clone(),
            ref_image_sha256,
        };

        let idempotency_key = identity::provider_idempotency_key(&prompt_spec.provider, &run.spec_hash);
        let (raw_video_uri, _raw_artifact_sha256) =
            self.resolve_raw_artifact(run, &prompt_spec.provider, &idempotency_key, &generation_input)?;

        let output_path = self.artifacts_root.join("runs").join(run.run_id.as_str()).join("output_canon.mp4");
        let canon = self.normalizer.normalize(Path::new(&raw_video_uri), Path::new(&item.audio_uri), &output_path)?;

        let bundle = self.metrics_engine.compute_metrics(&canon.canon_uri, Path::new(&item.audio_uri))?;
        let value_json = serde_json::to_string(&bundle)
            .map_err(|err| RunFailure::new(ErrorCode::Metrics, format!("failed to serialize metric bundle: {err}")))?;
        self.expect_no_bug(
            self.store.write_metric_result(
                &run.run_id,
                "MetricBundleV1",
                "1",
                &value_json,
                visage_core::state::MetricResultStatus::Computed,
            ),
            "write_metric_result",
        );

        Ok((canon.canon_uri.display().to_string(), canon.sha256))
    }

    fn fetch_item(&self, run: &Run) -> Result<DatasetItem, RunFailure> {
        let item = self.expect_no_bug(self.store.get_dataset_item(&run.item_id), "get_dataset_item");
        item.ok_or_else(|| RunFailure::new(ErrorCode::InputMissing, format!("dataset item {} not found", run.item_id.as_str())))
    }

    fn fetch_prompt_spec(&self, run: &Run) -> Result<visage_core::model::GenerationSpec, RunFailure> {
        let experiment = self.expect_no_bug(self.store.get_experiment(&run.experiment_id), "get_experiment");
        let experiment = experiment
            .ok_or_else(|| RunFailure::new(ErrorCode::InputMissing, format!("experiment {} not found", run.experiment_id.as_str())))?;
        let spec = self.expect_no_bug(self.store.get_generation_spec(&experiment.generation_spec_id), "get_generation_spec");
        spec.ok_or_else(|| {
            RunFailure::new(ErrorCode::InputMissing, format!("generation spec {} not found", experiment.generation_spec_id.as_str()))
        })
    }

    fn resolve_raw_artifact(
        &self,
        run: &Run,
        provider: &str,
        idempotency_key: &str,
        generation_input: &GenerationInput,
    ) -> Result<(String, String), RunFailure> {
        let outcome = self.expect_no_bug(
            self.store.upsert_provider_call_started(&run.run_id, provider, idempotency_key),
            "upsert_provider_call_started",
        );
        match outcome {
            ProviderCallOutcome::Reused(call) => {
                let uri = call
                    .raw_artifact_uri
                    .ok_or_else(|| RunFailure::new(ErrorCode::Provider, "reused provider call missing raw_artifact_uri".to_string()))?;
                let sha256 = call.raw_artifact_sha256.ok_or_else(|| {
                    RunFailure::new(ErrorCode::Provider, "reused provider call missing raw_artifact_sha256".to_string())
                })?;
                Ok((uri, sha256))
            }
            ProviderCallOutcome::Fresh(call) => match self.provider.generate(generation_input) {
                Ok(artifact) => {
                    if let Err(failure) = self.enforce_raw_size_cap(&artifact.raw_video_uri) {
                        self.expect_no_bug(
                            self.store.fail_provider_call(&call.provider_call_id, &failure.detail),
                            "fail_provider_call",
                        );
                        return Err(failure);
                    }
                    let sha256 = identity::sha256_file(Path::new(&artifact.raw_video_uri))
                        .map_err(|err| RunFailure::new(ErrorCode::Provider, format!("failed to hash raw artifact: {err}")))?;
                    self.expect_no_bug(
                        self.store.complete_provider_call(
                            &call.provider_call_id,
                            &artifact.raw_video_uri,
                            &sha256,
                            artifact.provider_job_id.as_deref(),
                            artifact.cost_usd,
                            artifact.latency_ms,
                        ),
                        "complete_provider_call",
                    );
                    Ok((artifact.raw_video_uri, sha256))
                }
                Err(err) => {
                    let failure = RunFailure::from(err);
                    self.expect_no_bug(
                        self.store.fail_provider_call(&call.provider_call_id, &failure.detail),
                        "fail_provider_call",
                    );
                    Err(failure)
                }
            },
        }
    }

    fn enforce_raw_size_cap(&self, raw_video_uri: &str) -> Result<(), RunFailure> {
        let size = std::fs::metadata(raw_video_uri)
            .map_err(|err| RunFailure::new(ErrorCode::Provider, format!("failed to stat raw artifact: {err}")))?
            .len();
        if size > self.max_raw_bytes {
            return Err(RunFailure::new(
                ErrorCode::Provider,
                format!("raw artifact of {size} bytes exceeds max_raw_bytes cap of {}", self.max_raw_bytes),
            ));
        }
        Ok(())
    }

    #[allow(clippy::panic, reason = "a store error mid-pipeline after a successful claim is an orchestrator bug, not a run failure")]
    fn expect_no_bug<T>(&self, result: Result<T, StoreError>, site: &str) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("orchestrator bug at {site}: {err}"),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
