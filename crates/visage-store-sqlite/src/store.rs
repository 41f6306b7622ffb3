// crates/visage-store-sqlite/src/store.rs
// ============================================================================
// Module: Visage Store
// Description: The transactional Store over the eight-entity schema: typed
//              CRUD, the claim/finish run state machine, provider-call
//              idempotency, metric results, and pairwise tasks/ratings.
// Purpose: Be the single place mutations happen, so every unique-constraint
//          invariant in the data model is enforced by SQL, not by callers.
// Dependencies: visage-core, rusqlite, rand, serde_json, time
// ============================================================================

//! ## Overview
//! [`Store`] wraps one [`rusqlite::Connection`] behind a [`Mutex`], mirroring
//! the writer-gateway pattern of a single-writer relational store: every
//! mutating method opens a transaction, does its work, and commits or rolls
//! back as a unit. Identifiers that the spec defines as content-addressed
//! (`run_id`, `spec_hash`, the provider idempotency key) are computed by
//! `visage-core::identity` before reaching this crate; identifiers this crate
//! owns outright (`provider_call_id`, `metric_result_id`, `task_id`,
//! `rating_id`) are random 128-bit hex strings minted here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use rand::RngCore;
use rand::rngs::OsRng;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use visage_core::DatasetItem;
use visage_core::Experiment;
use visage_core::ExperimentId;
use visage_core::ExperimentStatus;
use visage_core::GenerationSpec;
use visage_core::GenerationSpecId;
use visage_core::ItemId;
use visage_core::MetricResult;
use visage_core::MetricResultId;
use visage_core::MetricResultStatus;
use visage_core::ProviderCall;
use visage_core::ProviderCallId;
use visage_core::ProviderCallStatus;
use visage_core::Rating;
use visage_core::RatingChoice;
use visage_core::RatingId;
use visage_core::Run;
use visage_core::RunId;
use visage_core::RunStatus;
use visage_core::Task;
use visage_core::TaskId;
use visage_core::TaskStatus;

use crate::error::StoreError;
use crate::schema;

// ============================================================================
// SECTION: Store
// ============================================================================

/// The typed repository over the experiment runner's relational store.
///
/// # Invariants
/// - All mutations run inside a SQLite transaction guarded by `conn`; a
///   panic or early return never leaves a half-applied write visible to
///   other callers.
pub struct Store {
    /// The single shared connection. SQLite itself serializes writers at
    /// the file level; this mutex serializes writers within one process so
    /// two threads never interleave statements on the same connection.
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (or creates) a store at `path`, applying the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be opened or the
    /// schema cannot be applied.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        schema::initialize(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Opens an in-memory store. Intended for tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::initialize(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Locks the connection mutex, surfacing poisoning as a store bug.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Violation("store connection mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Dataset Items
// ============================================================================

impl Store {
    /// Inserts a dataset item.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if `item_id` already exists.
    pub fn insert_dataset_item(&self, item: &DatasetItem) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO dataset_items (item_id, subject_id, source_video_uri, audio_uri, ref_image_uri, metadata_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.item_id.as_str(),
                item.subject_id,
                item.source_video_uri,
                item.audio_uri,
                item.ref_image_uri,
                item.metadata_json,
            ],
        )?;
        Ok(())
    }

    /// Fetches a dataset item by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn get_dataset_item(&self, item_id: &ItemId) -> Result<Option<DatasetItem>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT item_id, subject_id, source_video_uri, audio_uri, ref_image_uri, metadata_json
             FROM dataset_items WHERE item_id = ?1",
            params![item_id.as_str()],
            row_to_dataset_item,
        )
        .optional()
        .map_err(StoreError::from)
    }
}

/// Maps a `dataset_items` row to [`DatasetItem`].
fn row_to_dataset_item(row: &Row<'_>) -> rusqlite::Result<DatasetItem> {
    Ok(DatasetItem {
        item_id: ItemId::new(row.get::<_, String>(0)?),
        subject_id: row.get(1)?,
        source_video_uri: row.get(2)?,
        audio_uri: row.get(3)?,
        ref_image_uri: row.get(4)?,
        metadata_json: row.get(5)?,
    })
}

// ============================================================================
// SECTION: Generation Specs
// ============================================================================

impl Store {
    /// Inserts a generation spec.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if `generation_spec_id` already
    /// exists.
    pub fn insert_generation_spec(&self, spec: &GenerationSpec) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO generation_specs
                (generation_spec_id, provider, model, model_version, prompt_template, params_json, seed_policy_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                spec.generation_spec_id.as_str(),
                spec.provider,
                spec.model,
                spec.model_version,
                spec.prompt_template,
                spec.params_json,
                spec.seed_policy_json,
            ],
        )?;
        Ok(())
    }

    /// Fetches a generation spec by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn get_generation_spec(
        &self,
        generation_spec_id: &GenerationSpecId,
    ) -> Result<Option<GenerationSpec>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT generation_spec_id, provider, model, model_version, prompt_template, params_json, seed_policy_json
             FROM generation_specs WHERE generation_spec_id = ?1",
            params![generation_spec_id.as_str()],
            row_to_generation_spec,
        )
        .optional()
        .map_err(StoreError::from)
    }
}

/// Maps a `generation_specs` row to [`GenerationSpec`].
fn row_to_generation_spec(row: &Row<'_>) -> rusqlite::Result<GenerationSpec> {
    Ok(GenerationSpec {
        generation_spec_id: GenerationSpecId::new(row.get::<_, String>(0)?),
        provider: row.get(1)?,
        model: row.get(2)?,
        model_version: row.get(3)?,
        prompt_template: row.get(4)?,
        params_json: row.get(5)?,
        seed_policy_json: row.get(6)?,
    })
}

// ============================================================================
// SECTION: Experiments
// ============================================================================

impl Store {
    /// Inserts an experiment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if `experiment_id` already exists.
    pub fn insert_experiment(&self, experiment: &Experiment) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO experiments (experiment_id, generation_spec_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                experiment.experiment_id.as_str(),
                experiment.generation_spec_id.as_str(),
                experiment_status_str(experiment.status),
                datetime_to_str(experiment.created_at)?,
            ],
        )?;
        Ok(())
    }

    /// Fetches an experiment by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails or a stored status is
    /// unrecognized.
    pub fn get_experiment(&self, experiment_id: &ExperimentId) -> Result<Option<Experiment>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT experiment_id, generation_spec_id, status, created_at
                 FROM experiments WHERE experiment_id = ?1",
                params![experiment_id.as_str()],
                |row| {
                    let experiment_id: String = row.get(0)?;
                    let generation_spec_id: String = row.get(1)?;
                    let status: String = row.get(2)?;
                    let created_at: String = row.get(3)?;
                    Ok((experiment_id, generation_spec_id, status, created_at))
                },
            )
            .optional()?;
        let Some((experiment_id, generation_spec_id, status, created_at)) = row else {
            return Ok(None);
        };
        Ok(Some(Experiment {
            experiment_id: ExperimentId::new(experiment_id),
            generation_spec_id: GenerationSpecId::new(generation_spec_id),
            status: parse_experiment_status(&status)?,
            created_at: parse_datetime(&created_at)?,
        }))
    }

    /// Overwrites an experiment's status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the experiment does not exist.
    pub fn set_experiment_status(
        &self,
        experiment_id: &ExperimentId,
        status: ExperimentStatus,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE experiments SET status = ?1 WHERE experiment_id = ?2",
            params![experiment_status_str(status), experiment_id.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("experiment {}", experiment_id.as_str())));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Runs
// ============================================================================

/// Outcome of a completed run's processing, as reported to [`Store::finish_run`].
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The run produced a canonical artifact.
    Succeeded {
        /// URI of the canonical artifact.
        canon_uri: String,
        /// SHA-256 of the canonical artifact.
        canon_sha256: String,
    },
    /// The run failed at some step.
    Failed {
        /// Taxonomy kind from the error classes in spec §7.
        error_code: String,
        /// Human-readable detail.
        error_detail: String,
    },
}

impl Store {
    /// Inserts a new queued run. If a run already exists for
    /// `(experiment_id, item_id, variant_key)`, returns that existing run
    /// instead of erroring, per spec §4.2.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the insert fails for a reason other than
    /// the `UNIQUE(experiment_id, item_id, variant_key)` conflict.
    pub fn enqueue_run(&self, run: &Run) -> Result<Run, StoreError> {
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO runs (run_id, experiment_id, item_id, variant_key, spec_hash, status)
             VALUES (?1, ?2, ?3, ?4, ?5, 'queued')",
            params![
                run.run_id.as_str(),
                run.experiment_id.as_str(),
                run.item_id.as_str(),
                run.variant_key,
                run.spec_hash,
            ],
        );
        match result {
            Ok(_) => Ok(run.clone()),
            Err(err) => {
                let store_err = StoreError::from(err);
                if matches!(store_err, StoreError::Conflict(_)) {
                    let existing = fetch_run_by_slot(
                        &conn,
                        run.experiment_id.as_str(),
                        run.item_id.as_str(),
                        &run.variant_key,
                    )?;
                    existing.ok_or(store_err)
                } else {
                    Err(store_err)
                }
            }
        }
    }

    /// Fetches a run by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn get_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(RUN_SELECT_COLUMNS, params![run_id.as_str()], row_to_run).optional().map_err(StoreError::from)
    }

    /// Lists runs for an experiment, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn list_runs_by_status(
        &self,
        experiment_id: &ExperimentId,
        status: Option<RunStatus>,
    ) -> Result<Vec<Run>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE experiment_id = ?1{}",
            if status.is_some() { " AND status = ?2" } else { "" }
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = if let Some(status) = status {
            stmt.query_map(params![experiment_id.as_str(), run_status_str(status)], row_to_run)?
        } else {
            stmt.query_map(params![experiment_id.as_str()], row_to_run)?
        };
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Atomically claims up to `limit` queued runs, transitioning them to
    /// `running` and stamping `started_at`/`worker_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the transaction fails. Never returns a
    /// conflict: a concurrent worker racing for the same rows simply finds
    /// fewer (or none) still queued when its own `UPDATE` runs.
    pub fn claim_queued_runs(&self, limit: u32, worker_id: &str) -> Result<Vec<Run>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let ids: Vec<String> = {
            let mut stmt = tx.prepare("SELECT run_id FROM runs WHERE status = 'queued' ORDER BY run_id LIMIT ?1")?;
            let rows = stmt.query_map(params![limit], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        let now = datetime_to_str(now())?;
        let mut claimed = Vec::with_capacity(ids.len());
        for id in &ids {
            let changed = tx.execute(
                "UPDATE runs SET status = 'running', started_at = ?1, worker_id = ?2
                 WHERE run_id = ?3 AND status = 'queued'",
                params![now, worker_id, id],
            )?;
            if changed == 1 {
                claimed.push(id.clone());
            }
        }
        let mut runs = Vec::with_capacity(claimed.len());
        for id in &claimed {
            let run = tx.query_row(RUN_SELECT_COLUMNS, params![id], row_to_run)?;
            runs.push(run);
        }
        tx.commit()?;
        Ok(runs)
    }

    /// Transitions a run from `running` to a terminal status, stamping
    /// `ended_at` and the outcome fields.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Violation`] if the run is not currently
    /// `running` (a terminal-to-anything transition is a caller bug, not a
    /// recoverable condition). Returns [`StoreError::NotFound`] if the run
    /// does not exist.
    pub fn finish_run(&self, run_id: &RunId, outcome: RunOutcome) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let current: Option<String> =
            conn.query_row("SELECT status FROM runs WHERE run_id = ?1", params![run_id.as_str()], |row| row.get(0)).optional()?;
        let Some(current) = current else {
            return Err(StoreError::NotFound(format!("run {}", run_id.as_str())));
        };
        if parse_run_status(&current)? != RunStatus::Running {
            return Err(StoreError::Violation(format!(
                "finish_run called on run {} in status {current}, expected running",
                run_id.as_str()
            )));
        }
        let ended_at = datetime_to_str(now())?;
        match outcome {
            RunOutcome::Succeeded { canon_uri, canon_sha256 } => {
                conn.execute(
                    "UPDATE runs SET status = 'succeeded', output_canon_uri = ?1, output_sha256 = ?2,
                     ended_at = ?3, error_code = NULL, error_detail = NULL WHERE run_id = ?4",
                    params![canon_uri, canon_sha256, ended_at, run_id.as_str()],
                )?;
            }
            RunOutcome::Failed { error_code, error_detail } => {
                conn.execute(
                    "UPDATE runs SET status = 'failed', error_code = ?1, error_detail = ?2, ended_at = ?3
                     WHERE run_id = ?4",
                    params![error_code, error_detail, ended_at, run_id.as_str()],
                )?;
            }
        }
        Ok(())
    }
}

/// Column list shared by every `runs` row-mapping query.
const RUN_COLUMNS: &str = "run_id, experiment_id, item_id, variant_key, spec_hash, status,
     output_canon_uri, output_sha256, started_at, ended_at, error_code, error_detail";
/// Full `SELECT ... FROM runs WHERE run_id = ?1` used by single-row lookups.
const RUN_SELECT_COLUMNS: &str = "SELECT run_id, experiment_id, item_id, variant_key, spec_hash, status,
     output_canon_uri, output_sha256, started_at, ended_at, error_code, error_detail
     FROM runs WHERE run_id = ?1";

/// Looks up a run by its logical slot, used to resolve `enqueue_run`
/// conflicts to the pre-existing row.
fn fetch_run_by_slot(
    conn: &Connection,
    experiment_id: &str,
    item_id: &str,
    variant_key: &str,
) -> Result<Option<Run>, StoreError> {
    let sql = format!(
        "SELECT {RUN_COLUMNS} FROM runs WHERE experiment_id = ?1 AND item_id = ?2 AND variant_key = ?3"
    );
    conn.query_row(&sql, params![experiment_id, item_id, variant_key], row_to_run).optional().map_err(StoreError::from)
}

/// Maps a `runs` row (in [`RUN_COLUMNS`] order) to [`Run`].
fn row_to_run(row: &Row<'_>) -> rusqlite::Result<Run> {
    let status: String = row.get(5)?;
    let started_at: Option<String> = row.get(8)?;
    let ended_at: Option<String> = row.get(9)?;
    Ok(Run {
        run_id: RunId::new(row.get::<_, String>(0)?),
        experiment_id: ExperimentId::new(row.get::<_, String>(1)?),
        item_id: ItemId::new(row.get::<_, String>(2)?),
        variant_key: row.get(3)?,
        spec_hash: row.get(4)?,
        status: parse_run_status(&status).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, format!("bad run status {status}").into())
        })?,
        output_canon_uri: row.get(6)?,
        output_sha256: row.get(7)?,
        started_at: started_at.map(|text| parse_datetime_infallible(&text)).transpose()?,
        ended_at: ended_at.map(|text| parse_datetime_infallible(&text)).transpose()?,
        error_code: row.get(10)?,
        error_detail: row.get(11)?,
    })
}

// ============================================================================
// SECTION: Provider Calls
// ============================================================================

/// Outcome of [`Store::upsert_provider_call_started`].
#[derive(Debug, Clone)]
pub enum ProviderCallOutcome {
    /// A new `created` row was inserted; the caller must invoke the
    /// provider and then complete (or fail) it.
    Fresh(ProviderCall),
    /// A `completed` call with this idempotency key already exists; its
    /// artifact should be reused without re-invoking the provider.
    Reused(ProviderCall),
}

impl Store {
    /// Starts (or resumes) a provider call for `idempotency_key`.
    ///
    /// If a `completed` call already exists for `(provider,
    /// idempotency_key)`, it is returned unchanged as
    /// [`ProviderCallOutcome::Reused`]. If a `created` row exists (a prior
    /// attempt that never completed), it is returned for retry. Otherwise a
    /// new `created` row is inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the transaction fails.
    pub fn upsert_provider_call_started(
        &self,
        run_id: &RunId,
        provider: &str,
        idempotency_key: &str,
    ) -> Result<ProviderCallOutcome, StoreError> {
        let conn = self.lock()?;
        let existing = conn
            .query_row(
                &format!(
                    "SELECT {PROVIDER_CALL_COLUMNS} FROM provider_calls WHERE provider = ?1 AND provider_idempotency_key = ?2"
                ),
                params![provider, idempotency_key],
                row_to_provider_call,
            )
            .optional()?;
        if let Some(call) = existing {
            return Ok(match call.status {
                ProviderCallStatus::Completed => ProviderCallOutcome::Reused(call),
                ProviderCallStatus::Created | ProviderCallStatus::Failed => ProviderCallOutcome::Fresh(call),
            });
        }
        let provider_call_id = ProviderCallId::new(new_random_id());
        let created_at = datetime_to_str(now())?;
        conn.execute(
            "INSERT INTO provider_calls
                (provider_call_id, run_id, provider, provider_idempotency_key, attempt, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, 'created', ?5)",
            params![provider_call_id.as_str(), run_id.as_str(), provider, idempotency_key, created_at],
        )?;
        Ok(ProviderCallOutcome::Fresh(ProviderCall {
            provider_call_id,
            run_id: run_id.clone(),
            provider: provider.to_string(),
            provider_idempotency_key: idempotency_key.to_string(),
            attempt: 1,
            status: ProviderCallStatus::Created,
            provider_job_id: None,
            raw_artifact_uri: None,
            raw_artifact_sha256: None,
            cost_usd: None,
            latency_ms: None,
            error_detail: None,
            created_at: parse_datetime(&created_at)?,
        }))
    }

    /// Completes a `created` provider call with its raw artifact.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Violation`] if the call is not currently
    /// `created`. Returns [`StoreError::NotFound`] if it does not exist.
    pub fn complete_provider_call(
        &self,
        provider_call_id: &ProviderCallId,
        raw_artifact_uri: &str,
        raw_artifact_sha256: &str,
        provider_job_id: Option<&str>,
        cost_usd: Option<f64>,
        latency_ms: Option<i64>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM provider_calls WHERE provider_call_id = ?1",
                params![provider_call_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(status) = status else {
            return Err(StoreError::NotFound(format!("provider_call {}", provider_call_id.as_str())));
        };
        if status != "created" {
            return Err(StoreError::Violation(format!(
                "complete_provider_call called on call {} in status {status}, expected created",
                provider_call_id.as_str()
            )));
        }
        conn.execute(
            "UPDATE provider_calls SET status = 'completed', raw_artifact_uri = ?1, raw_artifact_sha256 = ?2,
             provider_job_id = ?3, cost_usd = ?4, latency_ms = ?5 WHERE provider_call_id = ?6",
            params![raw_artifact_uri, raw_artifact_sha256, provider_job_id, cost_usd, latency_ms, provider_call_id.as_str()],
        )?;
        Ok(())
    }

    /// Marks a `created` provider call as failed, leaving the idempotency
    /// key reserved so a second charge for the same spec is blocked.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the call does not exist.
    pub fn fail_provider_call(&self, provider_call_id: &ProviderCallId, error_detail: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE provider_calls SET status = 'failed', error_detail = ?1
             WHERE provider_call_id = ?2 AND status = 'created'",
            params![error_detail, provider_call_id.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("provider_call {}", provider_call_id.as_str())));
        }
        Ok(())
    }
}

/// Column list shared by every `provider_calls` row-mapping query.
const PROVIDER_CALL_COLUMNS: &str = "provider_call_id, run_id, provider, provider_idempotency_key, attempt, status,
     provider_job_id, raw_artifact_uri, raw_artifact_sha256, cost_usd, latency_ms, error_detail, created_at";

/// Maps a `provider_calls` row (in [`PROVIDER_CALL_COLUMNS`] order) to
/// [`ProviderCall`].
fn row_to_provider_call(row: &Row<'_>) -> rusqlite::Result<ProviderCall> {
    let status: String = row.get(5)?;
    let created_at: String = row.get(12)?;
    Ok(ProviderCall {
        provider_call_id: ProviderCallId::new(row.get::<_, String>(0)?),
        run_id: RunId::new(row.get::<_, String>(1)?),
        provider: row.get(2)?,
        provider_idempotency_key: row.get(3)?,
        attempt: row.get(4)?,
        status: parse_provider_call_status(&status).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, format!("bad provider_call status {status}").into())
        })?,
        provider_job_id: row.get(6)?,
        raw_artifact_uri: row.get(7)?,
        raw_artifact_sha256: row.get(8)?,
        cost_usd: row.get(9)?,
        latency_ms: row.get(10)?,
        error_detail: row.get(11)?,
        created_at: parse_datetime_infallible(&created_at)?,
    })
}

// ============================================================================
// SECTION: Metric Results
// ============================================================================

impl Store {
    /// Writes a metric result. `UNIQUE(run_id, metric_name, metric_version)`
    /// rejects a duplicate write of the same version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if that version was already written
    /// for this run.
    pub fn write_metric_result(
        &self,
        run_id: &RunId,
        metric_name: &str,
        metric_version: &str,
        value_json: &str,
        status: MetricResultStatus,
    ) -> Result<MetricResult, StoreError> {
        let conn = self.lock()?;
        let metric_result_id = MetricResultId::new(new_random_id());
        let created_at = datetime_to_str(now())?;
        conn.execute(
            "INSERT INTO metric_results (metric_result_id, run_id, metric_name, metric_version, value_json, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                metric_result_id.as_str(),
                run_id.as_str(),
                metric_name,
                metric_version,
                value_json,
                metric_result_status_str(status),
                created_at,
            ],
        )?;
        Ok(MetricResult {
            metric_result_id,
            run_id: run_id.clone(),
            metric_name: metric_name.to_string(),
            metric_version: metric_version.to_string(),
            value_json: value_json.to_string(),
            status,
            error_detail: None,
            created_at: parse_datetime(&created_at)?,
        })
    }

    /// Lists every metric result recorded for a run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn list_metric_results_for_run(&self, run_id: &RunId) -> Result<Vec<MetricResult>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT metric_result_id, run_id, metric_name, metric_version, value_json, status, error_detail, created_at
             FROM metric_results WHERE run_id = ?1",
        )?;
        let rows = stmt.query_map(params![run_id.as_str()], row_to_metric_result)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }
}

/// Maps a `metric_results` row to [`MetricResult`].
fn row_to_metric_result(row: &Row<'_>) -> rusqlite::Result<MetricResult> {
    let status: String = row.get(5)?;
    let created_at: String = row.get(7)?;
    Ok(MetricResult {
        metric_result_id: MetricResultId::new(row.get::<_, String>(0)?),
        run_id: RunId::new(row.get::<_, String>(1)?),
        metric_name: row.get(2)?,
        metric_version: row.get(3)?,
        value_json: row.get(4)?,
        status: parse_metric_result_status(&status).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, format!("bad metric_result status {status}").into())
        })?,
        error_detail: row.get(6)?,
        created_at: parse_datetime_infallible(&created_at)?,
    })
}

// ============================================================================
// SECTION: Tasks
// ============================================================================

impl Store {
    /// Returns every canonical pair already recorded for an experiment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn existing_pairs(&self, experiment_id: &ExperimentId) -> Result<HashSet<(RunId, RunId)>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT left_run_id, right_run_id FROM tasks WHERE experiment_id = ?1")?;
        let rows = stmt.query_map(params![experiment_id.as_str()], |row| {
            let left: String = row.get(0)?;
            let right: String = row.get(1)?;
            Ok((RunId::new(left), RunId::new(right)))
        })?;
        rows.collect::<Result<HashSet<_>, _>>().map_err(StoreError::from)
    }

    /// Inserts a pairwise comparison task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the canonical pair already exists
    /// for this experiment.
    pub fn insert_task(
        &self,
        experiment_id: &ExperimentId,
        left_run_id: &RunId,
        right_run_id: &RunId,
        flip: bool,
    ) -> Result<Task, StoreError> {
        let conn = self.lock()?;
        let task_id = TaskId::new(new_random_id());
        let (presented_left, presented_right) =
            if flip { (right_run_id.clone(), left_run_id.clone()) } else { (left_run_id.clone(), right_run_id.clone()) };
        let created_at = datetime_to_str(now())?;
        conn.execute(
            "INSERT INTO tasks
                (task_id, experiment_id, left_run_id, right_run_id, presented_left_run_id, presented_right_run_id, flip, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'open', ?8)",
            params![
                task_id.as_str(),
                experiment_id.as_str(),
                left_run_id.as_str(),
                right_run_id.as_str(),
                presented_left.as_str(),
                presented_right.as_str(),
                i64::from(flip),
                created_at,
            ],
        )?;
        Ok(Task {
            task_id,
            experiment_id: experiment_id.clone(),
            left_run_id: left_run_id.clone(),
            right_run_id: right_run_id.clone(),
            presented_left_run_id: presented_left,
            presented_right_run_id: presented_right,
            flip,
            status: TaskStatus::Open,
            created_at: parse_datetime(&created_at)?,
        })
    }

    /// Fetches a task by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?1"), params![task_id.as_str()], row_to_task)
            .optional()
            .map_err(StoreError::from)
    }

    /// Lists tasks for an experiment, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn list_tasks_by_status(
        &self,
        experiment_id: &ExperimentId,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE experiment_id = ?1{}",
            if status.is_some() { " AND status = ?2" } else { "" }
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = if let Some(status) = status {
            stmt.query_map(params![experiment_id.as_str(), task_status_str(status)], row_to_task)?
        } else {
            stmt.query_map(params![experiment_id.as_str()], row_to_task)?
        };
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Returns any one open task for an experiment, or `None`. No starvation
    /// guarantee is made across callers, per spec §4.6.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn open_task(&self, experiment_id: &ExperimentId) -> Result<Option<Task>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE experiment_id = ?1 AND status = 'open' LIMIT 1"),
            params![experiment_id.as_str()],
            row_to_task,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Marks a task done.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the task does not exist.
    pub fn mark_task_done(&self, task_id: &TaskId) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let changed =
            conn.execute("UPDATE tasks SET status = 'done' WHERE task_id = ?1", params![task_id.as_str()])?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("task {}", task_id.as_str())));
        }
        Ok(())
    }
}

/// Column list shared by every `tasks` row-mapping query.
const TASK_COLUMNS: &str = "task_id, experiment_id, left_run_id, right_run_id,
     presented_left_run_id, presented_right_run_id, flip, status, created_at";

/// Maps a `tasks` row (in [`TASK_COLUMNS`] order) to [`Task`].
fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let flip: i64 = row.get(6)?;
    let status: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    Ok(Task {
        task_id: TaskId::new(row.get::<_, String>(0)?),
        experiment_id: ExperimentId::new(row.get::<_, String>(1)?),
        left_run_id: RunId::new(row.get::<_, String>(2)?),
        right_run_id: RunId::new(row.get::<_, String>(3)?),
        presented_left_run_id: RunId::new(row.get::<_, String>(4)?),
        presented_right_run_id: RunId::new(row.get::<_, String>(5)?),
        flip: flip != 0,
        status: parse_task_status(&status).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, format!("bad task status {status}").into())
        })?,
        created_at: parse_datetime_infallible(&created_at)?,
    })
}

// ============================================================================
// SECTION: Ratings
// ============================================================================

impl Store {
    /// Appends a rating and transitions its task to `done`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the task does not exist.
    pub fn insert_rating(
        &self,
        task_id: &TaskId,
        rater_id: &str,
        choice_realism: RatingChoice,
        choice_lipsync: RatingChoice,
        choice_targetmatch: Option<RatingChoice>,
        notes: Option<&str>,
    ) -> Result<Rating, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let task_exists: Option<i64> =
            tx.query_row("SELECT 1 FROM tasks WHERE task_id = ?1", params![task_id.as_str()], |row| row.get(0)).optional()?;
        if task_exists.is_none() {
            return Err(StoreError::NotFound(format!("task {}", task_id.as_str())));
        }
        let rating_id = RatingId::new(new_random_id());
        let created_at = datetime_to_str(now())?;
        tx.execute(
            "INSERT INTO ratings
                (rating_id, task_id, rater_id, choice_realism, choice_lipsync, choice_targetmatch, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                rating_id.as_str(),
                task_id.as_str(),
                rater_id,
                rating_choice_str(choice_realism),
                rating_choice_str(choice_lipsync),
                choice_targetmatch.map(rating_choice_str),
                notes,
                created_at,
            ],
        )?;
        tx.execute("UPDATE tasks SET status = 'done' WHERE task_id = ?1", params![task_id.as_str()])?;
        tx.commit()?;
        Ok(Rating {
            rating_id,
            task_id: task_id.clone(),
            rater_id: rater_id.to_string(),
            choice_realism,
            choice_lipsync,
            choice_targetmatch,
            notes: notes.map(str::to_string),
            created_at: parse_datetime(&created_at)?,
        })
    }

    /// Lists every rating tied to the given tasks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn list_ratings_for_tasks(&self, task_ids: &[TaskId]) -> Result<Vec<Rating>, StoreError> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;
        let placeholders = std::iter::repeat_n("?", task_ids.len()).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT rating_id, task_id, rater_id, choice_realism, choice_lipsync, choice_targetmatch, notes, created_at
             FROM ratings WHERE task_id IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> =
            task_ids.iter().map(|id| id.as_str() as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(params.as_slice(), row_to_rating)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }
}

/// Maps a `ratings` row to [`Rating`].
fn row_to_rating(row: &Row<'_>) -> rusqlite::Result<Rating> {
    let choice_realism: String = row.get(3)?;
    let choice_lipsync: String = row.get(4)?;
    let choice_targetmatch: Option<String> = row.get(5)?;
    let created_at: String = row.get(7)?;
    Ok(Rating {
        rating_id: RatingId::new(row.get::<_, String>(0)?),
        task_id: TaskId::new(row.get::<_, String>(1)?),
        rater_id: row.get(2)?,
        choice_realism: parse_rating_choice(&choice_realism).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, format!("bad rating choice {choice_realism}").into())
        })?,
        choice_lipsync: parse_rating_choice(&choice_lipsync).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, format!("bad rating choice {choice_lipsync}").into())
        })?,
        choice_targetmatch: choice_targetmatch
            .map(|text| parse_rating_choice(&text))
            .transpose()
            .map_err(|_| rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, "bad rating choice".into()))?,
        notes: row.get(6)?,
        created_at: parse_datetime_infallible(&created_at)?,
    })
}

// ============================================================================
// SECTION: Status <-> TEXT Conversions
// ============================================================================

/// Renders an [`ExperimentStatus`] as its stored TEXT value.
const fn experiment_status_str(status: ExperimentStatus) -> &'static str {
    match status {
        ExperimentStatus::Draft => "draft",
        ExperimentStatus::Running => "running",
        ExperimentStatus::Complete => "complete",
    }
}

/// Parses a stored `experiments.status` value.
fn parse_experiment_status(text: &str) -> Result<ExperimentStatus, StoreError> {
    match text {
        "draft" => Ok(ExperimentStatus::Draft),
        "running" => Ok(ExperimentStatus::Running),
        "complete" => Ok(ExperimentStatus::Complete),
        other => Err(StoreError::Violation(format!("unrecognized experiment status {other}"))),
    }
}

/// Renders a [`RunStatus`] as its stored TEXT value.
const fn run_status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Queued => "queued",
        RunStatus::Running => "running",
        RunStatus::Succeeded => "succeeded",
        RunStatus::Failed => "failed",
    }
}

/// Parses a stored `runs.status` value.
fn parse_run_status(text: &str) -> Result<RunStatus, StoreError> {
    match text {
        "queued" => Ok(RunStatus::Queued),
        "running" => Ok(RunStatus::Running),
        "succeeded" => Ok(RunStatus::Succeeded),
        "failed" => Ok(RunStatus::Failed),
        other => Err(StoreError::Violation(format!("unrecognized run status {other}"))),
    }
}

/// Renders a [`ProviderCallStatus`] as its stored TEXT value.
const fn provider_call_status_str(status: ProviderCallStatus) -> &'static str {
    match status {
        ProviderCallStatus::Created => "created",
        ProviderCallStatus::Completed => "completed",
        ProviderCallStatus::Failed => "failed",
    }
}

/// Parses a stored `provider_calls.status` value.
fn parse_provider_call_status(text: &str) -> Result<ProviderCallStatus, StoreError> {
    match text {
        "created" => Ok(ProviderCallStatus::Created),
        "completed" => Ok(ProviderCallStatus::Completed),
        "failed" => Ok(ProviderCallStatus::Failed),
        other => Err(StoreError::Violation(format!("unrecognized provider_call status {other}"))),
    }
}

/// Renders a [`MetricResultStatus`] as its stored TEXT value.
const fn metric_result_status_str(status: MetricResultStatus) -> &'static str {
    match status {
        MetricResultStatus::Computed => "computed",
        MetricResultStatus::Failed => "failed",
    }
}

/// Parses a stored `metric_results.status` value.
fn parse_metric_result_status(text: &str) -> Result<MetricResultStatus, StoreError> {
    match text {
        "computed" => Ok(MetricResultStatus::Computed),
        "failed" => Ok(MetricResultStatus::Failed),
        other => Err(StoreError::Violation(format!("unrecognized metric_result status {other}"))),
    }
}

/// Renders a [`TaskStatus`] as its stored TEXT value.
const fn task_status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Open => "open",
        TaskStatus::Assigned => "assigned",
        TaskStatus::Done => "done",
        TaskStatus::Void => "void",
    }
}

/// Parses a stored `tasks.status` value.
fn parse_task_status(text: &str) -> Result<TaskStatus, StoreError> {
    match text {
        "open" => Ok(TaskStatus::Open),
        "assigned" => Ok(TaskStatus::Assigned),
        "done" => Ok(TaskStatus::Done),
        "void" => Ok(TaskStatus::Void),
        other => Err(StoreError::Violation(format!("unrecognized task status {other}"))),
    }
}

/// Renders a [`RatingChoice`] as its stored TEXT value.
const fn rating_choice_str(choice: RatingChoice) -> &'static str {
    match choice {
        RatingChoice::Left => "left",
        RatingChoice::Right => "right",
        RatingChoice::Tie => "tie",
        RatingChoice::Skip => "skip",
    }
}

/// Parses a stored rating choice value.
fn parse_rating_choice(text: &str) -> Result<RatingChoice, StoreError> {
    match text {
        "left" => Ok(RatingChoice::Left),
        "right" => Ok(RatingChoice::Right),
        "tie" => Ok(RatingChoice::Tie),
        "skip" => Ok(RatingChoice::Skip),
        other => Err(StoreError::Violation(format!("unrecognized rating choice {other}"))),
    }
}

// ============================================================================
// SECTION: Timestamp Helpers
// ============================================================================

/// Returns the current instant. Isolated in one place so it is the only
/// source of non-determinism in this crate.
fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Formats a timestamp as RFC 3339 for storage.
fn datetime_to_str(value: OffsetDateTime) -> Result<String, StoreError> {
    value.format(&Rfc3339).map_err(|err| StoreError::Db(err.to_string()))
}

/// Parses an RFC 3339 timestamp read back from storage.
fn parse_datetime(text: &str) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::parse(text, &Rfc3339).map_err(|err| StoreError::Db(err.to_string()))
}

/// Parses an RFC 3339 timestamp inside a `rusqlite` row mapper, where the
/// error type must be [`rusqlite::Error`] rather than [`StoreError`].
fn parse_datetime_infallible(text: &str) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::parse(text, &Rfc3339)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, err.to_string().into()))
}

// ============================================================================
// SECTION: Random Identifier Generation
// ============================================================================

/// Mints a random 128-bit hex identifier for entities the spec does not
/// content-address (`provider_call_id`, `metric_result_id`, `task_id`,
/// `rating_id`).
fn new_random_id() -> String {
    let mut bytes = [0_u8; 16];
    OsRng.fill_bytes(&mut bytes);
    let mut out = String::with_capacity(32);
    const HEX: &[u8; 16] = b"0123456789abcdef";
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use visage_core::GenerationSpecId;

    use super::*;

    fn sample_experiment(store: &Store) -> ExperimentId {
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
                created_at: now(),
            })
            .unwrap();
        experiment_id
    }

    fn sample_run(experiment_id: &ExperimentId, variant_key: &str) -> Run {
        let item_id = ItemId::new("item-1");
        let spec_hash = "deadbeef".to_string();
        let run_id = RunId::new(visage_core::identity::run_id(
            experiment_id.as_str(),
            item_id.as_str(),
            variant_key,
            &spec_hash,
        ));
        Run {
            run_id,
            experiment_id: experiment_id.clone(),
            item_id,
            variant_key: variant_key.to_string(),
            spec_hash,
            status: RunStatus::Queued,
            output_canon_uri: None,
            output_sha256: None,
            started_at: None,
            ended_at: None,
            error_code: None,
            error_detail: None,
        }
    }

    #[test]
    fn enqueue_run_is_idempotent_on_slot_conflict() {
        let store = Store::open_in_memory().unwrap();
        let experiment_id = sample_experiment(&store);
        let run = sample_run(&experiment_id, "seed=42");
        let first = store.enqueue_run(&run).unwrap();
        let second = store.enqueue_run(&run).unwrap();
        assert_eq!(first.run_id, second.run_id);
    }

    #[test]
    fn claim_queued_runs_transitions_to_running() {
        let store = Store::open_in_memory().unwrap();
        let experiment_id = sample_experiment(&store);
        let run = sample_run(&experiment_id, "seed=42");
        store.enqueue_run(&run).unwrap();
        let claimed = store.claim_queued_runs(10, "worker-1").unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].status, RunStatus::Running);
        assert!(claimed[0].started_at.is_some());
        let again = store.claim_queued_runs(10, "worker-2").unwrap();
        assert!(again.is_empty(), "already-claimed run must not be claimed twice");
    }

    #[test]
    fn finish_run_rejects_non_running_transition() {
        let store = Store::open_in_memory().unwrap();
        let experiment_id = sample_experiment(&store);
        let run = sample_run(&experiment_id, "seed=42");
        store.enqueue_run(&run).unwrap();
        let err = store
            .finish_run(&run.run_id, RunOutcome::Succeeded { canon_uri: "x".to_string(), canon_sha256: "y".to_string() })
            .unwrap_err();
        assert!(matches!(err, StoreError::Violation(_)));
    }

    #[test]
    fn finish_run_succeeds_after_claim() {
        let store = Store::open_in_memory().unwrap();
        let experiment_id = sample_experiment(&store);
        let run = sample_run(&experiment_id, "seed=42");
        store.enqueue_run(&run).unwrap();
        store.claim_queued_runs(10, "worker-1").unwrap();
        store
            .finish_run(&run.run_id, RunOutcome::Succeeded { canon_uri: "x".to_string(), canon_sha256: "y".to_string() })
            .unwrap();
        let fetched = store.get_run(&run.run_id).unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Succeeded);
        assert_eq!(fetched.output_canon_uri.as_deref(), Some("x"));

        let err = store
            .finish_run(&run.run_id, RunOutcome::Failed { error_code: "Metrics".to_string(), error_detail: "boom".to_string() })
            .unwrap_err();
        assert!(matches!(err, StoreError::Violation(_)), "terminal-to-anything transition must be rejected");
    }

    #[test]
    fn provider_call_idempotency_key_is_reused_across_runs() {
        let store = Store::open_in_memory().unwrap();
        let experiment_id = sample_experiment(&store);
        let run_a = sample_run(&experiment_id, "seed=1");
        let run_b = sample_run(&experiment_id, "seed=2");
        store.enqueue_run(&run_a).unwrap();
        store.enqueue_run(&run_b).unwrap();

        let key = "shared-key";
        let fresh = store.upsert_provider_call_started(&run_a.run_id, "mock", key).unwrap();
        let ProviderCallOutcome::Fresh(call) = fresh else { panic!("expected fresh call") };
        store.complete_provider_call(&call.provider_call_id, "raw.mp4", "abc123", None, Some(0.0), Some(10)).unwrap();

        let reused = store.upsert_provider_call_started(&run_b.run_id, "mock", key).unwrap();
        let ProviderCallOutcome::Reused(reused_call) = reused else { panic!("expected reused call") };
        assert_eq!(reused_call.raw_artifact_uri.as_deref(), Some("raw.mp4"));
    }

    #[test]
    fn write_metric_result_rejects_duplicate_version() {
        let store = Store::open_in_memory().unwrap();
        let experiment_id = sample_experiment(&store);
        let run = sample_run(&experiment_id, "seed=42");
        store.enqueue_run(&run).unwrap();
        store.write_metric_result(&run.run_id, "MetricBundleV1", "1", "{}", MetricResultStatus::Computed).unwrap();
        let err = store
            .write_metric_result(&run.run_id, "MetricBundleV1", "1", "{}", MetricResultStatus::Computed)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn insert_task_rejects_duplicate_canonical_pair() {
        let store = Store::open_in_memory().unwrap();
        let experiment_id = sample_experiment(&store);
        let run_a = sample_run(&experiment_id, "seed=1");
        let run_b = sample_run(&experiment_id, "seed=2");
        store.enqueue_run(&run_a).unwrap();
        store.enqueue_run(&run_b).unwrap();
        store.insert_task(&experiment_id, &run_a.run_id, &run_b.run_id, false).unwrap();
        let err = store.insert_task(&experiment_id, &run_a.run_id, &run_b.run_id, true).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn insert_rating_marks_task_done() {
        let store = Store::open_in_memory().unwrap();
        let experiment_id = sample_experiment(&store);
        let run_a = sample_run(&experiment_id, "seed=1");
        let run_b = sample_run(&experiment_id, "seed=2");
        store.enqueue_run(&run_a).unwrap();
        store.enqueue_run(&run_b).unwrap();
        let task = store.insert_task(&experiment_id, &run_a.run_id, &run_b.run_id, false).unwrap();
        store
            .insert_rating(&task.task_id, "rater-1", RatingChoice::Left, RatingChoice::Tie, None, None)
            .unwrap();
        let fetched = store.get_task(&task.task_id).unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Done);
    }

    #[test]
    fn open_rejects_newer_schema_version() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("store.sqlite3");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE schema_meta (version INTEGER NOT NULL);").unwrap();
        conn.execute("INSERT INTO schema_meta (version) VALUES (?1)", params![schema::SCHEMA_VERSION + 1]).unwrap();
        drop(conn);

        let err = Store::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::VersionMismatch(_)));
    }
}
