// crates/visage-store-sqlite/src/schema.rs
// ============================================================================
// Module: Visage Store Schema
// Description: The eight-table SQLite schema plus the schema_meta version
//              guard.
// Purpose: Keep DDL in one place, reviewable independently of the query
//          code that depends on it.
// Dependencies: rusqlite
// ============================================================================

use rusqlite::Connection;

use crate::error::StoreError;

/// Current schema version this binary understands. Bumped whenever a
/// migration changes table shape.
pub const SCHEMA_VERSION: i64 = 1;

const DDL: &str = r"
CREATE TABLE IF NOT EXISTS schema_meta (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS dataset_items (
    item_id           TEXT PRIMARY KEY,
    subject_id        TEXT NOT NULL,
    source_video_uri  TEXT NOT NULL,
    audio_uri         TEXT NOT NULL,
    ref_image_uri     TEXT,
    metadata_json     TEXT
);

CREATE TABLE IF NOT EXISTS generation_specs (
    generation_spec_id TEXT PRIMARY KEY,
    provider            TEXT NOT NULL,
    model               TEXT NOT NULL,
    model_version       TEXT,
    prompt_template      TEXT NOT NULL,
    params_json         TEXT,
    seed_policy_json    TEXT
);

CREATE TABLE IF NOT EXISTS experiments (
    experiment_id       TEXT PRIMARY KEY,
    generation_spec_id  TEXT NOT NULL REFERENCES generation_specs(generation_spec_id),
    status              TEXT NOT NULL DEFAULT 'draft',
    created_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS runs (
    run_id          TEXT PRIMARY KEY,
    experiment_id   TEXT NOT NULL REFERENCES experiments(experiment_id),
    item_id         TEXT NOT NULL REFERENCES dataset_items(item_id),
    variant_key     TEXT NOT NULL,
    spec_hash       TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'queued',
    output_canon_uri TEXT,
    output_sha256   TEXT,
    started_at      TEXT,
    ended_at        TEXT,
    error_code      TEXT,
    error_detail    TEXT,
    worker_id       TEXT,
    UNIQUE (experiment_id, item_id, variant_key)
);
CREATE INDEX IF NOT EXISTS idx_runs_experiment_status ON runs (experiment_id, status);

CREATE TABLE IF NOT EXISTS provider_calls (
    provider_call_id         TEXT PRIMARY KEY,
    run_id                   TEXT NOT NULL REFERENCES runs(run_id),
    provider                 TEXT NOT NULL,
    provider_idempotency_key TEXT NOT NULL,
    attempt                  INTEGER NOT NULL DEFAULT 1,
    status                   TEXT NOT NULL DEFAULT 'created',
    provider_job_id          TEXT,
    raw_artifact_uri         TEXT,
    raw_artifact_sha256      TEXT,
    cost_usd                 REAL,
    latency_ms               INTEGER,
    error_detail             TEXT,
    created_at               TEXT NOT NULL,
    UNIQUE (provider, provider_idempotency_key)
);

CREATE TABLE IF NOT EXISTS metric_results (
    metric_result_id TEXT PRIMARY KEY,
    run_id           TEXT NOT NULL REFERENCES runs(run_id),
    metric_name      TEXT NOT NULL,
    metric_version   TEXT NOT NULL,
    value_json       TEXT NOT NULL,
    status           TEXT NOT NULL,
    error_detail     TEXT,
    created_at       TEXT NOT NULL,
    UNIQUE (run_id, metric_name, metric_version)
);

CREATE TABLE IF NOT EXISTS tasks (
    task_id                 TEXT PRIMARY KEY,
    experiment_id           TEXT NOT NULL REFERENCES experiments(experiment_id),
    left_run_id             TEXT NOT NULL REFERENCES runs(run_id),
    right_run_id            TEXT NOT NULL REFERENCES runs(run_id),
    presented_left_run_id   TEXT NOT NULL REFERENCES runs(run_id),
    presented_right_run_id  TEXT NOT NULL REFERENCES runs(run_id),
    flip                    INTEGER NOT NULL,
    status                  TEXT NOT NULL DEFAULT 'open',
    created_at              TEXT NOT NULL,
    UNIQUE (experiment_id, left_run_id, right_run_id)
);
CREATE INDEX IF NOT EXISTS idx_tasks_experiment_status ON tasks (experiment_id, status);

CREATE TABLE IF NOT EXISTS ratings (
    rating_id            TEXT PRIMARY KEY,
    task_id              TEXT NOT NULL REFERENCES tasks(task_id),
    rater_id             TEXT NOT NULL,
    choice_realism       TEXT NOT NULL,
    choice_lipsync       TEXT NOT NULL,
    choice_targetmatch   TEXT,
    notes                TEXT,
    created_at           TEXT NOT NULL
);
";

/// Opens (or creates) the schema in `conn`, enforcing the version guard.
///
/// # Errors
///
/// Returns [`StoreError::VersionMismatch`] if the database was created by a
/// newer schema version than [`SCHEMA_VERSION`], or [`StoreError::Db`] if
/// the DDL cannot be applied.
pub fn initialize(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(DDL)?;

    let stamped_version: Option<i64> =
        conn.query_row("SELECT version FROM schema_meta LIMIT 1", [], |row| row.get(0)).ok();

    match stamped_version {
        None => {
            conn.execute("INSERT INTO schema_meta (version) VALUES (?1)", [SCHEMA_VERSION])?;
        }
        Some(version) if version > SCHEMA_VERSION => {
            return Err(StoreError::VersionMismatch(format!(
                "database schema version {version} is newer than this binary's {SCHEMA_VERSION}"
            )));
        }
        Some(_) => {}
    }

    Ok(())
}
