// crates/visage-cli/src/main.rs
// ============================================================================
// Module: Visage CLI Entry Point
// Description: Command dispatcher for the experiment runner's server,
//              worker, schema, and bring-up workflows.
// Purpose: Give an operator one binary to stand up the HTTP surface, run
//          the orchestrator loop, and seed demo experiments.
// Dependencies: clap, visage-config, visage-core, visage-orchestrator,
//               visage-pairwise, visage-providers, visage-normalize,
//               visage-metrics, visage-store-sqlite, visage-api, tokio
// ============================================================================

//! ## Overview
//! Every subcommand loads [`VisageConfig`] the same way: an explicit
//! `--config` flag overrides the `VISAGE_CONFIG` environment variable,
//! which overrides `./visage.toml`. `serve` and `worker` are the two
//! long-running commands; `migrate`, `seed-experiment`, `pairs`, and
//! `summary` are one-shot operations.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod metrics_stub;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use clap::Subcommand;
use serde::Deserialize;
use thiserror::Error;
use visage_config::VisageConfig;
use visage_core::ExperimentId;
use visage_core::identifiers::GenerationSpecId;
use visage_core::identifiers::ItemId;
use visage_core::identifiers::RunId;
use visage_core::identity;
use visage_core::model::DatasetItem;
use visage_core::model::Experiment;
use visage_core::model::GenerationSpec;
use visage_core::model::Run;
use visage_core::state::ExperimentStatus;
use visage_core::state::RunStatus;
use visage_metrics::MetricsEngine;
use visage_normalize::NormalizeEngine;
use visage_normalize::NormalizeSettings;
use visage_normalize::Normalizer;
use visage_orchestrator::NoopOrchestratorMetrics;
use visage_orchestrator::Orchestrator;
use visage_providers::MockProvider;
use visage_providers::MockProviderSettings;
use visage_providers::Provider;
use visage_store_sqlite::Store;
use visage_store_sqlite::StoreError;

use crate::metrics_stub::StubMetricsEngine;
use crate::metrics_stub::StubMetricsSettings;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "visage", about = "Experiment runner for talking-head video generation and evaluation")]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP read/write API.
    Serve(ConfigArgs),
    /// Run the orchestrator loop until interrupted.
    Worker(ConfigArgs),
    /// Initialize or upgrade the SQLite schema.
    Migrate(ConfigArgs),
    /// Create a GenerationSpec, DatasetItem, and Experiment, then enqueue
    /// one Run per seed. A bring-up convenience, not part of the core
    /// contract.
    SeedExperiment(SeedExperimentArgs),
    /// Invoke `generate_pairs` once for an experiment.
    Pairs {
        /// Config flags shared by every subcommand.
        #[command(flatten)]
        config: ConfigArgs,
        /// Experiment to generate pairwise comparison tasks for.
        experiment_id: String,
    },
    /// Print the current pairwise-comparison summary as JSON.
    Summary {
        /// Config flags shared by every subcommand.
        #[command(flatten)]
        config: ConfigArgs,
        /// Experiment to summarize.
        experiment_id: String,
    },
}

/// Config flags shared by every subcommand.
#[derive(clap::Args, Debug)]
struct ConfigArgs {
    /// Path to the TOML config file. Overrides `VISAGE_CONFIG`.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Arguments for the `seed-experiment` subcommand.
#[derive(clap::Args, Debug)]
struct SeedExperimentArgs {
    /// Config flags shared by every subcommand.
    #[command(flatten)]
    config: ConfigArgs,
    /// Path to a JSON file describing the generation spec and seed list.
    #[arg(long)]
    spec: PathBuf,
    /// Path to a JSON file describing the dataset item.
    #[arg(long)]
    item: PathBuf,
}

// ============================================================================
// SECTION: Seed Input Shapes
// ============================================================================

/// On-disk shape of the `--spec` file for `seed-experiment`.
#[derive(Debug, Deserialize)]
struct SeedSpecFile {
    provider: String,
    model: String,
    #[serde(default)]
    model_version: Option<String>,
    prompt_template: String,
    #[serde(default)]
    params_json: Option<String>,
    seeds: Vec<i64>,
}

/// On-disk shape of the `--item` file for `seed-experiment`.
#[derive(Debug, Deserialize)]
struct SeedItemFile {
    subject_id: String,
    source_video_uri: String,
    audio_uri: String,
    #[serde(default)]
    ref_image_uri: Option<String>,
    #[serde(default)]
    metadata_json: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors surfaced by the CLI's command dispatcher.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration failed to load or validate.
    #[error("config error: {0}")]
    Config(#[from] visage_config::ConfigError),
    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// Reading or parsing a `seed-experiment` input file failed.
    #[error("invalid input file {path}: {reason}")]
    Input {
        /// The file that failed to parse.
        path: PathBuf,
        /// Why it failed.
        reason: String,
    },
    /// Hashing input material for `spec_hash` failed.
    #[error("identity error: {0}")]
    Identity(#[from] identity::IdentityError),
    /// Binding or serving the HTTP API failed.
    #[error("server error: {0}")]
    Server(String),
}

type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => command_serve(args).await,
        Commands::Worker(args) => command_worker(args),
        Commands::Migrate(args) => command_migrate(args),
        Commands::SeedExperiment(args) => command_seed_experiment(args),
        Commands::Pairs { config, experiment_id } => command_pairs(config, &experiment_id),
        Commands::Summary { config, experiment_id } => command_summary(config, &experiment_id),
    }
}

/// Loads configuration per `args`, overriding `VISAGE_CONFIG` with an
/// explicit `--config` path when given.
fn load_config(args: &ConfigArgs) -> CliResult<VisageConfig> {
    Ok(VisageConfig::load(args.config.as_deref())?)
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

async fn command_serve(args: ConfigArgs) -> CliResult<()> {
    let config = load_config(&args)?;
    let store = Store::open(&config.store.path)?;
    let state = visage_api::AppState::new(store, config.artifacts.root.clone(), Arc::new(visage_api::NoopApiMetrics));
    let app = visage_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.http.bind_addr)
        .await
        .map_err(|err| CliError::Server(format!("failed to bind {}: {err}", config.http.bind_addr)))?;
    println!("visage-api listening on {}", config.http.bind_addr);
    axum::serve(listener, app).await.map_err(|err| CliError::Server(err.to_string()))?;
    Ok(())
}

// ============================================================================
// SECTION: Worker Command
// ============================================================================

fn command_worker(args: ConfigArgs) -> CliResult<()> {
    let config = load_config(&args)?;
    let orchestrator = build_orchestrator(&config)?;
    let worker_id = config.worker.worker_id.clone().unwrap_or_else(|| format!("worker-{}", std::process::id()));
    println!("visage worker {worker_id} starting, polling every {}ms", config.worker.poll_interval_ms);

    loop {
        let claimed = orchestrator.run_once(config.worker.claim_batch_size, &worker_id)?;
        if claimed == 0 {
            thread::sleep(Duration::from_millis(config.worker.poll_interval_ms));
        }
    }
}

/// Builds an [`Orchestrator`] wired to the mock provider, the subprocess
/// normalizer, and the CLI's [`StubMetricsEngine`] per `config`.
fn build_orchestrator(config: &VisageConfig) -> CliResult<Orchestrator> {
    let store = Store::open(&config.store.path)?;
    let provider: Box<dyn Provider> = Box::new(MockProvider::new(MockProviderSettings {
        cache_dir: config.provider_mock.cache_dir.clone(),
        ffmpeg_path: config.normalize.ffmpeg_path.clone(),
        output_dir: config.artifacts.root.join("provider-cache"),
    }));
    let normalizer: Box<dyn NormalizeEngine> = Box::new(Normalizer::new(NormalizeSettings {
        ffmpeg_path: config.normalize.ffmpeg_path.clone(),
        ffprobe_path: config.normalize.ffprobe_path.clone(),
        timeout: Duration::from_secs(config.normalize.timeout_s),
    }));
    let metrics_engine: Box<dyn MetricsEngine> = Box::new(StubMetricsEngine::new(StubMetricsSettings { ffprobe_path: config.normalize.ffprobe_path.clone() }));
    Ok(Orchestrator::new(
        store,
        provider,
        normalizer,
        metrics_engine,
        config.artifacts.root.clone(),
        config.artifacts.max_raw_bytes,
        Box::new(NoopOrchestratorMetrics),
    ))
}

// ============================================================================
// SECTION: Migrate Command
// ============================================================================

fn command_migrate(args: ConfigArgs) -> CliResult<()> {
    let config = load_config(&args)?;
    Store::open(&config.store.path)?;
    println!("schema applied at {}", config.store.path.display());
    Ok(())
}

// ============================================================================
// SECTION: Seed-Experiment Command
// ============================================================================

fn command_seed_experiment(args: SeedExperimentArgs) -> CliResult<()> {
    let (experiment_id, item_id, run_ids) = seed_experiment(args)?;
    println!("experiment_id={}", experiment_id.as_str());
    println!("item_id={}", item_id.as_str());
    for run_id in &run_ids {
        println!("run_id={}", run_id.as_str());
    }
    Ok(())
}

/// Creates a `GenerationSpec`, `DatasetItem`, and `Experiment` from the
/// files named in `args`, enqueues one `Run` per seed, and transitions the
/// experiment to `Running`. Returns the new experiment, item, and run ids.
fn seed_experiment(args: SeedExperimentArgs) -> CliResult<(ExperimentId, ItemId, Vec<RunId>)> {
    let config = load_config(&args.config)?;
    let store = Store::open(&config.store.path)?;

    let spec_file = read_json::<SeedSpecFile>(&args.spec)?;
    let item_file = read_json::<SeedItemFile>(&args.item)?;

    let now = time::OffsetDateTime::now_utc();
    let stamp = now.unix_timestamp();

    let item_id = ItemId::new(format!("item-{stamp}"));
    store.insert_dataset_item(&DatasetItem {
        item_id: item_id.clone(),
        subject_id: item_file.subject_id,
        source_video_uri: item_file.source_video_uri.clone(),
        audio_uri: item_file.audio_uri.clone(),
        ref_image_uri: item_file.ref_image_uri.clone(),
        metadata_json: item_file.metadata_json,
    })?;

    let generation_spec_id = GenerationSpecId::new(format!("spec-{stamp}"));
    let params_json = spec_file.params_json.unwrap_or_else(|| "{}".to_string());
    store.insert_generation_spec(&GenerationSpec {
        generation_spec_id: generation_spec_id.clone(),
        provider: spec_file.provider.clone(),
        model: spec_file.model.clone(),
        model_version: spec_file.model_version.clone(),
        prompt_template: spec_file.prompt_template.clone(),
        params_json: Some(params_json.clone()),
        seed_policy_json: Some(serde_json::to_string(&spec_file.seeds).unwrap_or_else(|_| "[]".to_string())),
    })?;

    let experiment_id = ExperimentId::new(format!("exp-{stamp}"));
    store.insert_experiment(&Experiment { experiment_id: experiment_id.clone(), generation_spec_id, status: ExperimentStatus::Draft, created_at: now })?;

    let input_audio_sha256 = identity::sha256_file(Path::new(&item_file.audio_uri))?;
    let ref_image_sha256 = item_file.ref_image_uri.as_deref().map(|path| identity::sha256_file(Path::new(path))).transpose()?;

    let mut run_ids: Vec<RunId> = Vec::with_capacity(spec_file.seeds.len());
    for seed in &spec_file.seeds {
        let variant_key = format!("seed={seed}");
        let spec_hash = identity::spec_hash(
            &spec_file.provider,
            &spec_file.model,
            spec_file.model_version.as_deref(),
            &spec_file.prompt_template,
            &params_json,
            *seed,
            &input_audio_sha256,
            ref_image_sha256.as_deref(),
        )?;
        let run_id = RunId::new(identity::run_id(experiment_id.as_str(), item_id.as_str(), &variant_key, &spec_hash));
        let run = store.enqueue_run(&Run {
            run_id: run_id.clone(),
            experiment_id: experiment_id.clone(),
            item_id: item_id.clone(),
            variant_key,
            spec_hash,
            status: RunStatus::Queued,
            output_canon_uri: None,
            output_sha256: None,
            started_at: None,
            ended_at: None,
            error_code: None,
            error_detail: None,
        })?;
        run_ids.push(run.run_id);
    }

    store.set_experiment_status(&experiment_id, ExperimentStatus::Running)?;

    Ok((experiment_id, item_id, run_ids))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> CliResult<T> {
    let bytes = std::fs::read(path).map_err(|err| CliError::Input { path: path.to_path_buf(), reason: err.to_string() })?;
    serde_json::from_slice(&bytes).map_err(|err| CliError::Input { path: path.to_path_buf(), reason: err.to_string() })
}

// ============================================================================
// SECTION: Pairs Command
// ============================================================================

fn command_pairs(config: ConfigArgs, experiment_id: &str) -> CliResult<()> {
    let config = load_config(&config)?;
    let store = Store::open(&config.store.path)?;
    let experiment_id = ExperimentId::new(experiment_id);
    let outcome = visage_pairwise::generate_pairs(&store, &experiment_id)?;
    println!("tasks_created={}", outcome.created_count);
    Ok(())
}

// ============================================================================
// SECTION: Summary Command
// ============================================================================

fn command_summary(config: ConfigArgs, experiment_id: &str) -> CliResult<()> {
    let config = load_config(&config)?;
    let store = Store::open(&config.store.path)?;
    let experiment_id = ExperimentId::new(experiment_id);
    let summary = visage_pairwise::compute_summary(&store, &experiment_id)?;
    let json = serde_json::to_string_pretty(&summary).map_err(|err| CliError::Server(format!("failed to serialize summary: {err}")))?;
    println!("{json}");
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use visage_store_sqlite::RunOutcome;

    use super::*;

    fn write_config(dir: &std::path::Path) -> PathBuf {
        let store_path = dir.join("store.sqlite3");
        let artifacts_root = dir.join("artifacts");
        let config_path = dir.join("visage.toml");
        let contents = format!(
            "[store]\npath = \"{}\"\n[artifacts]\nroot = \"{}\"\n",
            store_path.display(),
            artifacts_root.display()
        );
        std::fs::write(&config_path, contents).unwrap();
        config_path
    }

    fn write_seed_inputs(dir: &std::path::Path) -> (PathBuf, PathBuf) {
        let audio_path = dir.join("audio.wav");
        std::fs::write(&audio_path, b"fake audio bytes").unwrap();

        let spec_path = dir.join("spec.json");
        std::fs::write(
            &spec_path,
            format!(
                r#"{{"provider":"mock","model":"mock-v1","prompt_template":"a talking head","params_json":"{{}}","seeds":[1,2]}}"#
            ),
        )
        .unwrap();

        let item_path = dir.join("item.json");
        std::fs::write(
            &item_path,
            format!(
                r#"{{"subject_id":"subject-1","source_video_uri":"source.mp4","audio_uri":"{}"}}"#,
                audio_path.display().to_string().replace('\\', "\\\\")
            ),
        )
        .unwrap();

        (spec_path, item_path)
    }

    #[test]
    fn seed_experiment_enqueues_one_run_per_seed_and_marks_running() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(dir.path());
        let (spec_path, item_path) = write_seed_inputs(dir.path());

        let (experiment_id, _item_id, run_ids) =
            seed_experiment(SeedExperimentArgs { config: ConfigArgs { config: Some(config_path.clone()) }, spec: spec_path, item: item_path }).unwrap();
        assert_eq!(run_ids.len(), 2);

        let config = VisageConfig::load(Some(config_path.as_path())).unwrap();
        let store = Store::open(&config.store.path).unwrap();
        let runs = store.list_runs_by_status(&experiment_id, Some(RunStatus::Queued)).unwrap();
        assert_eq!(runs.len(), 2);

        let experiment = store.get_experiment(&experiment_id).unwrap().unwrap();
        assert_eq!(experiment.status, ExperimentStatus::Running);
    }

    #[test]
    fn seed_then_pairs_then_summary_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(dir.path());
        let (spec_path, item_path) = write_seed_inputs(dir.path());

        let (experiment_id, _item_id, _run_ids) =
            seed_experiment(SeedExperimentArgs { config: ConfigArgs { config: Some(config_path.clone()) }, spec: spec_path, item: item_path }).unwrap();

        let config = VisageConfig::load(Some(config_path.as_path())).unwrap();
        let store = Store::open(&config.store.path).unwrap();

        let claimed = store.claim_queued_runs(2, "test-worker").unwrap();
        for run in &claimed {
            store.finish_run(&run.run_id, RunOutcome::Succeeded { canon_uri: "c.mp4".to_string(), canon_sha256: "abc".to_string() }).unwrap();
        }

        command_pairs(ConfigArgs { config: Some(config_path.clone()) }, experiment_id.as_str()).unwrap();
        command_summary(ConfigArgs { config: Some(config_path) }, experiment_id.as_str()).unwrap();

        let summary = visage_pairwise::compute_summary(&store, &experiment_id).unwrap();
        assert_eq!(summary.total_comparisons, 0);
    }

    #[test]
    fn migrate_applies_schema_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(dir.path());
        command_migrate(ConfigArgs { config: Some(config_path) }).unwrap();
    }
}
