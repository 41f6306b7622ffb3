// crates/visage-config/src/lib.rs
// ============================================================================
// Module: Visage Configuration
// Description: Configuration loading and validation for Visage Bench.
// Purpose: Provide strict, fail-closed TOML config parsing with sane
//          defaults and an environment-variable override cascade.
// Dependencies: serde, toml, thiserror
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with size limits, then overlaid
//! with `VISAGE_<SECTION>_<FIELD>` environment variable overrides, then
//! validated section by section. Missing configuration fails closed: there
//! is no implicit "production" fallback for unset required fields.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "visage.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "VISAGE_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// ============================================================================
// SECTION: Top-Level Configuration
// ============================================================================

/// Root Visage Bench configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VisageConfig {
    /// SQLite store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Artifact storage configuration.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    /// Worker loop configuration.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Mock provider configuration.
    #[serde(default)]
    pub provider_mock: MockProviderConfig,
    /// Normalizer (ffmpeg) configuration.
    #[serde(default)]
    pub normalize: NormalizeConfig,
    /// HTTP API configuration.
    #[serde(default)]
    pub http: HttpConfig,
}

impl VisageConfig {
    /// Loads configuration from disk, applies environment overrides, and
    /// validates the result.
    ///
    /// Resolution order: `path`, then `VISAGE_CONFIG`, then
    /// `./visage.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or
    /// fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path);
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() as u64 > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Validation {
                field: "<file>",
                reason: "config file exceeds size limit".to_string(),
            });
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Validation { field: "<file>", reason: "config file must be utf-8".to_string() })?;
        let mut config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Overlays `VISAGE_<SECTION>_<FIELD>` environment variables onto the
    /// parsed configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("VISAGE_STORE_PATH") {
            self.store.path = PathBuf::from(value);
        }
        if let Ok(value) = env::var("VISAGE_ARTIFACTS_ROOT") {
            self.artifacts.root = PathBuf::from(value);
        }
        if let Ok(value) = env::var("VISAGE_HTTP_BIND_ADDR") {
            self.http.bind_addr = value;
        }
        if let Ok(value) = env::var("VISAGE_WORKER_WORKER_ID") {
            self.worker.worker_id = Some(value);
        }
    }

    /// Validates every section for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.artifacts.validate()?;
        self.worker.validate()?;
        self.normalize.validate()?;
        self.http.validate()?;
        Ok(())
    }
}

/// Resolves the config file path: explicit argument, then `VISAGE_CONFIG`,
/// then the default filename in the current directory.
fn resolve_path(path: Option<&Path>) -> PathBuf {
    if let Some(path) = path {
        return path.to_path_buf();
    }
    if let Ok(from_env) = env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(from_env);
    }
    PathBuf::from(DEFAULT_CONFIG_NAME)
}

// ============================================================================
// SECTION: Store Configuration
// ============================================================================

/// SQLite store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Milliseconds to wait on a locked database before failing.
    pub busy_timeout_ms: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("visage.sqlite3"), busy_timeout_ms: 5_000 }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::Validation {
                field: "store.busy_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Artifacts Configuration
// ============================================================================

/// Artifact storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Base directory for `runs/<run_id>/...` artifact trees.
    pub root: PathBuf,
    /// Byte-size cap on accepted raw provider output.
    pub max_raw_bytes: u64,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self { root: PathBuf::from("artifacts"), max_raw_bytes: 2 * 1024 * 1024 * 1024 }
    }
}

impl ArtifactsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_raw_bytes == 0 {
            return Err(ConfigError::Validation {
                field: "artifacts.max_raw_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Worker Configuration
// ============================================================================

/// Worker loop configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Milliseconds to sleep between claim attempts when idle.
    pub poll_interval_ms: u64,
    /// Maximum number of runs claimed per poll.
    pub claim_batch_size: u32,
    /// Stable identifier stamped onto claimed runs. Generated if absent.
    pub worker_id: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 500, claim_batch_size: 1, worker_id: None }
    }
}

impl WorkerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.claim_batch_size == 0 {
            return Err(ConfigError::Validation {
                field: "worker.claim_batch_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Mock Provider Configuration
// ============================================================================

/// Mock provider configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MockProviderConfig {
    /// Directory of pre-rendered clips consulted before synthesizing one.
    pub cache_dir: Option<PathBuf>,
}

// ============================================================================
// SECTION: Normalize Configuration
// ============================================================================

/// Normalizer (ffmpeg/ffprobe) configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Path or command name for the `ffmpeg` binary.
    pub ffmpeg_path: String,
    /// Path or command name for the `ffprobe` binary.
    pub ffprobe_path: String,
    /// Hard wall-clock timeout for the transcode subprocess, in seconds.
    pub timeout_s: u64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self { ffmpeg_path: "ffmpeg".to_string(), ffprobe_path: "ffprobe".to_string(), timeout_s: 300 }
    }
}

impl NormalizeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_s == 0 {
            return Err(ConfigError::Validation {
                field: "normalize.timeout_s",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: HTTP Configuration
// ============================================================================

/// HTTP API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Socket address the API server binds to.
    pub bind_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind_addr: "127.0.0.1:8080".to_string() }
    }
}

impl HttpConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|err| ConfigError::Validation { field: "http.bind_addr", reason: err.to_string() })?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    Io(String),
    /// The config file was not valid TOML.
    #[error("failed to parse config file: {0}")]
    Parse(String),
    /// A field failed validation after parsing.
    #[error("invalid config field {field}: {reason}")]
    Validation {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Human-readable reason the value was rejected.
        reason: String,
    },
}

// ============================================================================
// SECTION: Tests
// ============================================================================
