// crates/visage-normalize/src/lib.rs
// ============================================================================
// Module: Visage Normalizer
// Description: ffmpeg/ffprobe-backed transcoding of raw provider output into
//              the canonical MP4 format.
// Purpose: Guarantee every run's output meets one fixed, comparable format
//          regardless of what the provider produced.
// Dependencies: visage-core, serde_json, std::process
// ============================================================================

//! ## Overview
//! [`Normalizer::normalize`] runs two child processes: an `ffprobe` pass to
//! read the driving audio's duration, and an `ffmpeg` pass that transcodes
//! the raw video to H.264/AAC at 30 fps with `faststart`, truncated to the
//! audio's duration. Both passes are bounded by a single wall-clock budget.
//! The canonical artifact's SHA-256 is computed by [`visage_core::identity`]
//! to keep hashing logic in exactly one place.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Stdio;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;
use visage_core::identity;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Canonical output frame rate.
const CANONICAL_FPS: u32 = 30;
/// Canonical video codec.
const CANONICAL_VIDEO_CODEC: &str = "libx264";
/// Canonical audio codec.
const CANONICAL_AUDIO_CODEC: &str = "aac";
/// Canonical pixel format (4:2:0 chroma subsampling).
const CANONICAL_PIXEL_FORMAT: &str = "yuv420p";
/// Interval at which the transcode subprocess is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Runtime settings for [`Normalizer`].
#[derive(Debug, Clone)]
pub struct NormalizeSettings {
    /// Path or command name for the `ffmpeg` binary.
    pub ffmpeg_path: String,
    /// Path or command name for the `ffprobe` binary.
    pub ffprobe_path: String,
    /// Hard wall-clock budget for the transcode subprocess.
    pub timeout: Duration,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self { ffmpeg_path: "ffmpeg".to_string(), ffprobe_path: "ffprobe".to_string(), timeout: Duration::from_secs(300) }
    }
}

// ============================================================================
// SECTION: Canonical Artifact
// ============================================================================

/// The result of a successful normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonArtifact {
    /// Path to the canonical MP4.
    pub canon_uri: PathBuf,
    /// SHA-256 of the canonical MP4's bytes.
    pub sha256: String,
    /// Duration of the canonical artifact, in milliseconds.
    pub duration_ms: u64,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while normalizing a raw artifact.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The audio input could not be probed for duration.
    #[error("failed to probe audio duration: {0}")]
    Probe(String),
    /// The transcode subprocess could not be spawned.
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(String),
    /// The transcode subprocess exited non-zero.
    #[error("ffmpeg exited with {0}")]
    NonZeroExit(String),
    /// The transcode subprocess did not finish within the timeout.
    #[error("ffmpeg normalization timed out after {0:?}")]
    Timeout(Duration),
    /// Hashing the produced canonical artifact failed.
    #[error("failed to hash canonical artifact: {0}")]
    Hash(#[from] visage_core::identity::IdentityError),
}

// ============================================================================
// SECTION: Normalize Engine Trait
// ============================================================================

/// Trait boundary the run orchestrator normalizes through, so tests can
/// inject a fake that copies bytes instead of invoking `ffmpeg`.
pub trait NormalizeEngine: Send + Sync {
    /// Transcodes `raw_video_uri` into the canonical format at
    /// `output_path`, truncated to `audio_uri`'s duration.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError`] if normalization fails.
    fn normalize(&self, raw_video_uri: &Path, audio_uri: &Path, output_path: &Path) -> Result<CanonArtifact, NormalizeError>;
}

impl NormalizeEngine for Normalizer {
    fn normalize(&self, raw_video_uri: &Path, audio_uri: &Path, output_path: &Path) -> Result<CanonArtifact, NormalizeError> {
        self.normalize(raw_video_uri, audio_uri, output_path)
    }
}

// ============================================================================
// SECTION: Normalizer
// ============================================================================

/// Subprocess-backed video normalizer.
pub struct Normalizer {
    settings: NormalizeSettings,
}

impl Normalizer {
    /// Creates a new normalizer with the given settings.
    #[must_use]
    pub fn new(settings: NormalizeSettings) -> Self {
        Self { settings }
    }

    /// Transcodes `raw_video_uri` into the canonical format at
    /// `output_path`, truncated to `audio_uri`'s duration.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError`] if probing or transcoding fails or times
    /// out, or if hashing the produced file fails.
    pub fn normalize(
        &self,
        raw_video_uri: &Path,
        audio_uri: &Path,
        output_path: &Path,
    ) -> Result<CanonArtifact, NormalizeError> {
        let audio_duration_s = self.probe_audio_duration_seconds(audio_uri)?;
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| NormalizeError::Spawn(err.to_string()))?;
        }
        self.transcode(raw_video_uri, audio_uri, audio_duration_s, output_path)?;
        let sha256 = identity::sha256_file(output_path)?;
        #[allow(
            clippy::cast_possible_truncation,
            reason = "audio durations are bounded well under u64::MAX milliseconds"
        )]
        #[allow(clippy::cast_sign_loss, reason = "ffprobe durations are always non-negative")]
        let duration_ms = (audio_duration_s * 1000.0).round() as u64;
        Ok(CanonArtifact { canon_uri: output_path.to_path_buf(), sha256, duration_ms })
    }

    fn probe_audio_duration_seconds(&self, audio_uri: &Path) -> Result<f64, NormalizeError> {
        let output = Command::new(&self.settings.ffprobe_path)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "json",
            ])
            .arg(audio_uri)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| NormalizeError::Probe(err.to_string()))?;

        if !output.status.success() {
            return Err(NormalizeError::Probe(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let parsed: serde_json::Value =
            serde_json::from_slice(&output.stdout).map_err(|err| NormalizeError::Probe(err.to_string()))?;
        let duration_str = parsed
            .get("format")
            .and_then(|format| format.get("duration"))
            .and_then(|value| value.as_str())
            .ok_or_else(|| NormalizeError::Probe("ffprobe output missing format.duration".to_string()))?;
        duration_str
            .parse::<f64>()
            .map_err(|err| NormalizeError::Probe(format!("could not parse duration {duration_str}: {err}")))
    }

    fn transcode(&self, raw_video_uri: &Path, audio_uri: &Path, duration_s: f64, output_path: &Path) -> Result<(), NormalizeError> {
        let mut child = Command::new(&self.settings.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(raw_video_uri)
            .arg("-i")
            .arg(audio_uri)
            .args(["-map", "0:v:0"])
            .args(["-map", "1:a:0"])
            .args(["-r", &CANONICAL_FPS.to_string()])
            .args(["-pix_fmt", CANONICAL_PIXEL_FORMAT])
            .args(["-c:v", CANONICAL_VIDEO_CODEC])
            .args(["-c:a", CANONICAL_AUDIO_CODEC])
            .args(["-t", &format!("{duration_s:.3}")])
            .args(["-movflags", "+faststart"])
            .arg(output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| NormalizeError::Spawn(err.to_string()))?;

        let deadline = Instant::now() + self.settings.timeout;
        loop {
            if let Some(status) = child.try_wait().map_err(|err| NormalizeError::Spawn(err.to_string()))? {
                if status.success() {
                    return Ok(());
                }
                return Err(NormalizeError::NonZeroExit(status.to_string()));
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(NormalizeError::Timeout(self.settings.timeout));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
