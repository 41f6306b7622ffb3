// crates/visage-providers/src/mock.rs
// ============================================================================
// Module: Mock Provider
// Description: Deterministic reference implementation of the provider
//              contract; synthesizes a constant-color clip via ffmpeg.
// Purpose: Give the orchestrator and tests a provider with no network
//          dependency and zero cost.
// Dependencies: visage-core, sha2, std::process
// ============================================================================

//! ## Overview
//! `MockProvider` first checks a cache directory for a pre-rendered clip
//! keyed by an internal job id; if none exists it shells out to `ffmpeg` to
//! synthesize a 3-second, seed-colored clip. Both paths are deterministic
//! given the same [`crate::GenerationInput`], and cost is always zero.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Stdio;
use std::time::Duration;
use std::time::Instant;

use sha2::Digest;
use sha2::Sha256;

use crate::GenerationInput;
use crate::Provider;
use crate::ProviderError;
use crate::RawArtifact;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Length, in hex characters, of the truncated job id.
const JOB_ID_HEX_LEN: usize = 16;
/// Wall-clock budget for the synthesis subprocess.
const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(30);
/// Polling interval while waiting for the subprocess to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Duration, in seconds, of the synthesized clip.
const CLIP_DURATION_S: u32 = 3;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Runtime settings for [`MockProvider`].
#[derive(Debug, Clone, Default)]
pub struct MockProviderSettings {
    /// Directory of pre-rendered clips, keyed by job id, consulted before
    /// synthesizing a new one.
    pub cache_dir: Option<PathBuf>,
    /// Path or command name for the `ffmpeg` binary.
    pub ffmpeg_path: String,
    /// Directory synthesized clips and cache copies are written to.
    pub output_dir: PathBuf,
}

// ============================================================================
// SECTION: Mock Provider
// ============================================================================

/// Deterministic, zero-cost reference provider.
pub struct MockProvider {
    settings: MockProviderSettings,
}

impl MockProvider {
    /// Creates a new mock provider with the given settings.
    #[must_use]
    pub fn new(settings: MockProviderSettings) -> Self {
        Self { settings }
    }

    /// Computes the internal job id for a given input: the first 16 hex
    /// characters of `SHA-256(provider:model:model_version:prompt_template:
    /// seed:input_audio_sha256:ref_image_sha256)`.
    #[must_use]
    pub fn job_id(input: &GenerationInput) -> String {
        let joined = format!(
            "{}:{}:{}:{}:{}:{}:{}",
            input.provider,
            input.model,
            input.model_version.as_deref().unwrap_or(""),
            input.rendered_prompt,
            input.seed,
            input.input_audio_sha256,
            input.ref_image_sha256.as_deref().unwrap_or(""),
        );
        let digest = Sha256::digest(joined.as_bytes());
        let mut hex = String::with_capacity(digest.len() * 2);
        const HEX: &[u8; 16] = b"0123456789abcdef";
        for byte in digest {
            hex.push(HEX[(byte >> 4) as usize] as char);
            hex.push(HEX[(byte & 0x0f) as usize] as char);
        }
        hex.truncate(JOB_ID_HEX_LEN);
        hex
    }

    fn cached_path(&self, job_id: &str) -> Option<PathBuf> {
        let cache_dir = self.settings.cache_dir.as_ref()?;
        let candidate = cache_dir.join(format!("{job_id}.mp4"));
        candidate.exists().then_some(candidate)
    }

    fn synthesize(&self, seed: i64, output_path: &Path) -> Result<(), ProviderError> {
        let red = seed.wrapping_mul(37).rem_euclid(256);
        let green = seed.wrapping_mul(59).rem_euclid(256);
        let blue = seed.wrapping_mul(97).rem_euclid(256);
        let color = format!("0x{red:02x}{green:02x}{blue:02x}");
        let lavfi = format!("color=c={color}:s=640x480:d={CLIP_DURATION_S}");

        let ffmpeg_path = if self.settings.ffmpeg_path.is_empty() { "ffmpeg" } else { &self.settings.ffmpeg_path };
        let mut child = Command::new(ffmpeg_path)
            .args([
                "-y",
                "-f",
                "lavfi",
                "-i",
                &lavfi,
                "-pix_fmt",
                "yuv420p",
                "-c:v",
                "libx264",
                "-t",
                &CLIP_DURATION_S.to_string(),
            ])
            .arg(output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ProviderError::CallFailed(format!("failed to spawn ffmpeg: {err}")))?;

        let deadline = Instant::now() + SYNTHESIS_TIMEOUT;
        loop {
            if let Some(status) =
                child.try_wait().map_err(|err| ProviderError::CallFailed(format!("ffmpeg wait failed: {err}")))?
            {
                if status.success() {
                    return Ok(());
                }
                return Err(ProviderError::CallFailed(format!("ffmpeg exited with {status}")));
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProviderError::CallFailed("ffmpeg synthesis timed out".to_string()));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Provider for MockProvider {
    fn generate(&self, input: &GenerationInput) -> Result<RawArtifact, ProviderError> {
        let job_id = Self::job_id(input);
        let output_path = self.settings.output_dir.join(format!("{job_id}.mp4"));

        if let Some(cached) = self.cached_path(&job_id) {
            fs::copy(&cached, &output_path)
                .map_err(|err| ProviderError::CallFailed(format!("failed to copy cached clip: {err}")))?;
        } else {
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| ProviderError::CallFailed(format!("failed to create output dir: {err}")))?;
            }
            self.synthesize(input.seed, &output_path)?;
        }

        Ok(RawArtifact {
            raw_video_uri: output_path.display().to_string(),
            provider_job_id: Some(job_id),
            cost_usd: Some(0.0),
            latency_ms: None,
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input(seed: i64) -> GenerationInput {
        GenerationInput {
            provider: "mock".to_string(),
            model: "mock-v1".to_string(),
            model_version: None,
            rendered_prompt: "Generate a talking head video.".to_string(),
            params_json: "{}".to_string(),
            seed,
            input_audio_uri: "audio.wav".to_string(),
            input_audio_sha256: "deadbeef".to_string(),
            ref_image_uri: None,
            ref_image_sha256: None,
        }
    }

    #[test]
    fn job_id_is_deterministic_and_truncated() {
        let input = sample_input(42);
        let first = MockProvider::job_id(&input);
        let second = MockProvider::job_id(&input);
        assert_eq!(first, second);
        assert_eq!(first.len(), JOB_ID_HEX_LEN);
    }

    #[test]
    fn job_id_changes_with_seed() {
        let a = MockProvider::job_id(&sample_input(1));
        let b = MockProvider::job_id(&sample_input(2));
        assert_ne!(a, b);
    }

    #[test]
    fn cached_path_returns_none_without_cache_dir() {
        let provider = MockProvider::new(MockProviderSettings::default());
        assert!(provider.cached_path("anything").is_none());
    }

    #[test]
    fn cached_path_finds_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let job_id = "0123456789abcdef";
        fs::write(dir.path().join(format!("{job_id}.mp4")), b"fake").unwrap();
        let provider = MockProvider::new(MockProviderSettings {
            cache_dir: Some(dir.path().to_path_buf()),
            ..MockProviderSettings::default()
        });
        assert_eq!(provider.cached_path(job_id), Some(dir.path().join(format!("{job_id}.mp4"))));
    }

    #[test]
    fn generate_reuses_cached_clip_without_invoking_ffmpeg() {
        let cache_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        let input = sample_input(7);
        let job_id = MockProvider::job_id(&input);
        fs::write(cache_dir.path().join(format!("{job_id}.mp4")), b"cached-bytes").unwrap();

        let provider = MockProvider::new(MockProviderSettings {
            cache_dir: Some(cache_dir.path().to_path_buf()),
            ffmpeg_path: "ffmpeg-should-not-run".to_string(),
            output_dir: output_dir.path().to_path_buf(),
        });

        let artifact = provider.generate(&input).unwrap();
        assert_eq!(artifact.cost_usd, Some(0.0));
        let written = fs::read(&artifact.raw_video_uri).unwrap();
        assert_eq!(written, b"cached-bytes");
    }
}
