// crates/visage-cli/src/metrics_stub.rs
// ============================================================================
// Module: Stub Metrics Engine
// Description: A minimal `MetricsEngine` implementation the CLI wires into
//              the worker loop when no production engine is configured.
// Purpose: Let `visage worker` run end-to-end without a real face-detection
//          or SyncNet backend; probes real duration via `ffprobe` and fills
//          every other field with a fixed, always-passable value.
// Dependencies: serde_json, visage-metrics, std::process
// ============================================================================

//! This is bring-up glue, not a production metrics engine: SPEC_FULL.md §1
//! treats video decoding and face-landmark extraction as out of scope for
//! this crate, so there is no shipped implementation to call. A deployment
//! that needs real quality scores should implement [`MetricsEngine`] itself
//! and hand it to [`visage_orchestrator::Orchestrator::new`] in place of
//! this stub.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::process::Command;
use std::process::Stdio;

use visage_metrics::MetricBundleV1;
use visage_metrics::MetricsEngine;
use visage_metrics::MetricsError;
use visage_metrics::derive_status_badge;

// ============================================================================
// SECTION: Stub Engine
// ============================================================================

/// Settings for [`StubMetricsEngine`].
#[derive(Debug, Clone)]
pub struct StubMetricsSettings {
    /// Path or command name for the `ffprobe` binary, used only to confirm
    /// the canonical video decodes and to read its duration.
    pub ffprobe_path: String,
}

/// Probes decode success and duration via `ffprobe`; every face/quality
/// field is a fixed, always-passable placeholder.
pub struct StubMetricsEngine {
    settings: StubMetricsSettings,
}

impl StubMetricsEngine {
    /// Creates a new stub engine with the given settings.
    #[must_use]
    pub fn new(settings: StubMetricsSettings) -> Self {
        Self { settings }
    }

    fn probe_duration_ms(&self, video: &Path) -> Option<i64> {
        let output = Command::new(&self.settings.ffprobe_path)
            .args(["-v", "error", "-show_entries", "format=duration", "-of", "json"])
            .arg(video)
            .stdin(Stdio::null())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).ok()?;
        let duration_s: f64 = parsed.get("format")?.get("duration")?.as_str()?.parse().ok()?;
        #[allow(clippy::cast_possible_truncation, reason = "clip durations are bounded well under i64::MAX milliseconds")]
        #[allow(clippy::cast_sign_loss, reason = "ffprobe durations are always non-negative")]
        let duration_ms = (duration_s * 1000.0).round() as i64;
        Some(duration_ms)
    }
}

impl MetricsEngine for StubMetricsEngine {
    fn compute_metrics(&self, canon_video: &Path, audio: &Path) -> Result<MetricBundleV1, MetricsError> {
        let video_duration_ms = self.probe_duration_ms(canon_video).ok_or_else(|| MetricsError::Computation(format!("could not probe {}", canon_video.display())))?;
        let audio_duration_ms = self.probe_duration_ms(audio).unwrap_or(video_duration_ms);
        let av_duration_delta_ms = (video_duration_ms - audio_duration_ms).abs();

        let decode_ok = true;
        let face_present_ratio = 1.0;
        let flicker_score = 0.0;
        let freeze_frame_ratio = 0.0;
        let blur_score = 100.0;
        let mouth_audio_corr = 0.5;

        let (status_badge, reasons) = derive_status_badge(decode_ok, face_present_ratio, av_duration_delta_ms, flicker_score, freeze_frame_ratio, blur_score, mouth_audio_corr);

        Ok(MetricBundleV1 {
            decode_ok,
            video_duration_ms,
            audio_duration_ms,
            av_duration_delta_ms,
            fps: 30.0,
            frame_count: 0,
            scene_cut_count: 0,
            freeze_frame_ratio,
            flicker_score,
            blur_score,
            frame_diff_spike_count: 0,
            face_present_ratio,
            face_bbox_jitter: 0.0,
            landmark_jitter: 0.0,
            mouth_open_energy: 0.0,
            mouth_audio_corr,
            blink_count: None,
            blink_rate_hz: None,
            lse_d: None,
            lse_c: None,
            status_badge,
            reasons,
        })
    }
}
