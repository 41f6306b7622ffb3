// crates/visage-metrics/src/lib.rs
// ============================================================================
// Module: Visage Metrics
// Description: The fixed MetricBundleV1 schema, its status-badge derivation,
//              and the trait boundary external metric engines implement.
// Purpose: Model the metric bundle as a tagged struct, not a free-form map,
//          and make badge derivation a total function of the bundle.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! This crate does not decode video or detect faces — that work belongs to
//! whatever [`MetricsEngine`] implementation a deployment plugs in. What
//! lives here is the fixed output schema ([`MetricBundleV1`]) and the
//! status-badge rule (§6.4) that both the metrics engine and the read API
//! must agree on.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Status Badge
// ============================================================================

/// Overall quality verdict derived from a [`MetricBundleV1`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBadge {
    /// No disqualifying or flagged condition fired.
    Pass,
    /// A non-fatal quality condition fired.
    Flagged,
    /// A disqualifying condition fired.
    Reject,
}

// ============================================================================
// SECTION: Metric Bundle
// ============================================================================

/// The complete, fixed-schema result of metric computation on one run's
/// canonical artifact.
///
/// # Invariants
/// - Every field MUST be populated by a conforming [`MetricsEngine`]
///   implementation; there is no partially-filled variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBundleV1 {
    /// Whether the canonical video decoded successfully.
    pub decode_ok: bool,
    /// Video stream duration, in milliseconds.
    pub video_duration_ms: i64,
    /// Audio stream duration, in milliseconds.
    pub audio_duration_ms: i64,
    /// `|video_duration_ms - audio_duration_ms|`.
    pub av_duration_delta_ms: i64,
    /// Frame rate of the decoded video.
    pub fps: f64,
    /// Total decoded frame count.
    pub frame_count: i64,
    /// Number of detected scene cuts.
    pub scene_cut_count: i64,
    /// Fraction of frames considered frozen, in `[0, 1]`.
    pub freeze_frame_ratio: f64,
    /// Frame-to-frame flicker score, non-negative.
    pub flicker_score: f64,
    /// Blur score, non-negative (higher is sharper).
    pub blur_score: f64,
    /// Count of abrupt frame-difference spikes.
    pub frame_diff_spike_count: i64,
    /// Fraction of frames with a detected face, in `[0, 1]`.
    pub face_present_ratio: f64,
    /// Frame-to-frame jitter of the face bounding box, non-negative.
    pub face_bbox_jitter: f64,
    /// Frame-to-frame jitter of facial landmarks, non-negative.
    pub landmark_jitter: f64,
    /// Mouth-open energy over the clip, non-negative.
    pub mouth_open_energy: f64,
    /// Correlation between mouth motion and the audio envelope, in
    /// `[-1, 1]`.
    pub mouth_audio_corr: f64,
    /// Detected blink count, when computable.
    pub blink_count: Option<i64>,
    /// Blink rate in Hz, when computable.
    pub blink_rate_hz: Option<f64>,
    /// SyncNet LSE-D score, when the optional Tier 2 pass ran.
    pub lse_d: Option<f64>,
    /// SyncNet LSE-C score, when the optional Tier 2 pass ran.
    pub lse_c: Option<f64>,
    /// Derived overall verdict.
    pub status_badge: StatusBadge,
    /// Every condition that fired, in evaluation order.
    pub reasons: Vec<String>,
}

// ============================================================================
// SECTION: Status Derivation Thresholds
// ============================================================================

/// Minimum passable `face_present_ratio`; at or below rejects.
const REJECT_FACE_PRESENT_FLOOR: f64 = 0.2;
/// Maximum passable `av_duration_delta_ms`; above rejects.
const REJECT_AV_DELTA_CEILING_MS: i64 = 500;
/// Maximum passable `flicker_score`; above flags.
const FLAG_FLICKER_CEILING: f64 = 10.0;
/// Maximum passable `freeze_frame_ratio`; above flags.
const FLAG_FREEZE_CEILING: f64 = 0.3;
/// Minimum passable `blur_score`; below flags.
const FLAG_BLUR_FLOOR: f64 = 20.0;
/// Minimum passable `mouth_audio_corr`; below flags.
const FLAG_MOUTH_AUDIO_CORR_FLOOR: f64 = -0.1;

/// Derives the status badge and accumulated reasons for a partially built
/// bundle, given the fields the derivation depends on.
///
/// Every condition is evaluated unconditionally; `reasons` accumulates an
/// entry for every condition that fired regardless of which tier ultimately
/// decides the badge. Reject dominates flagged dominates pass.
#[must_use]
#[allow(
    clippy::too_many_arguments,
    reason = "mirrors the fixed field list the status derivation depends on; grouping would obscure which condition fired"
)]
pub fn derive_status_badge(
    decode_ok: bool,
    face_present_ratio: f64,
    av_duration_delta_ms: i64,
    flicker_score: f64,
    freeze_frame_ratio: f64,
    blur_score: f64,
    mouth_audio_corr: f64,
) -> (StatusBadge, Vec<String>) {
    let mut reject_reasons = Vec::new();
    let mut flagged_reasons = Vec::new();

    if !decode_ok {
        reject_reasons.push("decode_ok=false".to_string());
    }
    if face_present_ratio < REJECT_FACE_PRESENT_FLOOR {
        reject_reasons.push(format!("face_present_ratio={face_present_ratio} < {REJECT_FACE_PRESENT_FLOOR}"));
    }
    if av_duration_delta_ms > REJECT_AV_DELTA_CEILING_MS {
        reject_reasons.push(format!("av_duration_delta_ms={av_duration_delta_ms} > {REJECT_AV_DELTA_CEILING_MS}"));
    }

    if flicker_score > FLAG_FLICKER_CEILING {
        flagged_reasons.push(format!("flicker_score={flicker_score} > {FLAG_FLICKER_CEILING}"));
    }
    if freeze_frame_ratio > FLAG_FREEZE_CEILING {
        flagged_reasons.push(format!("freeze_frame_ratio={freeze_frame_ratio} > {FLAG_FREEZE_CEILING}"));
    }
    if blur_score < FLAG_BLUR_FLOOR {
        flagged_reasons.push(format!("blur_score={blur_score} < {FLAG_BLUR_FLOOR}"));
    }
    if mouth_audio_corr < FLAG_MOUTH_AUDIO_CORR_FLOOR {
        flagged_reasons.push(format!("mouth_audio_corr={mouth_audio_corr} < {FLAG_MOUTH_AUDIO_CORR_FLOOR}"));
    }

    if !reject_reasons.is_empty() {
        reject_reasons.extend(flagged_reasons);
        (StatusBadge::Reject, reject_reasons)
    } else if !flagged_reasons.is_empty() {
        (StatusBadge::Flagged, flagged_reasons)
    } else {
        (StatusBadge::Pass, Vec::new())
    }
}

// ============================================================================
// SECTION: Metrics Engine Trait
// ============================================================================

/// Errors a metrics engine may raise while computing a bundle.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The canonical video or audio could not be decoded or probed.
    #[error("metrics computation failed: {0}")]
    Computation(String),
}

/// External metrics computation boundary. Production implementations decode
/// video, run face detection, and optionally SyncNet; this crate ships none
/// of that, only the schema and trait.
pub trait MetricsEngine: Send + Sync {
    /// Computes the full metric bundle for a canonical video and its audio.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if computation fails.
    fn compute_metrics(&self, canon_video: &Path, audio: &Path) -> Result<MetricBundleV1, MetricsError>;
}

// ============================================================================
// SECTION: Tests
// ============================================================================
