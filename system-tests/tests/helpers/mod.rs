// system-tests/tests/helpers/mod.rs
// ============================================================================
// Module: System Test Helpers
// Description: Shared fixtures and fake trait implementations used to drive
//              the real store, orchestrator, and pairwise crates together
//              without shelling out to ffmpeg/ffprobe or a real provider.
// Dependencies: visage-core, visage-store-sqlite, visage-providers,
//               visage-normalize, visage-metrics, sha2
// ============================================================================

//! ## Overview
//! Every fake here implements the same trait seam a production deployment
//! would plug a real implementation into (`Provider`, `NormalizeEngine`,
//! `MetricsEngine`); none of them special-case test mode inside the crates
//! under test.

#![allow(dead_code, reason = "not every helper is used by every test binary")]

use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use sha2::Digest;
use sha2::Sha256;
use visage_core::DatasetItem;
use visage_core::Experiment;
use visage_core::ExperimentId;
use visage_core::ExperimentStatus;
use visage_core::GenerationSpec;
use visage_core::GenerationSpecId;
use visage_core::ItemId;
use visage_core::Run;
use visage_core::RunId;
use visage_core::RunStatus;
use visage_core::identity;
use visage_metrics::MetricBundleV1;
use visage_metrics::MetricsEngine;
use visage_metrics::MetricsError;
use visage_metrics::derive_status_badge;
use visage_normalize::CanonArtifact;
use visage_normalize::NormalizeEngine;
use visage_normalize::NormalizeError;
use visage_providers::GenerationInput;
use visage_providers::Provider;
use visage_providers::ProviderError;
use visage_providers::RawArtifact;
use visage_store_sqlite::Store;

// ============================================================================
// SECTION: Dataset fixtures
// ============================================================================

/// Writes a deterministic, non-empty audio fixture file and returns its path
/// alongside its sha256, mirroring the known digest `H_a` from the seed
/// pipeline scenario.
pub fn write_audio_fixture(dir: &Path) -> (std::path::PathBuf, String) {
    let path = dir.join("audio.wav");
    fs::write(&path, b"RIFF-fake-pcm-audio-fixture").expect("write audio fixture");
    let sha256 = identity::sha256_file(&path).expect("hash audio fixture");
    (path, sha256)
}

/// Inserts one `DatasetItem` and one `GenerationSpec` matching the seed
/// pipeline scenario's literal inputs, returning their ids.
pub fn seed_dataset_and_spec(store: &Store, item_id: &str, spec_id: &str, audio_uri: &str) -> (ItemId, GenerationSpecId) {
    let item_id = ItemId::new(item_id);
    store
        .insert_dataset_item(&DatasetItem {
            item_id: item_id.clone(),
            subject_id: "subject-1".to_string(),
            source_video_uri: "source.mp4".to_string(),
            audio_uri: audio_uri.to_string(),
            ref_image_uri: None,
            metadata_json: None,
        })
        .expect("insert dataset item");

    let generation_spec_id = GenerationSpecId::new(spec_id);
    store
        .insert_generation_spec(&GenerationSpec {
            generation_spec_id: generation_spec_id.clone(),
            provider: "mock".to_string(),
            model: "mock-v1".to_string(),
            model_version: None,
            prompt_template: "Generate a talking head video.".to_string(),
            params_json: Some(r#"{"quality":"demo"}"#.to_string()),
            seed_policy_json: None,
        })
        .expect("insert generation spec");

    (item_id, generation_spec_id)
}

/// Inserts a `Draft` experiment against `generation_spec_id`.
pub fn seed_experiment(store: &Store, experiment_id: &str, generation_spec_id: &GenerationSpecId) -> ExperimentId {
    let experiment_id = ExperimentId::new(experiment_id);
    store
        .insert_experiment(&Experiment {
            experiment_id: experiment_id.clone(),
            generation_spec_id: generation_spec_id.clone(),
            status: ExperimentStatus::Draft,
            created_at: time::OffsetDateTime::now_utc(),
        })
        .expect("insert experiment");
    experiment_id
}

/// Enqueues one queued run per `variant_key`, content-addressed exactly the
/// way `visage-cli`'s `seed-experiment` command does it.
pub fn enqueue_variant_runs(
    store: &Store,
    experiment_id: &ExperimentId,
    item_id: &ItemId,
    variant_keys: &[&str],
    rendered_prompt: &str,
    params_json: &str,
    audio_sha256: &str,
) -> Vec<RunId> {
    variant_keys
        .iter()
        .map(|variant_key| {
            let seed = identity::seed_from_variant_key(variant_key);
            let spec_hash = identity::spec_hash("mock", "mock-v1", None, rendered_prompt, params_json, seed, audio_sha256, None).expect("spec hash");
            let run_id = RunId::new(identity::run_id(experiment_id.as_str(), item_id.as_str(), variant_key, &spec_hash));
            let run = store
                .enqueue_run(&Run {
                    run_id,
                    experiment_id: experiment_id.clone(),
                    item_id: item_id.clone(),
                    variant_key: (*variant_key).to_string(),
                    spec_hash,
                    status: RunStatus::Queued,
                    output_canon_uri: None,
                    output_sha256: None,
                    started_at: None,
                    ended_at: None,
                    error_code: None,
                    error_detail: None,
                })
                .expect("enqueue run");
            run.run_id
        })
        .collect()
}

// ============================================================================
// SECTION: Fake Provider
// ============================================================================

/// A `Provider` that never touches the network: it writes a small file whose
/// bytes are a deterministic function of the rendered prompt and seed, so
/// that two requests with identical [`GenerationInput`] content produce byte
/// identical raw artifacts. Counts every `generate` invocation so tests can
/// assert the orchestrator never calls it twice for the same idempotency key.
pub struct FakeProvider {
    output_dir: std::path::PathBuf,
    calls: AtomicUsize,
}

impl FakeProvider {
    /// Creates a fake provider that writes raw artifacts under `output_dir`.
    pub fn new(output_dir: std::path::PathBuf) -> Self {
        fs::create_dir_all(&output_dir).expect("create provider output dir");
        Self { output_dir, calls: AtomicUsize::new(0) }
    }

    /// Number of times [`Provider::generate`] has been invoked so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Provider for FakeProvider {
    fn generate(&self, input: &GenerationInput) -> Result<RawArtifact, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(input.rendered_prompt.as_bytes());
        hasher.update(input.seed.to_le_bytes());
        let digest = hex_digest(&hasher.finalize());
        let path = self.output_dir.join(format!("{digest}.raw.mp4"));
        fs::write(&path, digest.as_bytes()).map_err(|err| ProviderError::CallFailed(err.to_string()))?;
        Ok(RawArtifact {
            raw_video_uri: path.to_string_lossy().into_owned(),
            provider_job_id: Some(format!("job-{digest}")),
            cost_usd: Some(0.01),
            latency_ms: Some(5),
        })
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

// ============================================================================
// SECTION: Fake Normalizer
// ============================================================================

/// A `NormalizeEngine` that copies the raw artifact's bytes to `output_path`
/// unchanged, so the canonical sha256 is a pure function of the raw bytes
/// (needed for the "re-run produces the same canonical sha256" law).
pub struct FakeNormalizer;

impl NormalizeEngine for FakeNormalizer {
    fn normalize(&self, raw_video_uri: &Path, _audio_uri: &Path, output_path: &Path) -> Result<CanonArtifact, NormalizeError> {
        let bytes = fs::read(raw_video_uri).map_err(|err| NormalizeError::Probe(err.to_string()))?;
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).map_err(|err| NormalizeError::Spawn(err.to_string()))?;
        }
        fs::write(output_path, &bytes).map_err(|err| NormalizeError::Spawn(err.to_string()))?;
        let sha256 = identity::sha256_file(output_path)?;
        Ok(CanonArtifact { canon_uri: output_path.to_path_buf(), sha256, duration_ms: 1_000 })
    }
}

// ============================================================================
// SECTION: Fake Metrics Engine
// ============================================================================

/// A `MetricsEngine` that always reports a fully passable bundle, reusing
/// the real status-badge derivation so a badge mismatch here would still be
/// caught.
pub struct FakePassingMetricsEngine;

impl MetricsEngine for FakePassingMetricsEngine {
    fn compute_metrics(&self, _canon_video: &Path, _audio: &Path) -> Result<MetricBundleV1, MetricsError> {
        let decode_ok = true;
        let face_present_ratio = 0.95;
        let av_duration_delta_ms = 0;
        let flicker_score = 0.0;
        let freeze_frame_ratio = 0.0;
        let blur_score = 100.0;
        let mouth_audio_corr = 0.5;
        let (status_badge, reasons) = derive_status_badge(decode_ok, face_present_ratio, av_duration_delta_ms, flicker_score, freeze_frame_ratio, blur_score, mouth_audio_corr);
        Ok(MetricBundleV1 {
            decode_ok,
            video_duration_ms: 1_000,
            audio_duration_ms: 1_000,
            av_duration_delta_ms,
            fps: 30.0,
            frame_count: 30,
            scene_cut_count: 0,
            freeze_frame_ratio,
            flicker_score,
            blur_score,
            frame_diff_spike_count: 0,
            face_present_ratio,
            face_bbox_jitter: 0.0,
            landmark_jitter: 0.0,
            mouth_open_energy: 0.5,
            mouth_audio_corr,
            blink_count: Some(10),
            blink_rate_hz: Some(0.3),
            lse_d: Some(7.0),
            lse_c: Some(6.0),
            status_badge,
            reasons,
        })
    }
}
