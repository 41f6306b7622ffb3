// system-tests/tests/idempotent_generation_cost.rs
// ============================================================================
// Module: Cost Guard System Test
// Description: Proves the provider idempotency key collides across distinct
//              experiments that share (provider, spec_hash), so a re-run
//              under a different experiment never re-invokes the provider.
// ============================================================================

//! ## Overview
//! Covers scenario S2 and invariant I4. Two experiments, sharing the same
//! generation spec and dataset item, each enqueue the same three variant
//! seeds under distinct experiment_ids (so run_ids differ). After two
//! orchestrator passes, six runs are succeeded but the fake provider's
//! `generate` was only invoked three times, once per distinct spec_hash.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod helpers;

use std::collections::HashSet;

use helpers::FakeNormalizer;
use helpers::FakePassingMetricsEngine;
use helpers::FakeProvider;
use helpers::enqueue_variant_runs;
use helpers::seed_dataset_and_spec;
use helpers::seed_experiment;
use helpers::write_audio_fixture;
use visage_core::RunStatus;
use visage_orchestrator::NoopOrchestratorMetrics;
use visage_orchestrator::Orchestrator;
use visage_store_sqlite::Store;

const RENDERED_PROMPT: &str = "Generate a talking head video.";
const PARAMS_JSON: &str = r#"{"quality":"demo"}"#;
const VARIANTS: [&str; 3] = ["seed=42", "seed=123", "seed=456"];

#[test]
fn second_experiment_reuses_provider_calls_across_experiments() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let db_path = workspace.path().join("visage.sqlite3");

    let (audio_path, audio_sha256) = write_audio_fixture(workspace.path());

    let store = Store::open(&db_path).expect("open store");
    let (item_id, generation_spec_id) = seed_dataset_and_spec(&store, "item-1", "spec-1", &audio_path.to_string_lossy());
    let experiment_a = seed_experiment(&store, "exp-a", &generation_spec_id);
    let run_ids_a = enqueue_variant_runs(&store, &experiment_a, &item_id, &VARIANTS, RENDERED_PROMPT, PARAMS_JSON, &audio_sha256);

    let provider_calls = std::sync::Arc::new(FakeProvider::new(workspace.path().join("provider-raw")));

    {
        let orchestrator = Orchestrator::new(
            store,
            Box::new(SharedFakeProvider(provider_calls.clone())),
            Box::new(FakeNormalizer),
            Box::new(FakePassingMetricsEngine),
            workspace.path().join("artifacts"),
            u64::MAX,
            Box::new(NoopOrchestratorMetrics),
        );
        let processed = orchestrator.run_once(10, "worker-1").expect("first run_once");
        assert_eq!(processed, 3);
    }

    assert_eq!(provider_calls.call_count(), 3, "first pass: one provider call per distinct seed");

    // Re-open the store, seed a second experiment against the SAME item and
    // generation spec, so each variant's spec_hash is identical to experiment
    // A's, but every run_id differs because experiment_id feeds run_id.
    let store = Store::open(&db_path).expect("reopen store");
    let experiment_b = seed_experiment(&store, "exp-b", &generation_spec_id);
    let run_ids_b = enqueue_variant_runs(&store, &experiment_b, &item_id, &VARIANTS, RENDERED_PROMPT, PARAMS_JSON, &audio_sha256);

    let mut all_run_ids: HashSet<_> = run_ids_a.iter().cloned().collect();
    all_run_ids.extend(run_ids_b.iter().cloned());
    assert_eq!(all_run_ids.len(), 6, "all six run_ids across both experiments must be distinct");

    {
        let orchestrator = Orchestrator::new(
            store,
            Box::new(SharedFakeProvider(provider_calls.clone())),
            Box::new(FakeNormalizer),
            Box::new(FakePassingMetricsEngine),
            workspace.path().join("artifacts"),
            u64::MAX,
            Box::new(NoopOrchestratorMetrics),
        );
        let processed = orchestrator.run_once(10, "worker-1").expect("second run_once");
        assert_eq!(processed, 3);
    }

    assert_eq!(provider_calls.call_count(), 3, "second pass must reuse every provider call: no new invocations");

    let inspector = Store::open(&db_path).expect("reopen store for inspection");
    let succeeded_a = inspector.list_runs_by_status(&experiment_a, Some(RunStatus::Succeeded)).expect("list a");
    let succeeded_b = inspector.list_runs_by_status(&experiment_b, Some(RunStatus::Succeeded)).expect("list b");
    assert_eq!(succeeded_a.len() + succeeded_b.len(), 6, "six runs succeeded across both experiments");

    // The reused raw artifact carries through to an identical canonical
    // sha256 for matching variants in both experiments.
    let shas_a: std::collections::HashMap<_, _> = succeeded_a.iter().map(|run| (run.variant_key.clone(), run.output_sha256.clone())).collect();
    let shas_b: std::collections::HashMap<_, _> = succeeded_b.iter().map(|run| (run.variant_key.clone(), run.output_sha256.clone())).collect();
    for variant_key in VARIANTS {
        assert_eq!(shas_a.get(variant_key), shas_b.get(variant_key), "variant {variant_key} must have an identical canonical sha256 in both experiments");
    }
}

/// Wraps a shared [`FakeProvider`] so the same call counter can be observed
/// across two separately-constructed orchestrators.
struct SharedFakeProvider(std::sync::Arc<FakeProvider>);

impl visage_providers::Provider for SharedFakeProvider {
    fn generate(&self, input: &visage_providers::GenerationInput) -> Result<visage_providers::RawArtifact, visage_providers::ProviderError> {
        self.0.generate(input)
    }
}
