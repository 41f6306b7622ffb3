// crates/visage-providers/src/lib.rs
// ============================================================================
// Module: Visage Providers
// Description: The generation provider contract and the deterministic mock
//              reference implementation.
// Purpose: Keep generation side effects behind a narrow trait the store can
//          never see, so providers cannot accidentally bypass idempotency.
// Dependencies: visage-core, serde, serde_json, sha2, thiserror
// ============================================================================

//! ## Overview
//! A provider turns a [`GenerationInput`] into a [`RawArtifact`]. The trait
//! carries no store handle and no database reference whatsoever — that
//! absence is the whole enforcement mechanism for "providers must not touch
//! the store." This crate ships one reference implementation, `MockProvider`,
//! which is deterministic given its input and costs nothing.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod mock;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use mock::MockProvider;
pub use mock::MockProviderSettings;

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Generation Input
// ============================================================================

/// Input to a provider's [`Provider::generate`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationInput {
    /// Provider name.
    pub provider: String,
    /// Model name.
    pub model: String,
    /// Optional model version.
    pub model_version: Option<String>,
    /// Rendered prompt text.
    pub rendered_prompt: String,
    /// Opaque JSON parameter block.
    pub params_json: String,
    /// Seed derived from the run's variant key.
    pub seed: i64,
    /// Path to the driving audio file.
    pub input_audio_uri: String,
    /// SHA-256 of the driving audio file.
    pub input_audio_sha256: String,
    /// Optional path to a reference image.
    pub ref_image_uri: Option<String>,
    /// Optional SHA-256 of the reference image.
    pub ref_image_sha256: Option<String>,
}

// ============================================================================
// SECTION: Raw Artifact
// ============================================================================

/// The raw (pre-normalization) output of a provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArtifact {
    /// Path to the raw video file the provider produced.
    pub raw_video_uri: String,
    /// Opaque job id reported by the provider, if any.
    pub provider_job_id: Option<String>,
    /// Cost in US dollars reported by the provider, if any.
    pub cost_usd: Option<f64>,
    /// Latency in milliseconds reported by the provider, if any.
    pub latency_ms: Option<i64>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors a provider may raise during generation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A required input file (audio or reference image) could not be found.
    #[error("provider input missing: {0}")]
    InputMissing(String),
    /// The provider's subprocess or network call failed.
    #[error("provider call failed: {0}")]
    CallFailed(String),
}

// ============================================================================
// SECTION: Provider Trait
// ============================================================================

/// Narrow generation contract. Implementations MUST NOT persist into any
/// store or emit side effects beyond producing the raw artifact file.
pub trait Provider: Send + Sync {
    /// Generates a raw artifact for the given input.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if generation fails for any reason.
    fn generate(&self, input: &GenerationInput) -> Result<RawArtifact, ProviderError>;
}
