// crates/visage-core/src/lib.rs
// ============================================================================
// Module: Visage Core
// Description: Domain types, identifiers, and content-addressed identity
//              functions shared by every Visage Bench crate.
// Purpose: Provide the execution/reproducibility layer's pure data model.
// Dependencies: serde, serde_json, serde_jcs, sha2, thiserror, time
// ============================================================================

//! ## Overview
//! This crate has no side effects: it defines the entity model (§3 of the
//! experiment-runner design), the status enums and their legal transitions,
//! and the pure hash functions that give specs, runs, and provider calls
//! stable, content-addressed identity. Every other crate in the workspace
//! depends on this one; this one depends on nothing in the workspace.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod identifiers;
pub mod identity;
pub mod model;
pub mod state;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use identifiers::ExperimentId;
pub use identifiers::GenerationSpecId;
pub use identifiers::ItemId;
pub use identifiers::MetricResultId;
pub use identifiers::ProviderCallId;
pub use identifiers::RatingId;
pub use identifiers::RunId;
pub use identifiers::TaskId;
pub use identity::IdentityError;
pub use model::DatasetItem;
pub use model::Experiment;
pub use model::GenerationSpec;
pub use model::MetricResult;
pub use model::ProviderCall;
pub use model::Rating;
pub use model::Run;
pub use model::Task;
pub use state::ExperimentStatus;
pub use state::MetricResultStatus;
pub use state::ProviderCallStatus;
pub use state::RatingChoice;
pub use state::RunStatus;
pub use state::TaskStatus;
pub use state::StateError;
