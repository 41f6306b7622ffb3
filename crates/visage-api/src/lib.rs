// crates/visage-api/src/lib.rs
// ============================================================================
// Module: Visage API
// Description: The HTTP read/write surface over the experiment runner's
//              store: experiment/run/task reads, pairwise task generation,
//              rating submission, and canonical artifact serving.
// Purpose: Give a human (or a script) a stable way to inspect and drive
//          experiments without touching the store directly.
// Dependencies: axum, visage-core, visage-store-sqlite, visage-pairwise,
//               visage-metrics
// ============================================================================

//! ## Overview
//! [`router`] builds one `axum` router per resource (experiments, runs,
//! tasks, ratings, health, artifacts) and merges them under a shared
//! [`AppState`], following the module layout of the grounding codebase's MCP
//! server minus its TLS/mTLS transport — this surface is a local read/write
//! API, not a remote-attested transport.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod artifacts;
pub mod error;
pub mod experiments;
pub mod health;
pub mod metrics;
pub mod overview;
pub mod ratings;
pub mod runs;
pub mod tasks;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::ApiError;
pub use metrics::ApiEvent;
pub use metrics::ApiMetrics;
pub use metrics::NoopApiMetrics;
pub use overview::ExperimentOverview;
pub use overview::RunDetail;
pub use overview::TaskDetail;
pub use overview::get_experiment_overview;
pub use overview::get_run_detail;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::http::StatusCode;
use visage_store_sqlite::Store;

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// The experiment runner's store.
    pub store: Arc<Store>,
    /// Base directory artifact paths are resolved against.
    pub artifacts_root: Arc<PathBuf>,
    /// Observability sink for request/bug-signal events.
    pub metrics: Arc<dyn ApiMetrics>,
}

impl AppState {
    /// Builds state from a store, artifact root, and metrics sink.
    #[must_use]
    pub fn new(store: Store, artifacts_root: PathBuf, metrics: Arc<dyn ApiMetrics>) -> Self {
        Self { store: Arc::new(store), artifacts_root: Arc::new(artifacts_root), metrics }
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the full HTTP router over `state`.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(experiments::router())
        .merge(runs::router())
        .merge(tasks::router())
        .merge(ratings::router())
        .merge(artifacts::router())
        .with_state(state)
}

/// Records one request's outcome through `state`'s metrics sink. Called by
/// every handler after it has a final status, mirroring the centralized
/// `record_metrics` call in the grounding codebase's server loop.
pub(crate) fn record_request(state: &AppState, route: &'static str, started: Instant, status: StatusCode) {
    state.metrics.record_event(&ApiEvent::Request { route, status: status.as_u16(), elapsed: started.elapsed() });
}
