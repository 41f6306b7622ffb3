// crates/visage-api/src/metrics.rs
// ============================================================================
// Module: API Observability
// Description: A narrow event-sink trait the HTTP surface emits structured
//              request and bug-signal events through.
// Purpose: Let a future Prometheus/OpenTelemetry exporter hook in without
//          redesigning handlers; mirrors `visage_orchestrator::OrchestratorMetrics`.
// Dependencies: none
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// SECTION: Events
// ============================================================================

/// One observable event emitted by the HTTP surface.
#[derive(Debug, Clone, Copy)]
pub enum ApiEvent<'a> {
    /// A request completed, successfully or not.
    Request {
        /// The route's path template, e.g. `"/experiments/{id}"`.
        route: &'static str,
        /// HTTP status code returned.
        status: u16,
        /// Wall-clock time spent handling the request.
        elapsed: Duration,
    },
    /// A [`visage_store_sqlite::StoreError::Violation`] surfaced at the API
    /// boundary: an internal bug signal, never an expected user-facing
    /// condition.
    StoreViolation {
        /// The store's violation detail message.
        detail: &'a str,
    },
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Observability sink for the HTTP surface.
pub trait ApiMetrics: Send + Sync {
    /// Records one [`ApiEvent`].
    fn record_event(&self, event: &ApiEvent<'_>);
}

/// An [`ApiMetrics`] that discards every event. Used unless the CLI wires in
/// something else.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopApiMetrics;

impl ApiMetrics for NoopApiMetrics {
    fn record_event(&self, _event: &ApiEvent<'_>) {}
}
