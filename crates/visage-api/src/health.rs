// crates/visage-api/src/health.rs
// ============================================================================
// Module: Health Router
// Description: The liveness endpoint.
// Purpose: Give a load balancer or operator a trivial reachability check.
// Dependencies: axum
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::Router;
use axum::routing::get;
use serde::Serialize;

use crate::AppState;

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the `/health` route.
#[must_use]
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}
