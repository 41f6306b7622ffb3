// crates/visage-api/src/error.rs
// ============================================================================
// Module: API Errors
// Description: Error taxonomy for the HTTP read/write surface and its
//              status-code mapping.
// Purpose: Translate store failures into HTTP responses by kind, never by
//          stringly-typed matching on error messages.
// Dependencies: axum, visage-store-sqlite, thiserror
// ============================================================================

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Serialize;
use thiserror::Error;
use visage_store_sqlite::StoreError;

use crate::metrics::ApiEvent;
use crate::metrics::ApiMetrics;

// ============================================================================
// SECTION: Error Enum
// ============================================================================

/// Errors surfaced by the HTTP read/write API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The request failed validation, or collided with an existing row.
    #[error("invalid request: {0}")]
    Validation(String),
    /// A `StoreError::Violation` (or any other unexpected store failure)
    /// reached the API boundary. Treated as an internal bug, not a
    /// user-facing condition.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Converts a [`StoreError`] into an [`ApiError`], recording a
    /// [`ApiEvent::StoreViolation`] through `metrics` when the store
    /// reported a crash-loud violation.
    pub fn from_store(err: StoreError, metrics: &dyn ApiMetrics) -> Self {
        match err {
            StoreError::NotFound(detail) => Self::NotFound(detail),
            StoreError::Conflict(detail) => Self::Validation(detail),
            StoreError::Violation(detail) => {
                metrics.record_event(&ApiEvent::StoreViolation { detail: &detail });
                Self::Internal(detail)
            }
            StoreError::VersionMismatch(detail) | StoreError::Db(detail) | StoreError::Io(detail) => Self::Internal(detail),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::metrics::ApiEvent;

    #[derive(Default)]
    struct RecordingMetrics {
        violations: Mutex<Vec<String>>,
    }

    impl ApiMetrics for RecordingMetrics {
        fn record_event(&self, event: &ApiEvent<'_>) {
            if let ApiEvent::StoreViolation { detail } = event {
                self.violations.lock().unwrap().push((*detail).to_string());
            }
        }
    }

    #[test]
    fn not_found_maps_to_not_found_without_recording() {
        let metrics = RecordingMetrics::default();
        let err = ApiError::from_store(StoreError::NotFound("task x".to_string()), &metrics);
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(metrics.violations.lock().unwrap().is_empty());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn conflict_maps_to_validation() {
        let metrics = RecordingMetrics::default();
        let err = ApiError::from_store(StoreError::Conflict("duplicate".to_string()), &metrics);
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn violation_records_and_maps_to_internal() {
        let metrics = RecordingMetrics::default();
        let err = ApiError::from_store(StoreError::Violation("bug".to_string()), &metrics);
        assert!(matches!(err, ApiError::Internal(_)));
        assert_eq!(metrics.violations.lock().unwrap().as_slice(), ["bug".to_string()]);
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn db_and_io_errors_map_to_internal() {
        let metrics = RecordingMetrics::default();
        let db_err = ApiError::from_store(StoreError::Db("disk full".to_string()), &metrics);
        let io_err = ApiError::from_store(StoreError::Io("permission denied".to_string()), &metrics);
        assert!(matches!(db_err, ApiError::Internal(_)));
        assert!(matches!(io_err, ApiError::Internal(_)));
        assert!(metrics.violations.lock().unwrap().is_empty());
    }
}
