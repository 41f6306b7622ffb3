// crates/visage-store-sqlite/src/error.rs
// ============================================================================
// Module: Visage Store Errors
// Description: The error taxonomy surfaced by every Store operation.
// Purpose: Give callers a typed Conflict/Violation/NotFound outcome instead
//          of an opaque rusqlite error.
// Dependencies: rusqlite, thiserror
// ============================================================================

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors raised by [`crate::Store`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A uniqueness invariant was violated by the attempted write.
    #[error("conflict: {0}")]
    Conflict(String),
    /// A caller attempted an illegal state transition or other invariant
    /// breach that should never happen given a correct caller. Never caught
    /// by per-step orchestrator error handling; propagates as a bug signal.
    #[error("store invariant violated: {0}")]
    Violation(String),
    /// The on-disk schema version is newer than this binary understands.
    #[error("schema version mismatch: {0}")]
    VersionMismatch(String),
    /// The underlying database could not be opened or queried.
    #[error("database error: {0}")]
    Db(String),
    /// Filesystem I/O surrounding the database failed.
    #[error("io error: {0}")]
    Io(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(sqlite_err, ref message) = err {
            if sqlite_err.code == ErrorCode::ConstraintViolation {
                return Self::Conflict(message.clone().unwrap_or_else(|| err.to_string()));
            }
        }
        Self::Db(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
