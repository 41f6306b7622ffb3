// crates/visage-store-sqlite/src/lib.rs
// ============================================================================
// Module: Visage Store (SQLite)
// Description: The typed, transactional repository over the entity model,
//              backed by a single SQLite database.
// Purpose: Own unique-constraint enforcement and atomic status transitions
//          so application code never has to hand-roll either.
// Dependencies: visage-core, rusqlite, rand, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! [`Store`] is the only thing in this workspace that is allowed to touch
//! the database. Every mutating method commits or rolls back atomically;
//! every uniqueness invariant from the entity model is a real SQL `UNIQUE`
//! constraint (`schema.rs`), not an application-level check, and violations
//! come back through [`error::StoreError::Conflict`] rather than an opaque
//! driver error. A single mutex-guarded connection serializes writers the
//! way a single relational store assumes (spec §1); readers share the same
//! connection since SQLite serializes access at the file level regardless.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod schema;
mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::StoreError;
pub use store::ProviderCallOutcome;
pub use store::RunOutcome;
pub use store::Store;
