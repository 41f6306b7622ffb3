// crates/visage-core/src/state.rs
// ============================================================================
// Module: Visage Status Machines
// Description: Status enums for every entity with a lifecycle, plus the
//              legal-transition check for Run status.
// Purpose: Make "illegal transition" a compile-time-checkable enum match
//          instead of an ad-hoc string comparison scattered across callers.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! `Run` is the only entity whose transitions are validated here as a
//! reusable function: `queued -> running -> {succeeded, failed}`, with
//! `succeeded`/`failed` terminal. Every other status enum in this module is
//! a plain set of variants; their transition rules are simple enough
//! (`created -> completed`, `open -> done`, append-only) that the store
//! enforces them directly rather than through a shared state machine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Experiment Status
// ============================================================================

/// Experiment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Experiment created but not yet running any variants.
    Draft,
    /// Experiment has at least one run in flight.
    Running,
    /// All of the experiment's runs have reached a terminal status.
    Complete,
}

// ============================================================================
// SECTION: Run Status
// ============================================================================

/// Run lifecycle status.
///
/// # Invariants
/// - Transitions follow `queued -> running -> {succeeded, failed}` exactly;
///   see [`RunStatus::validate_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Enqueued, awaiting a worker to claim it.
    Queued,
    /// Claimed by a worker and being processed.
    Running,
    /// Processing completed successfully. Terminal.
    Succeeded,
    /// Processing failed. Terminal.
    Failed,
}

impl RunStatus {
    /// Returns `true` if this status cannot transition to any other status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Validates a proposed transition from `self` to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IllegalTransition`] for any transition other
    /// than `queued -> running`, `running -> succeeded`, or
    /// `running -> failed`.
    pub fn validate_transition(self, next: Self) -> Result<(), StateError> {
        let legal = matches!(
            (self, next),
            (Self::Queued, Self::Running) | (Self::Running, Self::Succeeded) | (Self::Running, Self::Failed)
        );
        if legal {
            Ok(())
        } else {
            Err(StateError::IllegalTransition { from: self, to: next })
        }
    }
}

// ============================================================================
// SECTION: Provider Call Status
// ============================================================================

/// Provider call lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCallStatus {
    /// Row inserted, generation not yet attempted or retried.
    Created,
    /// Generation succeeded and the raw artifact is recorded.
    Completed,
    /// Generation failed; the idempotency key remains reserved.
    Failed,
}

// ============================================================================
// SECTION: Metric Result Status
// ============================================================================

/// Metric computation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricResultStatus {
    /// The bundle was computed and persisted.
    Computed,
    /// Computation failed; no bundle is available.
    Failed,
}

// ============================================================================
// SECTION: Task Status
// ============================================================================

/// Pairwise task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Awaiting a rater.
    Open,
    /// Claimed by a rater but not yet submitted (reserved for future use;
    /// this crate's task distribution does not currently assign tasks).
    Assigned,
    /// A rating was submitted for this task.
    Done,
    /// Administratively retired; excluded from aggregation.
    Void,
}

// ============================================================================
// SECTION: Rating Choice
// ============================================================================

/// A rater's choice on one comparison dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingChoice {
    /// The rater preferred the presented-left run.
    Left,
    /// The rater preferred the presented-right run.
    Right,
    /// The rater judged the two runs equivalent.
    Tie,
    /// The rater declined to answer this dimension.
    Skip,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by status-machine validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// An attempted transition does not appear in the legal transition set.
    #[error("illegal run status transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// The status the entity was in before the attempted transition.
        from: RunStatus,
        /// The status the caller attempted to transition to.
        to: RunStatus,
    },
}

// ============================================================================
// SECTION: Tests
// ============================================================================
