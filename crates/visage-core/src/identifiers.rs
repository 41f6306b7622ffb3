// crates/visage-core/src/identifiers.rs
// ============================================================================
// Module: Visage Identifiers
// Description: Canonical opaque identifiers for dataset items, specs,
//              experiments, runs, provider calls, metric results, tasks,
//              and ratings.
// Purpose: Provide strongly typed, serializable identifiers with stable
//          wire forms and no implicit coercion between entity kinds.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! All identifiers here are opaque hex or UUID strings and serialize
//! transparently as JSON strings. None of these types validate their
//! contents beyond being non-empty UTF-8 — the hashing functions in
//! [`crate::identity`] are responsible for producing well-formed hex values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Macro
// ============================================================================

macro_rules! opaque_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier, returning the inner `String`.
            #[must_use]
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

opaque_id!(ItemId, "Identifier of a dataset item (source video, audio, reference image).");
opaque_id!(GenerationSpecId, "Identifier of a generation specification.");
opaque_id!(ExperimentId, "Identifier of an experiment.");
opaque_id!(RunId, "Content-addressed identifier of a single variant execution.");
opaque_id!(ProviderCallId, "Identifier of a provider call row.");
opaque_id!(MetricResultId, "Identifier of a computed metric result row.");
opaque_id!(TaskId, "Identifier of a pairwise comparison task.");
opaque_id!(RatingId, "Identifier of a submitted rating.");
