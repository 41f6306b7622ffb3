// crates/visage-core/src/identity.rs
// ============================================================================
// Module: Visage Identity
// Description: Content-addressed identity functions for specs, runs,
//              provider calls, files, and variant seeds.
// Purpose: Give every entity a deterministic, reproducible identity so the
//          same logical request always resolves to the same row.
// Dependencies: serde, serde_json, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Every function here is pure: given the same inputs it returns the same
//! hex-encoded SHA-256 digest on any process, any OS, any run order.
//! `spec_hash` canonicalizes its inputs with RFC 8785 (JCS) before hashing so
//! that field order and incidental whitespace never affect the digest.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Delimiter used to join identity inputs; cannot appear in any component
/// because every component is itself a hex digest, UUID, or identifier.
const JOIN_DELIMITER: &str = "|";

/// Streaming read chunk size for `sha256_file`.
const FILE_CHUNK_BYTES: usize = 64 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while computing identity digests.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Canonicalizing the spec payload to JCS bytes failed.
    #[error("failed to canonicalize spec payload: {0}")]
    Canonicalization(String),
    /// Reading the target file for `sha256_file` failed.
    #[error("failed to read file {path}: {source}")]
    FileRead {
        /// Path that could not be read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// SECTION: Spec Hash
// ============================================================================

/// The canonical payload hashed by [`spec_hash`].
///
/// # Invariants
/// - Field order here is irrelevant: `serde_jcs` sorts object keys and
///   strips insignificant whitespace before hashing.
/// - `null` fields are preserved rather than omitted, so switching an
///   optional field from absent to present changes the digest.
#[derive(Debug, Serialize)]
struct SpecHashPayload<'a> {
    provider: &'a str,
    model: &'a str,
    model_version: Option<&'a str>,
    rendered_prompt: &'a str,
    params_json: &'a str,
    seed: i64,
    input_audio_sha256: &'a str,
    ref_image_sha256: Option<&'a str>,
}

/// Computes the content address of a fully-instantiated generation request.
///
/// Two callers that agree on every field produce the same digest; changing
/// any field, including switching a `None` to a `Some`, changes the digest.
///
/// # Errors
///
/// Returns [`IdentityError::Canonicalization`] if the payload cannot be
/// serialized to canonical JSON (this can only happen if `params_json` or
/// `rendered_prompt` contain invalid UTF-8 sequences, which the type system
/// already prevents for `&str` — this error exists for forward compatibility
/// with payload shapes that might fail to serialize).
#[allow(
    clippy::too_many_arguments,
    reason = "mirrors the fixed field list of spec_hash's contract; grouping would obscure which field changed"
)]
pub fn spec_hash(
    provider: &str,
    model: &str,
    model_version: Option<&str>,
    rendered_prompt: &str,
    params_json: &str,
    seed: i64,
    input_audio_sha256: &str,
    ref_image_sha256: Option<&str>,
) -> Result<String, IdentityError> {
    let payload = SpecHashPayload {
        provider,
        model,
        model_version,
        rendered_prompt,
        params_json,
        seed,
        input_audio_sha256,
        ref_image_sha256,
    };
    let bytes =
        serde_jcs::to_vec(&payload).map_err(|err| IdentityError::Canonicalization(err.to_string()))?;
    Ok(hex_sha256(&bytes))
}

// ============================================================================
// SECTION: Run Identity
// ============================================================================

/// Computes the content address of a (experiment, item, variant) slot.
#[must_use]
pub fn run_id(experiment_id: &str, item_id: &str, variant_key: &str, spec_hash: &str) -> String {
    let joined = [experiment_id, item_id, variant_key, spec_hash].join(JOIN_DELIMITER);
    hex_sha256(joined.as_bytes())
}

// ============================================================================
// SECTION: Provider Idempotency
// ============================================================================

/// Computes the idempotency key gating provider spend for a given spec.
#[must_use]
pub fn provider_idempotency_key(provider: &str, spec_hash: &str) -> String {
    let joined = [provider, spec_hash].join(JOIN_DELIMITER);
    hex_sha256(joined.as_bytes())
}

// ============================================================================
// SECTION: File Digest
// ============================================================================

/// Streams a file's bytes through SHA-256 and returns the hex digest.
///
/// # Errors
///
/// Returns [`IdentityError::FileRead`] if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> Result<String, IdentityError> {
    let mut file = File::open(path).map_err(|source| IdentityError::FileRead {
        path: path.display().to_string(),
        source,
    })?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0_u8; FILE_CHUNK_BYTES];
    loop {
        let read = file.read(&mut buf).map_err(|source| IdentityError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex_encode(&hasher.finalize()))
}

// ============================================================================
// SECTION: Variant Seed Derivation
// ============================================================================

/// Derives a deterministic integer seed from a variant key.
///
/// If `variant_key` matches `seed=<signed decimal>` the parsed integer is
/// returned directly. Otherwise the first four bytes of SHA-256(variant_key)
/// are interpreted as a big-endian unsigned 32-bit integer and widened to
/// `i64`. Both branches are deterministic across processes and operating
/// systems.
#[must_use]
pub fn seed_from_variant_key(variant_key: &str) -> i64 {
    if let Some(rest) = variant_key.strip_prefix("seed=") {
        if let Ok(parsed) = rest.parse::<i64>() {
            return parsed;
        }
    }
    let digest = Sha256::digest(variant_key.as_bytes());
    let bytes: [u8; 4] = [digest[0], digest[1], digest[2], digest[3]];
    i64::from(u32::from_be_bytes(bytes))
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

fn hex_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
