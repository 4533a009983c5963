//! Unverified JWT inspection shared across Auth Gate crates.
//!
//! Everything in this module reads a compact JWT WITHOUT checking its
//! signature. The results are only fit for routing decisions: picking a
//! key out of a key set, or picking which verifier runs. A token MUST
//! still be fully verified before any value read here is trusted.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Error messages are generic to prevent information leakage
//! - Detailed causes are logged at debug level only
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{extract_kid, peek_subject};
//!
//! // Pick the verifier
//! let sub = peek_subject(token).unwrap_or_default();
//!
//! // Pick the key
//! let kid = extract_kid(token)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Larger tokens are rejected before any base64 decoding or cryptographic
/// work. Typical session and client-credential tokens are well under 2KB,
/// even with RSA-2048 signatures.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting an unverified JWT.
///
/// All variants render the same message; the variant itself is only for
/// logs and tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token is missing required `kid` header.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token is missing the `alg` header.
    #[error("The access token is invalid or expired")]
    MissingAlg,

    /// Token payload has no string `sub` claim.
    #[error("The access token is invalid or expired")]
    MissingSubject,
}

// =============================================================================
// Functions
// =============================================================================

/// Extract the `kid` (key ID) from a JWT header without verifying the signature.
///
/// Empty `kid` values are rejected.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Wrong structure, bad base64, or invalid JSON
/// - `MissingKid` - Header has no string `kid`
pub fn extract_kid(token: &str) -> Result<String, JwtValidationError> {
    let header = decode_segment(token, 0)?;

    header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)
}

/// Extract the `alg` header value without verifying the signature.
///
/// The raw string is returned so callers can reject values such as `none`
/// that a typed algorithm enum cannot even represent.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Wrong structure, bad base64, or invalid JSON
/// - `MissingAlg` - Header has no string `alg`
pub fn extract_alg(token: &str) -> Result<String, JwtValidationError> {
    let header = decode_segment(token, 0)?;

    header
        .get("alg")
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingAlg)
}

/// Read the `sub` claim from a JWT payload without verifying the signature.
///
/// # Security
///
/// The returned subject is attacker-controlled until the token has been
/// verified. Use it only to choose which verifier runs.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Wrong structure, bad base64, or invalid JSON
/// - `MissingSubject` - Payload has no string `sub`
pub fn peek_subject(token: &str) -> Result<String, JwtValidationError> {
    let claims = decode_segment(token, 1)?;

    claims
        .get("sub")
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingSubject)
}

/// Decode one base64url JSON segment of a compact JWT.
fn decode_segment(token: &str, index: usize) -> Result<serde_json::Value, JwtValidationError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        tracing::debug!(
            target: "common.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    let segment = parts.get(index).ok_or(JwtValidationError::MalformedToken)?;
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, segment = index, "Failed to decode JWT segment base64");
        JwtValidationError::MalformedToken
    })?;

    let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, segment = index, "Failed to parse JWT segment JSON");
        JwtValidationError::MalformedToken
    })?;

    if !value.is_object() {
        return Err(JwtValidationError::MalformedToken);
    }

    Ok(value)
}

// =============================================================================
// Tests
// =============================================================================
