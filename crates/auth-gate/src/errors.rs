//! Auth Gate error types.
//!
//! `AuthError` is the internal taxonomy every verifier works in. Callers
//! outside the core only ever see [`Unauthorized`], whose message is the
//! same for every cause; the cause itself is kept for logs and metrics.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Generic rejection message. Never varies with the failing check.
pub const GENERIC_REJECTION: &str = "The access token is invalid or expired";

/// Internal authentication failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Signature, structure, algorithm, expiry, audience or issuer check failed.
    #[error("Invalid token")]
    InvalidToken,

    /// No key with the token's `kid` in the key set, even after a refresh.
    #[error("Signing key not found")]
    KeyNotFound,

    /// The remote key set could not be fetched or parsed.
    #[error("Key set unavailable: {0}")]
    KeySetUnavailable(String),

    /// A verified local token whose `sub` is not an integer user ID.
    #[error("Malformed subject claim")]
    MalformedSubject,

    /// A verified local token for a user the user store does not know.
    #[error("User not found")]
    UserNotFound,

    /// The user store could not answer a lookup.
    #[error("User store unavailable: {0}")]
    UserStoreUnavailable(String),

    /// Local token signing failed. Only produced on issuance.
    #[error("Token signing failed: {0}")]
    Signing(String),
}

impl AuthError {
    /// Stable diagnostic code for logs and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidToken => "invalid_token",
            AuthError::KeyNotFound => "key_not_found",
            AuthError::KeySetUnavailable(_) => "key_set_unavailable",
            AuthError::MalformedSubject => "malformed_subject",
            AuthError::UserNotFound => "user_not_found",
            AuthError::UserStoreUnavailable(_) => "user_store_unavailable",
            AuthError::Signing(_) => "signing_failed",
        }
    }

    /// The reason reported past the remote verifier boundary.
    ///
    /// Key set failures collapse into `InvalidToken`; every other variant is
    /// kept as is.
    pub fn masked(&self) -> AuthError {
        match self {
            AuthError::KeyNotFound | AuthError::KeySetUnavailable(_) => AuthError::InvalidToken,
            other => other.clone(),
        }
    }
}

/// The single external authentication outcome.
///
/// `Display` never reveals which check failed; operators read the cause
/// through [`Unauthorized::reason`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unauthorized {
    reason: AuthError,
    code: &'static str,
}

impl Unauthorized {
    pub fn new(reason: AuthError) -> Self {
        Self {
            code: reason.code(),
            reason,
        }
    }

    /// Rejection whose reason is `cause` masked, keeping the code of
    /// `cause` itself for logs and metrics.
    pub fn with_cause(cause: AuthError) -> Self {
        Self {
            code: cause.code(),
            reason: cause.masked(),
        }
    }

    /// Internal reason of the rejection.
    pub fn reason(&self) -> &AuthError {
        &self.reason
    }

    /// Diagnostic code of the underlying cause.
    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for Unauthorized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(GENERIC_REJECTION)
    }
}

impl std::error::Error for Unauthorized {}

impl From<AuthError> for Unauthorized {
    fn from(reason: AuthError) -> Self {
        Self::new(reason)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        tracing::debug!(
            target: "auth_gate.errors",
            reason = self.code(),
            "Responding 401 Unauthorized"
        );

        let body = ErrorResponse {
            error: ErrorDetail {
                code: "INVALID_TOKEN",
                message: GENERIC_REJECTION,
            },
        };

        let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();

        if let Ok(header_value) = "Bearer realm=\"auth-gate\", error=\"invalid_token\"".parse() {
            response
                .headers_mut()
                .insert("WWW-Authenticate", header_value);
        }

        response
    }
}
