//! Metrics definitions for Auth Gate.
//!
//! All metrics follow Prometheus naming conventions:
//! - `authgate_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `class`: 2 values (local_user, machine_client)
//! - `status`: 2 values (success, error)
//! - `reason`: bounded by `AuthError::code()`
//!
//! No recorder is installed here; the embedding process chooses one.

use metrics::{counter, histogram};
use std::time::Duration;

// ============================================================================
// Key Set Metrics
// ============================================================================

/// Record a remote key set fetch.
///
/// Metric: `authgate_key_set_fetch_total`, `authgate_key_set_fetch_duration_seconds`
/// Labels: `status`
///
/// Status values: "success", "error"
pub fn record_key_set_fetch(status: &str, duration: Duration) {
    histogram!("authgate_key_set_fetch_duration_seconds").record(duration.as_secs_f64());

    counter!("authgate_key_set_fetch_total",
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record the outcome of one authentication decision.
///
/// Metric: `authgate_authentications_total`, `authgate_authentication_duration_seconds`,
/// `authgate_auth_failures_total`
/// Labels: `class`, `status`, `reason`
///
/// `reason` is the internal diagnostic code, present only on failure.
pub fn record_authentication(class: &str, reason: Option<&str>, duration: Duration) {
    let status = if reason.is_some() { "error" } else { "success" };

    histogram!("authgate_authentication_duration_seconds",
        "class" => class.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("authgate_authentications_total",
        "class" => class.to_string(),
        "status" => status
    )
    .increment(1);

    if let Some(reason) = reason {
        counter!("authgate_auth_failures_total",
            "class" => class.to_string(),
            "reason" => reason.to_string()
        )
        .increment(1);
    }
}
