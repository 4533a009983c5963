//! Builder patterns for test token claims
//!
//! Provides fluent APIs for creating remote (machine) and local (session)
//! claim sets.

use chrono::{Duration, Utc};
use serde_json::json;

/// Builder for machine token claims.
///
/// # Example
/// ```rust,ignore
/// let claims = TestRemoteClaimsBuilder::new("https://tenant.idp.example/", "https://api.example/")
///     .for_client("abc123@clients")
///     .expires_in(3600)
///     .build();
/// ```
pub struct TestRemoteClaimsBuilder {
    sub: String,
    iss: String,
    aud: serde_json::Value,
    exp: i64,
    iat: i64,
    azp: Option<String>,
    omit: Vec<&'static str>,
}

impl TestRemoteClaimsBuilder {
    /// Create a builder for the given issuer and audience, valid for an hour.
    pub fn new(issuer: &str, audience: &str) -> Self {
        let now = Utc::now();
        Self {
            sub: "test-client@clients".to_string(),
            iss: issuer.to_string(),
            aud: json!(audience),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            azp: None,
            omit: Vec::new(),
        }
    }

    /// Set the subject (machine client identifier).
    pub fn for_client(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the issuer.
    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.iss = issuer.to_string();
        self
    }

    /// Set a single audience.
    pub fn for_audience(mut self, audience: &str) -> Self {
        self.aud = json!(audience);
        self
    }

    /// Set an audience array.
    pub fn for_audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = json!(audiences);
        self
    }

    /// Set the authorized party.
    pub fn with_azp(mut self, azp: &str) -> Self {
        self.azp = Some(azp.to_string());
        self
    }

    /// Set expiration in seconds from now. Negative values produce an
    /// already expired token.
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Drop a claim from the built payload.
    pub fn without(mut self, claim: &'static str) -> Self {
        self.omit.push(claim);
        self
    }

    /// Build the claims as a JSON value.
    pub fn build(self) -> serde_json::Value {
        let mut claims = json!({
            "sub": self.sub,
            "iss": self.iss,
            "aud": self.aud,
            "exp": self.exp,
            "iat": self.iat,
        });
        if let Some(azp) = self.azp {
            claims["azp"] = json!(azp);
        }
        if let Some(map) = claims.as_object_mut() {
            for claim in self.omit {
                map.remove(claim);
            }
        }
        claims
    }
}

/// Builder for local session token claims.
///
/// Used to craft tokens the local service would never issue itself
/// (non-numeric subjects, past expiry).
pub struct TestLocalClaimsBuilder {
    sub: String,
    exp: i64,
    iat: i64,
}

impl TestLocalClaimsBuilder {
    /// Create a builder for user `user_id`, valid for two hours.
    pub fn new(user_id: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            exp: (now + Duration::hours(2)).timestamp(),
            iat: now.timestamp(),
        }
    }

    /// Replace the subject with an arbitrary string.
    pub fn with_subject(mut self, sub: &str) -> Self {
        self.sub = sub.to_string();
        self
    }

    /// Set expiration in seconds from now.
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Build the claims as a JSON value.
    pub fn build(self) -> serde_json::Value {
        json!({
            "sub": self.sub,
            "exp": self.exp,
            "iat": self.iat,
        })
    }
}
