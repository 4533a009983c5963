//! JWT claims structures for the two token classes.
//!
//! The `sub` field is redacted in Debug output on both types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Claims of a locally issued session token.
#[derive(Clone, Serialize, Deserialize)]
pub struct LocalClaims {
    /// Subject: decimal user ID - redacted in Debug output.
    pub sub: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,
}

impl fmt::Debug for LocalClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalClaims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .finish()
    }
}

/// Claims of a remotely issued machine-to-machine token.
///
/// `aud` and `iss` are checked by the verifier's `Validation` against the
/// raw payload, so only the fields the gate reads afterwards are typed.
#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteClaims {
    /// Subject: machine client identifier - redacted in Debug output.
    pub sub: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issuer.
    pub iss: String,

    /// Authorized party (client ID of the caller), when the issuer sets it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    /// Space-separated scopes, when the issuer sets them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl fmt::Debug for RemoteClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteClaims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iss", &self.iss)
            .field("azp", &self.azp)
            .field("scope", &self.scope)
            .finish()
    }
}
