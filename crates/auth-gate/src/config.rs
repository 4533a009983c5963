//! Auth Gate configuration.
//!
//! Configuration is loaded from environment variables once at startup and
//! shared by reference with every verifier. The local signing secret is
//! redacted in Debug output.

use common::secret::SecretString;
use jsonwebtoken::Algorithm;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default timeout for a single key set fetch, in seconds.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Upper bound for the key set fetch timeout, in seconds.
pub const MAX_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 60;

/// Default lifetime of locally issued session tokens (2 hours).
pub const DEFAULT_LOCAL_TOKEN_LIFETIME_SECONDS: i64 = 7200;

/// Upper bound for the local token lifetime (30 days), in seconds.
pub const MAX_LOCAL_TOKEN_LIFETIME_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Asymmetric algorithms that may appear in the remote allow-list.
const REMOTE_ALGORITHM_FAMILY: [Algorithm; 6] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// Symmetric algorithms accepted for local session tokens.
const LOCAL_ALGORITHM_FAMILY: [Algorithm; 3] =
    [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Auth Gate configuration.
#[derive(Clone)]
pub struct Config {
    /// Domain of the remote token issuer (e.g., "tenant.example-idp.com").
    pub remote_issuer_domain: String,

    /// Expected `iss` claim on machine tokens, `https://{domain}/`.
    pub remote_issuer: String,

    /// Expected `aud` claim on machine tokens.
    pub remote_audience: String,

    /// URL of the remote key set document.
    pub remote_jwks_url: String,

    /// Algorithms accepted on machine tokens. Never empty, RSA family only.
    pub remote_algorithms: Vec<Algorithm>,

    /// Substring of `sub` that marks a token as a machine client token.
    pub m2m_client_id: String,

    /// HMAC secret for local session tokens.
    pub local_signing_secret: SecretString,

    /// HMAC algorithm for local session tokens.
    pub local_signing_algorithm: Algorithm,

    /// Lifetime of locally issued tokens, in seconds.
    pub local_token_lifetime_seconds: i64,

    /// Bound on a single key set fetch.
    pub jwks_fetch_timeout: Duration,
}

/// Custom Debug implementation that redacts the signing secret.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("remote_issuer_domain", &self.remote_issuer_domain)
            .field("remote_issuer", &self.remote_issuer)
            .field("remote_audience", &self.remote_audience)
            .field("remote_jwks_url", &self.remote_jwks_url)
            .field("remote_algorithms", &self.remote_algorithms)
            .field("m2m_client_id", &self.m2m_client_id)
            .field("local_signing_secret", &"[REDACTED]")
            .field("local_signing_algorithm", &self.local_signing_algorithm)
            .field(
                "local_token_lifetime_seconds",
                &self.local_token_lifetime_seconds,
            )
            .field("jwks_fetch_timeout", &self.jwks_fetch_timeout)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid algorithm configuration: {0}")]
    InvalidAlgorithm(String),

    #[error("Invalid signing secret: {0}")]
    InvalidSecret(String),

    #[error("Invalid key set fetch timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid local token lifetime: {0}")]
    InvalidTokenLifetime(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let remote_issuer_domain = required(vars, "REMOTE_ISSUER_DOMAIN")?;
        let remote_audience = required(vars, "REMOTE_AUDIENCE")?;
        let m2m_client_id = required(vars, "M2M_CLIENT_ID")?;
        let remote_algorithms_raw = required(vars, "REMOTE_ALGORITHMS")?;
        let local_signing_secret = required(vars, "LOCAL_SIGNING_SECRET")?;
        let local_algorithm_raw = required(vars, "LOCAL_SIGNING_ALGORITHM")?;

        let domain = remote_issuer_domain.trim_end_matches('/');
        let remote_issuer = format!("https://{}/", domain);
        let remote_jwks_url = vars
            .get("REMOTE_JWKS_URL")
            .cloned()
            .unwrap_or_else(|| format!("https://{}/.well-known/jwks.json", domain));

        let remote_algorithms = parse_remote_algorithms(&remote_algorithms_raw)?;
        let local_signing_algorithm = parse_local_algorithm(&local_algorithm_raw)?;

        if local_signing_secret.trim().is_empty() {
            return Err(ConfigError::InvalidSecret(
                "LOCAL_SIGNING_SECRET must not be blank".to_string(),
            ));
        }

        // Parse key set fetch timeout with validation
        let jwks_fetch_timeout_seconds =
            if let Some(value_str) = vars.get("JWKS_FETCH_TIMEOUT_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidTimeout(format!(
                        "JWKS_FETCH_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 {
                    return Err(ConfigError::InvalidTimeout(
                        "JWKS_FETCH_TIMEOUT_SECONDS must be greater than 0".to_string(),
                    ));
                }

                if value > MAX_JWKS_FETCH_TIMEOUT_SECONDS {
                    return Err(ConfigError::InvalidTimeout(format!(
                        "JWKS_FETCH_TIMEOUT_SECONDS must not exceed {} seconds, got {}",
                        MAX_JWKS_FETCH_TIMEOUT_SECONDS, value
                    )));
                }

                value
            } else {
                DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS
            };

        // Parse local token lifetime with validation
        let local_token_lifetime_seconds =
            if let Some(value_str) = vars.get("LOCAL_TOKEN_LIFETIME_SECONDS") {
                let value: i64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidTokenLifetime(format!(
                        "LOCAL_TOKEN_LIFETIME_SECONDS must be a valid integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value <= 0 {
                    return Err(ConfigError::InvalidTokenLifetime(format!(
                        "LOCAL_TOKEN_LIFETIME_SECONDS must be positive, got {}",
                        value
                    )));
                }

                if value > MAX_LOCAL_TOKEN_LIFETIME_SECONDS {
                    return Err(ConfigError::InvalidTokenLifetime(format!(
                        "LOCAL_TOKEN_LIFETIME_SECONDS must not exceed {} seconds, got {}",
                        MAX_LOCAL_TOKEN_LIFETIME_SECONDS, value
                    )));
                }

                value
            } else {
                DEFAULT_LOCAL_TOKEN_LIFETIME_SECONDS
            };

        Ok(Config {
            remote_issuer_domain,
            remote_issuer,
            remote_audience,
            remote_jwks_url,
            remote_algorithms,
            m2m_client_id,
            local_signing_secret: SecretString::from(local_signing_secret),
            local_signing_algorithm,
            local_token_lifetime_seconds,
            jwks_fetch_timeout: Duration::from_secs(jwks_fetch_timeout_seconds),
        })
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Parse the comma-separated remote allow-list.
///
/// `none` is not representable by `Algorithm` and fails to parse; HMAC
/// algorithms parse but are refused, since a shared secret has no place
/// in a key set of public keys.
fn parse_remote_algorithms(raw: &str) -> Result<Vec<Algorithm>, ConfigError> {
    let mut algorithms = Vec::new();

    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let algorithm = Algorithm::from_str(name).map_err(|_| {
            ConfigError::InvalidAlgorithm(format!(
                "REMOTE_ALGORITHMS contains unknown algorithm '{}'",
                name
            ))
        })?;

        if !REMOTE_ALGORITHM_FAMILY.contains(&algorithm) {
            return Err(ConfigError::InvalidAlgorithm(format!(
                "REMOTE_ALGORITHMS only accepts RSA algorithms (RS*/PS*), got '{}'",
                name
            )));
        }

        if !algorithms.contains(&algorithm) {
            algorithms.push(algorithm);
        }
    }

    if algorithms.is_empty() {
        return Err(ConfigError::InvalidAlgorithm(
            "REMOTE_ALGORITHMS must list at least one algorithm".to_string(),
        ));
    }

    Ok(algorithms)
}

fn parse_local_algorithm(raw: &str) -> Result<Algorithm, ConfigError> {
    let name = raw.trim();
    let algorithm = Algorithm::from_str(name).map_err(|_| {
        ConfigError::InvalidAlgorithm(format!(
            "LOCAL_SIGNING_ALGORITHM is not a known algorithm: '{}'",
            name
        ))
    })?;

    if !LOCAL_ALGORITHM_FAMILY.contains(&algorithm) {
        return Err(ConfigError::InvalidAlgorithm(format!(
            "LOCAL_SIGNING_ALGORITHM must be HS256, HS384 or HS512, got '{}'",
            name
        )));
    }

    Ok(algorithm)
}
