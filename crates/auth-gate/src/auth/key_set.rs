//! Key set cache for remotely issued tokens.
//!
//! Fetches the issuer's `/.well-known/jwks.json` document, keeps the parsed
//! RSA public keys in memory, and resolves a `kid` to a ready-to-use
//! decoding key.
//!
//! # Refresh policy
//!
//! - The cache starts empty and is only refreshed on a miss
//! - A refresh replaces the whole key set; keys are never patched one by one
//! - Concurrent misses coalesce into a single in-flight fetch
//! - A failed fetch is not retried within the same `resolve` call
//! - Every fetch is bounded by the configured timeout

use crate::config::Config;
use crate::errors::AuthError;
use crate::observability::metrics;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Smallest RSA modulus accepted from the key set.
pub const MIN_RSA_MODULUS_BITS: usize = 2048;

/// JSON Web Key as published by the remote issuer.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type. Only "RSA" entries are used.
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    pub kid: String,

    /// RSA modulus (base64url, unpadded).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url, unpadded).
    #[serde(default)]
    pub e: Option<String>,

    /// Algorithm the key is meant for, when published.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// Key set document returned by the remote endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Algorithm family of a signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
}

impl KeyFamily {
    /// Whether a token signed with `algorithm` can be checked by a key of this family.
    pub fn accepts(self, algorithm: Algorithm) -> bool {
        match self {
            KeyFamily::Rsa => matches!(
                algorithm,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
        }
    }
}

/// A public key from the key set, ready for signature verification.
///
/// Never mutated after construction.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    family: KeyFamily,
    algorithm: Option<Algorithm>,
    decoding_key: DecodingKey,
}

impl SigningKey {
    /// Build a signing key from a key set entry.
    ///
    /// Returns a short reason when the entry is unusable.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, &'static str> {
        if jwk.kty != "RSA" {
            return Err("unsupported key type");
        }

        if let Some(key_use) = &jwk.key_use {
            if key_use != "sig" {
                return Err("key is not a signing key");
            }
        }

        let algorithm = match &jwk.alg {
            Some(alg) => {
                let parsed = Algorithm::from_str(alg).map_err(|_| "unknown algorithm")?;
                if !KeyFamily::Rsa.accepts(parsed) {
                    return Err("algorithm does not match key type");
                }
                Some(parsed)
            }
            None => None,
        };

        let n = jwk.n.as_deref().ok_or("missing modulus")?;
        let e = jwk.e.as_deref().ok_or("missing exponent")?;

        // Some issuers pad their base64url; the components are unpadded otherwise
        let n = n.trim_end_matches('=');
        let e = e.trim_end_matches('=');

        let modulus = URL_SAFE_NO_PAD
            .decode(n)
            .map_err(|_| "modulus is not base64url")?;
        if modulus_bits(&modulus) < MIN_RSA_MODULUS_BITS {
            return Err("modulus too short");
        }

        let decoding_key =
            DecodingKey::from_rsa_components(n, e).map_err(|_| "invalid RSA components")?;

        Ok(Self {
            kid: jwk.kid.clone(),
            family: KeyFamily::Rsa,
            algorithm,
            decoding_key,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// Algorithm pinned by the key set entry, if any.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Bit length of a big-endian unsigned integer.
fn modulus_bits(bytes: &[u8]) -> usize {
    match bytes.iter().position(|b| *b != 0) {
        Some(first) => {
            let significant = bytes.len() - first;
            let leading = bytes.get(first).map_or(0, |b| b.leading_zeros() as usize);
            significant * 8 - leading
        }
        None => 0,
    }
}

/// Immutable snapshot of the remote key set.
#[derive(Debug)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: Option<Instant>,
    generation: u64,
}

impl KeySet {
    /// The key set the cache starts with.
    pub fn empty() -> Self {
        Self {
            keys: HashMap::new(),
            fetched_at: None,
            generation: 0,
        }
    }

    /// Build a key set from a fetched document, skipping unusable entries.
    pub fn from_document(document: JwksDocument, generation: u64) -> Self {
        let mut keys = HashMap::with_capacity(document.keys.len());

        for jwk in &document.keys {
            match SigningKey::from_jwk(jwk) {
                Ok(key) => {
                    keys.insert(key.kid.clone(), Arc::new(key));
                }
                Err(reason) => {
                    tracing::debug!(
                        target: "auth_gate.key_set",
                        kid = %jwk.kid,
                        kty = %jwk.kty,
                        reason,
                        "Skipping key set entry"
                    );
                }
            }
        }

        Self {
            keys,
            fetched_at: Some(Instant::now()),
            generation,
        }
    }

    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// When this set was fetched; `None` for the initial empty set.
    pub fn fetched_at(&self) -> Option<Instant> {
        self.fetched_at
    }

    /// Number of successful refreshes that produced this set.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Source of key set documents.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    /// Fetch and parse the current key set document.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::KeySetUnavailable` on any transport, status, or
    /// parse failure.
    async fn fetch(&self) -> Result<JwksDocument, AuthError>;
}

/// Fetches the key set over HTTP(S).
pub struct HttpKeySetFetcher {
    /// URL to the key set endpoint.
    jwks_url: String,

    /// HTTP client for fetching the key set.
    http_client: reqwest::Client,

    /// Bound on a single fetch.
    timeout: Duration,
}

impl HttpKeySetFetcher {
    /// Create a fetcher for `jwks_url` whose requests give up after `timeout`.
    pub fn new(jwks_url: String, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "auth_gate.key_set", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
            timeout,
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    #[instrument(skip(self), fields(url = %self.jwks_url))]
    async fn fetch(&self) -> Result<JwksDocument, AuthError> {
        // Per-request timeout as well, in case the client fell back to defaults
        let response = self
            .http_client
            .get(&self.jwks_url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() { "timeout" } else { "transport" };
                AuthError::KeySetUnavailable(format!("{}: {}", kind, e))
            })?;

        if !response.status().is_success() {
            return Err(AuthError::KeySetUnavailable(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<JwksDocument>()
            .await
            .map_err(|e| AuthError::KeySetUnavailable(format!("invalid document: {}", e)))
    }
}

/// Outcome of the most recent refresh attempt, guarded by the refresh lock.
#[derive(Debug, Default)]
struct RefreshState {
    /// Set when the last attempt failed; cleared by a successful one.
    last_failure: Option<AuthError>,
}

/// In-memory, refresh-on-miss cache of the remote key set.
///
/// Many concurrent readers; at most one fetch in flight. Callers that queue
/// behind an in-flight fetch share its outcome, success or failure.
pub struct KeySetCache {
    /// Where fresh key sets come from.
    fetcher: Arc<dyn KeySetFetcher>,

    /// Current snapshot. Swapped wholesale on refresh.
    current: RwLock<Arc<KeySet>>,

    /// Held for the duration of a fetch so concurrent misses coalesce.
    refresh_lock: Mutex<RefreshState>,

    /// Completed refresh attempts. Only incremented under `refresh_lock`.
    attempts: AtomicU64,
}

impl KeySetCache {
    /// Create an empty cache backed by `fetcher`.
    pub fn new(fetcher: Arc<dyn KeySetFetcher>) -> Self {
        Self {
            fetcher,
            current: RwLock::new(Arc::new(KeySet::empty())),
            refresh_lock: Mutex::new(RefreshState::default()),
            attempts: AtomicU64::new(0),
        }
    }

    /// Create an empty cache that fetches from the configured endpoint.
    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(HttpKeySetFetcher::new(
            config.remote_jwks_url.clone(),
            config.jwks_fetch_timeout,
        )))
    }

    /// Current key set snapshot.
    pub async fn snapshot(&self) -> Arc<KeySet> {
        Arc::clone(&*self.current.read().await)
    }

    /// Resolve a key ID to a signing key.
    ///
    /// On a miss the key set is refreshed once (or the caller joins a
    /// refresh already in flight) and the lookup is repeated.
    ///
    /// # Errors
    ///
    /// - `AuthError::KeySetUnavailable` - the refresh fetch failed, or the
    ///   in-flight fetch this caller joined failed
    /// - `AuthError::KeyNotFound` - `kid` is absent from the refreshed set
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, AuthError> {
        // Read before the snapshot so a refresh finishing in between is seen
        let observed_attempt = self.attempts.load(Ordering::SeqCst);

        let observed = self.snapshot().await;
        if let Some(key) = observed.get(kid) {
            tracing::debug!(target: "auth_gate.key_set", kid = %kid, "Key set cache hit");
            return Ok(key);
        }

        let refreshed = self.refresh_after(observed_attempt).await?;

        refreshed.get(kid).ok_or_else(|| {
            tracing::warn!(
                target: "auth_gate.key_set",
                kid = %kid,
                key_count = refreshed.len(),
                "Key not found in key set after refresh"
            );
            AuthError::KeyNotFound
        })
    }

    /// Refresh unless an attempt completed after `observed_attempt` while
    /// this caller waited for the refresh lock, in which case that attempt's
    /// outcome is returned instead.
    async fn refresh_after(&self, observed_attempt: u64) -> Result<Arc<KeySet>, AuthError> {
        let mut state = self.refresh_lock.lock().await;

        if self.attempts.load(Ordering::SeqCst) != observed_attempt {
            if let Some(failure) = &state.last_failure {
                tracing::debug!(
                    target: "auth_gate.key_set",
                    "Joined concurrent key set refresh that failed"
                );
                return Err(failure.clone());
            }

            let current = self.snapshot().await;
            tracing::debug!(
                target: "auth_gate.key_set",
                generation = current.generation(),
                "Joined concurrent key set refresh"
            );
            return Ok(current);
        }

        tracing::debug!(target: "auth_gate.key_set", "Fetching key set");
        let start = Instant::now();

        let outcome = match self.fetcher.fetch().await {
            Ok(document) => {
                metrics::record_key_set_fetch("success", start.elapsed());

                let generation = self.snapshot().await.generation() + 1;
                let fresh = Arc::new(KeySet::from_document(document, generation));

                tracing::info!(
                    target: "auth_gate.key_set",
                    key_count = fresh.len(),
                    generation = fresh.generation(),
                    "Key set cache refreshed"
                );

                *self.current.write().await = Arc::clone(&fresh);
                state.last_failure = None;
                Ok(fresh)
            }
            Err(e) => {
                metrics::record_key_set_fetch("error", start.elapsed());
                tracing::error!(
                    target: "auth_gate.key_set",
                    error = %e,
                    "Key set fetch failed"
                );
                state.last_failure = Some(e.clone());
                Err(e)
            }
        };

        self.attempts.fetch_add(1, Ordering::SeqCst);
        outcome
    }
}
