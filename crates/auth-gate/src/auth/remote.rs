//! Verification of remotely issued machine-to-machine tokens.
//!
//! Tokens are signed by the remote issuer with an RSA key published in its
//! key set. Acceptance requires all of:
//!
//! 1. Header `alg` in the configured allow-list
//! 2. A key with the header's `kid` in the key set (refreshed once on a miss)
//! 3. Signature valid under that key and algorithm
//! 4. `exp` in the future, `aud` and `iss` equal to the configured values
//!
//! Every failure is reported as `InvalidToken`. Key set problems are told
//! apart in the logs, and through `verify_with_cause` for the router's
//! failure metrics.

use crate::auth::claims::RemoteClaims;
use crate::auth::key_set::KeySetCache;
use crate::config::Config;
use crate::errors::AuthError;
use common::jwt::{extract_alg, extract_kid};
use jsonwebtoken::{decode, Algorithm, Validation};
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;

/// Verifies machine tokens against the remote key set.
pub struct RemoteTokenVerifier {
    /// Cache of the issuer's public keys.
    key_cache: Arc<KeySetCache>,

    /// Required `aud` claim.
    audience: String,

    /// Required `iss` claim.
    issuer: String,

    /// Accepted header algorithms.
    allowed_algorithms: Vec<Algorithm>,
}

impl RemoteTokenVerifier {
    pub fn new(
        key_cache: Arc<KeySetCache>,
        audience: String,
        issuer: String,
        allowed_algorithms: Vec<Algorithm>,
    ) -> Self {
        Self {
            key_cache,
            audience,
            issuer,
            allowed_algorithms,
        }
    }

    pub fn from_config(config: &Config, key_cache: Arc<KeySetCache>) -> Self {
        Self::new(
            key_cache,
            config.remote_audience.clone(),
            config.remote_issuer.clone(),
            config.remote_algorithms.clone(),
        )
    }

    /// Verify a machine token and return its client identifier (`sub`).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for every failure, including an
    /// unknown key or an unreachable key set endpoint.
    #[instrument(skip_all)]
    pub async fn verify(&self, token: &str) -> Result<String, AuthError> {
        self.verify_claims(token).await.map(|claims| claims.sub)
    }

    /// Verify a machine token and return all of its typed claims.
    ///
    /// # Errors
    ///
    /// Same as [`RemoteTokenVerifier::verify`].
    #[instrument(skip_all)]
    pub async fn verify_claims(&self, token: &str) -> Result<RemoteClaims, AuthError> {
        self.verify_unmasked(token).await.map_err(|e| e.masked())
    }

    /// Like [`RemoteTokenVerifier::verify`], but key set failures come back
    /// as `KeyNotFound` or `KeySetUnavailable` so the caller can count them.
    pub(crate) async fn verify_with_cause(&self, token: &str) -> Result<String, AuthError> {
        self.verify_unmasked(token).await.map(|claims| claims.sub)
    }

    async fn verify_unmasked(&self, token: &str) -> Result<RemoteClaims, AuthError> {
        // 1. Header inspection (includes size check via common::jwt)
        let kid = extract_kid(token).map_err(|e| {
            tracing::debug!(target: "auth_gate.remote", error = ?e, "Token kid extraction failed");
            AuthError::InvalidToken
        })?;

        let algorithm = self.header_algorithm(token)?;

        // 2. Key lookup, refreshing the key set once on a miss
        let key = self.key_cache.resolve(&kid).await.inspect_err(|e| {
            match e {
                AuthError::KeySetUnavailable(cause) => tracing::error!(
                    target: "auth_gate.remote",
                    kid = %kid,
                    cause = %cause,
                    "Rejecting machine token: key set unavailable"
                ),
                other => tracing::warn!(
                    target: "auth_gate.remote",
                    kid = %kid,
                    reason = other.code(),
                    "Rejecting machine token: no matching signing key"
                ),
            }
        })?;

        // 3. The key must be able to check this algorithm
        if !key.family().accepts(algorithm) {
            tracing::warn!(target: "auth_gate.remote", kid = %kid, alg = ?algorithm, "Header algorithm does not match key family");
            return Err(AuthError::InvalidToken);
        }
        if let Some(pinned) = key.algorithm() {
            if pinned != algorithm {
                tracing::warn!(target: "auth_gate.remote", kid = %kid, alg = ?algorithm, pinned = ?pinned, "Header algorithm differs from key set entry");
                return Err(AuthError::InvalidToken);
            }
        }

        // 4. Signature, expiry, audience, issuer
        let mut validation = Validation::new(algorithm);
        validation.algorithms = vec![algorithm];
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);

        let token_data =
            decode::<RemoteClaims>(token, key.decoding_key(), &validation).map_err(|e| {
                tracing::debug!(target: "auth_gate.remote", error = %e, "Machine token verification failed");
                AuthError::InvalidToken
            })?;

        tracing::debug!(target: "auth_gate.remote", "Machine token validated successfully");
        Ok(token_data.claims)
    }

    /// Read the header algorithm and check it against the allow-list.
    ///
    /// Runs before any key lookup, so tokens with `none`, HMAC or otherwise
    /// unlisted algorithms never cause a key set fetch.
    fn header_algorithm(&self, token: &str) -> Result<Algorithm, AuthError> {
        let raw = extract_alg(token).map_err(|e| {
            tracing::debug!(target: "auth_gate.remote", error = ?e, "Token alg extraction failed");
            AuthError::InvalidToken
        })?;

        let algorithm = Algorithm::from_str(&raw).map_err(|_| {
            tracing::warn!(target: "auth_gate.remote", alg = %raw, "Rejecting unknown token algorithm");
            AuthError::InvalidToken
        })?;

        if !self.allowed_algorithms.contains(&algorithm) {
            tracing::warn!(target: "auth_gate.remote", alg = %raw, "Rejecting token algorithm outside allow-list");
            return Err(AuthError::InvalidToken);
        }

        Ok(algorithm)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::key_set::{JwksDocument, KeySetFetcher};
    use async_trait::async_trait;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EmptyFetcher {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl KeySetFetcher for EmptyFetcher {
        async fn fetch(&self) -> Result<JwksDocument, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AuthError::KeySetUnavailable("timeout".to_string()))
            } else {
                Ok(JwksDocument { keys: Vec::new() })
            }
        }
    }

    fn verifier(fail: bool) -> (RemoteTokenVerifier, Arc<EmptyFetcher>) {
        let fetcher = Arc::new(EmptyFetcher {
            calls: AtomicUsize::new(0),
            fail,
        });
        let cache = Arc::new(KeySetCache::new(fetcher.clone()));
        let verifier = RemoteTokenVerifier::new(
            cache,
            "https://api.example/".to_string(),
            "https://tenant.idp.example/".to_string(),
            vec![Algorithm::RS256],
        );
        (verifier, fetcher)
    }

    fn unsigned_token(header: &str) -> String {
        let payload = r#"{"sub":"svc@clients","exp":9999999999,"aud":"https://api.example/","iss":"https://tenant.idp.example/"}"#;
        format!(
            "{}.{}.c2lnbmF0dXJl",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[tokio::test]
    async fn test_alg_none_rejected_without_fetch() {
        let (verifier, fetcher) = verifier(false);
        let token = unsigned_token(r#"{"alg":"none","kid":"k1"}"#);

        assert_eq!(verifier.verify(&token).await.unwrap_err(), AuthError::InvalidToken);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hmac_header_rejected_without_fetch() {
        let (verifier, fetcher) = verifier(false);
        let token = unsigned_token(r#"{"alg":"HS256","kid":"k1"}"#);

        assert_eq!(verifier.verify(&token).await.unwrap_err(), AuthError::InvalidToken);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unlisted_rsa_algorithm_rejected() {
        let (verifier, fetcher) = verifier(false);
        let token = unsigned_token(r#"{"alg":"RS512","kid":"k1"}"#);

        assert_eq!(verifier.verify(&token).await.unwrap_err(), AuthError::InvalidToken);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_kid_rejected() {
        let (verifier, fetcher) = verifier(false);
        let token = unsigned_token(r#"{"alg":"RS256"}"#);

        assert_eq!(verifier.verify(&token).await.unwrap_err(), AuthError::InvalidToken);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_token_rejected() {
        let (verifier, _) = verifier(false);
        assert_eq!(
            verifier.verify("not-a-jwt").await.unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[tokio::test]
    async fn test_unknown_kid_is_invalid_token_after_one_fetch() {
        let (verifier, fetcher) = verifier(false);
        let token = unsigned_token(r#"{"alg":"RS256","kid":"unknown"}"#);

        assert_eq!(verifier.verify(&token).await.unwrap_err(), AuthError::InvalidToken);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_verify_with_cause_keeps_key_set_failures() {
        let token = unsigned_token(r#"{"alg":"RS256","kid":"unknown"}"#);

        let (missing_key, _) = verifier(false);
        assert_eq!(
            missing_key.verify_with_cause(&token).await.unwrap_err(),
            AuthError::KeyNotFound
        );

        let (unavailable, _) = verifier(true);
        assert!(matches!(
            unavailable.verify_with_cause(&token).await.unwrap_err(),
            AuthError::KeySetUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_key_set_unavailable_is_invalid_token() {
        let (verifier, fetcher) = verifier(true);
        let token = unsigned_token(r#"{"alg":"RS256","kid":"k1"}"#);

        assert_eq!(verifier.verify(&token).await.unwrap_err(), AuthError::InvalidToken);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }
}
