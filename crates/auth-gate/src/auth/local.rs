//! Local session tokens.
//!
//! Issues and verifies HMAC-signed tokens for first-party users. Purely
//! computational: no I/O, no shared state beyond the configured secret.
//!
//! # Security
//!
//! - Exactly one algorithm is accepted, the configured one
//! - Expired tokens are rejected with zero leeway
//! - Every structural, signature or expiry failure is `InvalidToken`

use crate::auth::claims::LocalClaims;
use crate::auth::principal::UserId;
use crate::config::Config;
use crate::errors::AuthError;
use common::jwt::MAX_JWT_SIZE_BYTES;
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Body returned to a user who just registered or logged in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until the token expires.
    pub expires_in: i64,
}

/// Issues and verifies locally signed session tokens.
pub struct LocalTokenService {
    secret: SecretString,
    algorithm: Algorithm,
    lifetime_seconds: i64,
}

impl LocalTokenService {
    /// Create a service signing with `secret` under `algorithm`.
    pub fn new(secret: SecretString, algorithm: Algorithm, lifetime_seconds: i64) -> Self {
        Self {
            secret,
            algorithm,
            lifetime_seconds,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.local_signing_secret.clone(),
            config.local_signing_algorithm,
            config.local_token_lifetime_seconds,
        )
    }

    /// Issue a session token for `user_id`, valid for the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Signing` if encoding fails.
    #[instrument(skip(self))]
    pub fn issue(&self, user_id: UserId) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        self.issue_at(user_id, now)
    }

    /// Issue a token and wrap it in the login/registration response body.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Signing` if encoding fails.
    pub fn issue_response(&self, user_id: UserId) -> Result<TokenResponse, AuthError> {
        Ok(TokenResponse {
            access_token: self.issue(user_id)?,
            token_type: "bearer".to_string(),
            expires_in: self.lifetime_seconds,
        })
    }

    fn issue_at(&self, user_id: UserId, now: i64) -> Result<String, AuthError> {
        let exp = now.checked_add(self.lifetime_seconds).ok_or_else(|| {
            tracing::error!(
                target: "auth_gate.local",
                lifetime_seconds = self.lifetime_seconds,
                "Local token expiry overflows"
            );
            AuthError::Signing("token expiry out of range".to_string())
        })?;

        let claims = LocalClaims {
            sub: user_id.to_string(),
            exp,
            iat: now,
        };

        let mut header = Header::new(self.algorithm);
        header.typ = Some("JWT".to_string());

        let key = EncodingKey::from_secret(self.secret.expose_secret().as_bytes());
        encode(&header, &claims, &key).map_err(|e| {
            tracing::error!(target: "auth_gate.local", error = %e, "Failed to sign local token");
            AuthError::Signing(e.to_string())
        })
    }

    /// Verify a local token and return its user ID.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidToken` - size, structure, algorithm, signature or expiry
    /// - `AuthError::MalformedSubject` - verified, but `sub` is not an integer
    #[instrument(skip_all)]
    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        if token.len() > MAX_JWT_SIZE_BYTES {
            tracing::debug!(target: "auth_gate.local", token_size = token.len(), "Token too large");
            return Err(AuthError::InvalidToken);
        }

        let key = DecodingKey::from_secret(self.secret.expose_secret().as_bytes());
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let token_data = decode::<LocalClaims>(token, &key, &validation).map_err(|e| {
            tracing::debug!(target: "auth_gate.local", error = %e, "Local token verification failed");
            AuthError::InvalidToken
        })?;

        token_data.claims.sub.parse::<UserId>().map_err(|_| {
            tracing::debug!(target: "auth_gate.local", "Local token subject is not an integer");
            AuthError::MalformedSubject
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-local-secret";

    fn service() -> LocalTokenService {
        LocalTokenService::new(SecretString::from(SECRET), Algorithm::HS256, 7200)
    }

    fn sign_raw(claims: &serde_json::Value, algorithm: Algorithm, secret: &str) -> String {
        encode(
            &Header::new(algorithm),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_then_verify_round_trip() {
        let service = service();
        let token = service.issue(42).unwrap();

        assert_eq!(service.verify(&token).unwrap(), 42);
    }

    #[test]
    fn test_round_trip_negative_and_large_ids() {
        let service = service();
        for id in [0, -7, i64::MAX] {
            let token = service.issue(id).unwrap();
            assert_eq!(service.verify(&token).unwrap(), id);
        }
    }

    #[test]
    fn test_issued_claims_have_two_hour_expiry() {
        let service = service();
        let token = service.issue_at(5, 1_700_000_000).unwrap();

        let payload = token.split('.').nth(1).unwrap();
        let bytes = base64::Engine::decode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            payload,
        )
        .unwrap();
        let claims: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(claims["sub"], "5");
        assert_eq!(claims["iat"], 1_700_000_000);
        assert_eq!(claims["exp"], 1_700_000_000 + 7200);
    }

    #[test]
    fn test_issue_response_shape() {
        let response = service().issue_response(9).unwrap();

        assert_eq!(response.token_type, "bearer");
        assert_eq!(response.expires_in, 7200);
        assert_eq!(service().verify(&response.access_token).unwrap(), 9);
    }

    #[test]
    fn test_overflowing_lifetime_is_signing_error() {
        let service =
            LocalTokenService::new(SecretString::from(SECRET), Algorithm::HS256, i64::MAX);

        assert!(matches!(service.issue(1), Err(AuthError::Signing(_))));
        assert!(matches!(service.issue_response(1), Err(AuthError::Signing(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = service();
        let issued = chrono::Utc::now().timestamp() - 7201;
        let token = service.issue_at(42, issued).unwrap();

        assert_eq!(service.verify(&token).unwrap_err(), AuthError::InvalidToken);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let other = LocalTokenService::new(SecretString::from("another-secret"), Algorithm::HS256, 7200);
        let token = other.issue(42).unwrap();

        assert_eq!(service().verify(&token).unwrap_err(), AuthError::InvalidToken);
    }

    #[test]
    fn test_other_hmac_algorithm_rejected() {
        let exp = chrono::Utc::now().timestamp() + 600;
        let token = sign_raw(
            &serde_json::json!({"sub": "42", "exp": exp}),
            Algorithm::HS512,
            SECRET,
        );

        assert_eq!(service().verify(&token).unwrap_err(), AuthError::InvalidToken);
    }

    #[test]
    fn test_alg_none_rejected() {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

        let exp = chrono::Utc::now().timestamp() + 600;
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"42","exp":{exp}}}"#));
        let token = format!("{header}.{payload}.");

        assert_eq!(service().verify(&token).unwrap_err(), AuthError::InvalidToken);
    }

    #[test]
    fn test_missing_exp_rejected() {
        let token = sign_raw(&serde_json::json!({"sub": "42"}), Algorithm::HS256, SECRET);
        assert_eq!(service().verify(&token).unwrap_err(), AuthError::InvalidToken);
    }

    #[test]
    fn test_non_integer_subject_is_malformed() {
        let exp = chrono::Utc::now().timestamp() + 600;
        let token = sign_raw(
            &serde_json::json!({"sub": "alice", "exp": exp, "iat": exp - 600}),
            Algorithm::HS256,
            SECRET,
        );

        assert_eq!(
            service().verify(&token).unwrap_err(),
            AuthError::MalformedSubject
        );
    }

    #[test]
    fn test_garbage_and_oversized_rejected() {
        let service = service();
        assert_eq!(service.verify("").unwrap_err(), AuthError::InvalidToken);
        assert_eq!(service.verify("a.b.c").unwrap_err(), AuthError::InvalidToken);
        assert_eq!(
            service
                .verify(&"a".repeat(MAX_JWT_SIZE_BYTES + 1))
                .unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

        let service = service();
        let token = service.issue(42).unwrap();
        let mut parts: Vec<String> = token.split('.').map(ToString::to_string).collect();

        let exp = chrono::Utc::now().timestamp() + 600;
        if let Some(payload) = parts.get_mut(1) {
            *payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"1","exp":{exp},"iat":0}}"#));
        }
        let forged = parts.join(".");

        assert_eq!(service.verify(&forged).unwrap_err(), AuthError::InvalidToken);
    }
}
