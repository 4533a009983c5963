//! Token classification and dispatch.
//!
//! The router reads the unverified `sub` of an incoming token only to pick
//! a verifier. Acceptance is decided by that verifier alone: a forged
//! `sub` can send a token to the wrong verifier, which then rejects it.

use crate::auth::key_set::KeySetCache;
use crate::auth::local::LocalTokenService;
use crate::auth::principal::Principal;
use crate::auth::remote::RemoteTokenVerifier;
use crate::config::Config;
use crate::errors::{AuthError, Unauthorized};
use crate::observability::metrics;
use crate::users::UserStore;
use common::jwt::peek_subject;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Provenance of a token, decided before any verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    /// Locally issued session token.
    LocalUser,
    /// Remotely issued machine-to-machine token.
    MachineClient,
}

impl TokenClass {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenClass::LocalUser => "local_user",
            TokenClass::MachineClient => "machine_client",
        }
    }
}

/// Classify a token by its unverified subject.
///
/// A subject containing `m2m_client_id` marks a machine token. Anything
/// else, including unreadable tokens, goes to the local verifier.
pub fn classify(token: &str, m2m_client_id: &str) -> TokenClass {
    match peek_subject(token) {
        Ok(sub) if sub.contains(m2m_client_id) => TokenClass::MachineClient,
        Ok(_) => TokenClass::LocalUser,
        Err(e) => {
            tracing::debug!(target: "auth_gate.router", error = ?e, "Unreadable subject, classifying as local");
            TokenClass::LocalUser
        }
    }
}

/// Dispatches tokens to the right verifier and produces a [`Principal`].
pub struct AuthDecisionRouter {
    local: Arc<LocalTokenService>,
    remote: Arc<RemoteTokenVerifier>,
    users: Arc<dyn UserStore>,
    m2m_client_id: String,
}

impl AuthDecisionRouter {
    pub fn new(
        local: Arc<LocalTokenService>,
        remote: Arc<RemoteTokenVerifier>,
        users: Arc<dyn UserStore>,
        m2m_client_id: String,
    ) -> Self {
        Self {
            local,
            remote,
            users,
            m2m_client_id,
        }
    }

    /// Wire the verifiers from configuration, with an empty key set cache.
    pub fn from_config(config: &Config, users: Arc<dyn UserStore>) -> Self {
        let key_cache = Arc::new(KeySetCache::from_config(config));

        Self::new(
            Arc::new(LocalTokenService::from_config(config)),
            Arc::new(RemoteTokenVerifier::from_config(config, key_cache)),
            users,
            config.m2m_client_id.clone(),
        )
    }

    /// The local token service, for issuing session tokens.
    pub fn local_tokens(&self) -> &Arc<LocalTokenService> {
        &self.local
    }

    /// Authenticate a bearer token of either class.
    ///
    /// # Errors
    ///
    /// Returns [`Unauthorized`] for every failure. The internal cause is
    /// available through [`Unauthorized::reason`] and is logged and counted.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, token: &str) -> Result<Principal, Unauthorized> {
        let start = Instant::now();
        let class = classify(token, &self.m2m_client_id);

        let result = match class {
            TokenClass::MachineClient => self
                .remote
                .verify_with_cause(token)
                .await
                .map(|client_id| Principal::MachineClient { client_id }),
            TokenClass::LocalUser => self.authenticate_local(token).await,
        };

        self.finish(class, result, start)
    }

    /// Authenticate a token that must belong to a local user.
    ///
    /// Machine tokens are rejected without running the remote verifier.
    ///
    /// # Errors
    ///
    /// Returns [`Unauthorized`] for every failure.
    #[instrument(skip_all)]
    pub async fn authenticate_user(&self, token: &str) -> Result<Principal, Unauthorized> {
        let start = Instant::now();
        let class = classify(token, &self.m2m_client_id);

        let result = match class {
            TokenClass::MachineClient => {
                tracing::debug!(target: "auth_gate.router", "Machine token presented where a user is required");
                Err(AuthError::InvalidToken)
            }
            TokenClass::LocalUser => self.authenticate_local(token).await,
        };

        self.finish(class, result, start)
    }

    async fn authenticate_local(&self, token: &str) -> Result<Principal, AuthError> {
        let id = self.local.verify(token)?;

        let exists = self.users.user_exists(id).await.inspect_err(|e| {
            tracing::error!(target: "auth_gate.router", error = %e, "User store lookup failed");
        })?;

        if !exists {
            tracing::debug!(target: "auth_gate.router", user_id = id, "Verified token for unknown user");
            return Err(AuthError::UserNotFound);
        }

        Ok(Principal::LocalUser { id })
    }

    fn finish(
        &self,
        class: TokenClass,
        result: Result<Principal, AuthError>,
        start: Instant,
    ) -> Result<Principal, Unauthorized> {
        match result {
            Ok(principal) => {
                metrics::record_authentication(class.as_str(), None, start.elapsed());
                tracing::debug!(target: "auth_gate.router", class = class.as_str(), "Authenticated");
                Ok(principal)
            }
            Err(cause) => {
                let rejection = Unauthorized::with_cause(cause);
                metrics::record_authentication(class.as_str(), Some(rejection.code()), start.elapsed());
                tracing::info!(
                    target: "auth_gate.router",
                    class = class.as_str(),
                    reason = rejection.code(),
                    "Authentication rejected"
                );
                Err(rejection)
            }
        }
    }
}
