//! Authentication middleware for protected routes.
//!
//! Provides two middleware functions:
//! - `require_principal` - accepts local users and machine clients
//! - `require_user` - accepts local users only
//!
//! Both extract the Bearer token from the Authorization header, run it
//! through the [`AuthDecisionRouter`], and insert the resulting
//! [`Principal`] into request extensions.

use crate::auth::{AuthDecisionRouter, Principal};
use crate::errors::{AuthError, Unauthorized};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Router holding both verifiers.
    pub router: Arc<AuthDecisionRouter>,
}

/// Extract Bearer token from the Authorization header.
fn extract_bearer_token(req: &Request) -> Result<&str, Unauthorized> {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "auth_gate.middleware", "Missing Authorization header");
            Unauthorized::new(AuthError::InvalidToken)
        })?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            tracing::debug!(target: "auth_gate.middleware", "Invalid Authorization header format");
            Unauthorized::new(AuthError::InvalidToken)
        })
}

/// Authentication middleware accepting either token class.
///
/// # Response
///
/// - Returns 401 Unauthorized if the token is missing or rejected
/// - Continues to next handler with `Principal` in extensions otherwise
#[instrument(skip_all, name = "auth_gate.middleware.principal")]
pub async fn require_principal(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, Unauthorized> {
    let token = extract_bearer_token(&req)?;

    let principal = state.router.authenticate(token).await?;

    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

/// Authentication middleware accepting local user tokens only.
///
/// # Response
///
/// - Returns 401 Unauthorized if the token is missing, rejected, or a machine token
/// - Continues to next handler with `Principal::LocalUser` in extensions otherwise
#[instrument(skip_all, name = "auth_gate.middleware.user")]
pub async fn require_user(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, Unauthorized> {
    let token = extract_bearer_token(&req)?;

    let principal = state.router.authenticate_user(token).await?;

    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

/// Extension trait for reading the authenticated principal from a request.
pub trait PrincipalExt {
    /// Returns `None` if no auth middleware ran for this request.
    fn principal(&self) -> Option<&Principal>;
}

impl<B> PrincipalExt for axum::extract::Request<B> {
    fn principal(&self) -> Option<&Principal> {
        self.extensions().get::<Principal>()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    // End-to-end middleware behavior is covered in tests/middleware_tests.rs
    // against a mocked key set endpoint.

    use super::*;
    use axum::body::Body;

    fn request_with_auth(value: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(value) = value {
            builder = builder.header("authorization", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_auth_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AuthState>();
    }

    #[test]
    fn test_extract_bearer_token() {
        let req = request_with_auth(Some("Bearer abc.def.ghi"));
        assert_eq!(extract_bearer_token(&req).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_extract_bearer_token_rejects_missing_and_malformed() {
        for value in [None, Some("Basic dXNlcjpwYXNz"), Some("Bearer "), Some("bearer x.y.z")] {
            let req = request_with_auth(value);
            let err = extract_bearer_token(&req).unwrap_err();
            assert_eq!(err.reason(), &AuthError::InvalidToken);
        }
    }

    #[test]
    fn test_principal_ext_reads_extension() {
        let mut req = request_with_auth(None);
        assert!(req.principal().is_none());

        req.extensions_mut().insert(Principal::LocalUser { id: 3 });
        assert_eq!(req.principal(), Some(&Principal::LocalUser { id: 3 }));
    }
}
