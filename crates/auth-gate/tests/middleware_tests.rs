//! Middleware integration tests.
//!
//! Mounts the auth middleware on a small router and drives it with
//! `tower::ServiceExt::oneshot`.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use auth_gate::auth::{AuthDecisionRouter, Principal};
use auth_gate::config::Config;
use auth_gate::middleware::auth::{require_principal, require_user, AuthState};
use auth_gate::users::InMemoryUserStore;
use auth_gate_test_utils::{jwks_document, MockJwksServer, TestRemoteClaimsBuilder, TestRsaKey};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware,
    routing::get,
    Extension, Router,
};
use http_body_util::BodyExt;
use jsonwebtoken::Algorithm;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

const ISSUER: &str = "https://tenant.idp.example/";
const AUDIENCE: &str = "https://api.notes.example/";
const M2M_CLIENT_ID: &str = "Xk2pQ9mM2mClient";

fn auth_state(jwks_url: &str, users: &[i64]) -> Arc<AuthState> {
    let vars = HashMap::from([
        ("REMOTE_ISSUER_DOMAIN".to_string(), "tenant.idp.example".to_string()),
        ("REMOTE_AUDIENCE".to_string(), AUDIENCE.to_string()),
        ("REMOTE_JWKS_URL".to_string(), jwks_url.to_string()),
        ("REMOTE_ALGORITHMS".to_string(), "RS256".to_string()),
        ("M2M_CLIENT_ID".to_string(), M2M_CLIENT_ID.to_string()),
        ("LOCAL_SIGNING_SECRET".to_string(), "middleware-test-secret".to_string()),
        ("LOCAL_SIGNING_ALGORITHM".to_string(), "HS256".to_string()),
    ]);
    let config = Config::from_vars(&vars).unwrap();
    let users = Arc::new(InMemoryUserStore::with_users(users.iter().copied()));

    Arc::new(AuthState {
        router: Arc::new(AuthDecisionRouter::from_config(&config, users)),
    })
}

async fn whoami(Extension(principal): Extension<Principal>) -> String {
    match principal {
        Principal::LocalUser { id } => format!("user:{id}"),
        Principal::MachineClient { client_id } => format!("client:{client_id}"),
    }
}

fn app(state: Arc<AuthState>) -> Router {
    let reads = Router::new()
        .route("/notes", get(whoami))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_principal));

    let writes = Router::new()
        .route("/notes/mine", get(whoami))
        .route_layer(middleware::from_fn_with_state(state, require_user));

    reads.merge(writes)
}

fn get_with_token(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_missing_token_returns_401_with_challenge() {
    let jwks = MockJwksServer::start().await;
    let state = auth_state(&jwks.jwks_url(), &[]);

    let response = app(state).oneshot(get_with_token("/notes", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(challenge.starts_with("Bearer"));
}

#[tokio::test]
async fn test_local_user_reaches_both_routes() {
    let jwks = MockJwksServer::start().await;
    let state = auth_state(&jwks.jwks_url(), &[42]);
    let token = state.router.local_tokens().issue(42).unwrap();

    for uri in ["/notes", "/notes/mine"] {
        let response = app(state.clone())
            .oneshot(get_with_token(uri, Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "user:42");
    }
}

#[tokio::test]
async fn test_machine_client_reads_but_cannot_use_user_routes() {
    let key = TestRsaKey::first("key-1");
    let jwks = MockJwksServer::start().await;
    jwks.serve(jwks_document(&[&key]), 1).await;
    let state = auth_state(&jwks.jwks_url(), &[]);

    let subject = format!("{M2M_CLIENT_ID}@clients");
    let token = key.sign(
        &TestRemoteClaimsBuilder::new(ISSUER, AUDIENCE)
            .for_client(&subject)
            .build(),
        Algorithm::RS256,
    );

    let response = app(state.clone())
        .oneshot(get_with_token("/notes", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, format!("client:{subject}"));

    let response = app(state)
        .oneshot(get_with_token("/notes/mine", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_rejections_share_one_body() {
    let key = TestRsaKey::first("key-1");
    let jwks = MockJwksServer::start().await;
    jwks.serve(jwks_document(&[&key]), 1).await;
    let state = auth_state(&jwks.jwks_url(), &[]);

    let expired_machine = key.sign(
        &TestRemoteClaimsBuilder::new(ISSUER, AUDIENCE)
            .for_client(&format!("{M2M_CLIENT_ID}@clients"))
            .expires_in(-60)
            .build(),
        Algorithm::RS256,
    );
    // Valid signature, but the user store is empty
    let unknown_user = state.router.local_tokens().issue(7).unwrap();

    let mut bodies = Vec::new();
    for token in [None, Some("garbage"), Some(expired_machine.as_str()), Some(unknown_user.as_str())] {
        let response = app(state.clone())
            .oneshot(get_with_token("/notes", token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        bodies.push(body_string(response).await);
    }

    let first = bodies.first().unwrap();
    assert!(bodies.iter().all(|body| body == first));
    assert!(!first.contains("user_not_found"));
}
