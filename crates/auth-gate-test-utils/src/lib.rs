//! # Auth Gate Test Utilities
//!
//! Shared test utilities for the auth gate.
//!
//! This crate provides:
//! - Fixed RSA keypairs for signing machine tokens (TestRsaKey)
//! - Claim builders (TestRemoteClaimsBuilder, TestLocalClaimsBuilder)
//! - A mocked key set endpoint (MockJwksServer)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auth_gate_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let key = TestRsaKey::first("key-1");
//!     let jwks = MockJwksServer::start().await;
//!     jwks.serve(jwks_document(&[&key]), 1).await;
//!
//!     let claims = TestRemoteClaimsBuilder::new(ISSUER, AUDIENCE)
//!         .for_client("abc123@clients")
//!         .build();
//!     let token = key.sign(&claims, Algorithm::RS256);
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_server;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_server::*;
pub use token_builders::*;
