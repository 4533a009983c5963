//! Auth Gate Library
//!
//! Dual-mode authentication for a resource API:
//!
//! - Locally signed (HMAC) session tokens for first-party users
//! - Remotely issued (RSA) client-credential tokens for machine clients,
//!   verified against the issuer's published key set
//!
//! Both paths end in a single [`auth::Principal`] or a single
//! [`errors::Unauthorized`] outcome.
//!
//! # Architecture
//!
//! ```text
//! bearer token -> router (classify) -> { local | remote } -> key_set (remote only) -> Principal
//! ```
//!
//! # Modules
//!
//! - `auth` - Token verification core
//! - `config` - Configuration from environment
//! - `errors` - Error taxonomy and the 401 response
//! - `middleware` - Axum middleware inserting the `Principal`
//! - `observability` - Metrics
//! - `users` - User store collaborator

pub mod auth;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod observability;
pub mod users;
