//! Token verification core.
//!
//! # Components
//!
//! - `key_set` - fetches and caches the remote issuer's public keys
//! - `local` - issues and verifies locally signed session tokens
//! - `remote` - verifies remotely issued machine tokens
//! - `router` - classifies a token and dispatches it to one verifier
//! - `claims` - claims structures for both token classes
//! - `principal` - the authenticated identity handed to handlers

pub mod claims;
pub mod key_set;
pub mod local;
pub mod principal;
pub mod remote;
pub mod router;

pub use key_set::{KeySetCache, KeySetFetcher};
pub use local::{LocalTokenService, TokenResponse};
pub use principal::{Principal, UserId};
pub use remote::RemoteTokenVerifier;
pub use router::{classify, AuthDecisionRouter, TokenClass};
