//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports [`secrecy`] types. The local signing secret and raw bearer
//! tokens are held as `SecretString` so that any struct deriving `Debug`
//! over them prints a redacted placeholder instead of the value.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let signing_secret = SecretString::from("hmac-signing-secret");
//! assert!(!format!("{signing_secret:?}").contains("hmac-signing-secret"));
//!
//! // Reading the value must be explicit
//! let bytes: &[u8] = signing_secret.expose_secret().as_bytes();
//! assert_eq!(bytes.len(), 19);
//! ```

pub use secrecy::{ExposeSecret, SecretString};
