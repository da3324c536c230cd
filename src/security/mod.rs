//! Credential handling.
//!
//! - [`password`]: Argon2 hashing and verification
//! - [`secret`]: zeroize-on-drop string for passwords in flight
//! - [`auth`]: the pluggable credential check used by PASS and SASL

pub mod auth;
pub mod password;
pub mod secret;

pub use auth::{Authenticator, StoredPasswordAuthenticator};
pub use secret::SecureString;
