//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used across the workspace for values
//! that must never reach a log line: user passwords, bearer tokens and PEM
//! encoded private keys.
//!
//! `SecretString` and `SecretBox<T>` implement `Debug` with redaction, so a
//! struct that derives `Debug` while holding one of them stays safe to log.
//! Reading the value requires an explicit `.expose_secret()` call, which
//! keeps every access site greppable.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct LoginRequest {
//!     username: String,
//!     password: SecretString,
//! }
//!
//! let req = LoginRequest {
//!     username: "dr.house".to_string(),
//!     password: SecretString::from("vicodin"),
//! };
//!
//! assert!(!format!("{req:?}").contains("vicodin"));
//! assert_eq!(req.password.expose_secret(), "vicodin");
//! ```
//!
//! Use `SecretString` for:
//! - User passwords received at login or registration
//! - Bearer tokens that have to be held across an await point
//! - PEM text of the token signing key
//!
//! Secrets are zeroized on drop.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
