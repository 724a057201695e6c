//! # Auth Test Utilities
//!
//! Shared test utilities for the auth service.
//!
//! This crate provides:
//! - RSA PEM fixtures (two 2048-bit pairs, a 1024-bit pair, an EC pair)
//! - `TestTokenBuilder` for crafting tokens the service would never issue
//! - `TestAuthServer` running the real router on a random port
//! - `TokenAssertions` for expressive checks on token strings
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let server = TestAuthServer::spawn().await?;
//!     let token = server.issue_token("dr.grey", Role::Doctor)?;
//!
//!     token
//!         .assert_valid_jwt()
//!         .assert_for_subject("dr.grey")
//!         .assert_signed_by(PRIMARY_KID);
//!     Ok(())
//! }
//! ```

pub mod assertions;
pub mod crypto_fixtures;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use assertions::*;
pub use crypto_fixtures::*;
pub use server_harness::*;
pub use token_builders::*;

pub use common::jwt::Role;
