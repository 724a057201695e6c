//! Common token types and verification shared by every service that issues
//! or consumes clinic identity tokens.

#![warn(clippy::pedantic)]

/// Module for token claims, roles and signature/expiry verification
pub mod jwt;

/// Module for the public-key discovery document and its caching client
pub mod jwks;

/// Module for secret types that prevent accidental logging
pub mod secret;
