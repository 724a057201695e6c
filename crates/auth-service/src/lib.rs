//! Auth Service Library
//!
//! Stateless RSA token authentication: issues RS256 tokens carrying a role
//! claim, verifies them on every request and publishes the public key so
//! other services can verify without calling back.
//!
//! # Modules
//!
//! - `config` - Service configuration
//! - `crypto` - Key loading and password hashing
//! - `errors` - Error types
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authentication gate and policy enforcement
//! - `observability` - Metrics and log correlation
//! - `policy` - Route access rules
//! - `routes` - Router and application state
//! - `services` - Token issuance, validation, publication and accounts

pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod policy;
pub mod routes;
pub mod services;
