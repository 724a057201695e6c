//! Observability for the auth service.
//!
//! All instrumentation uses `#[instrument(skip_all)]` with explicitly
//! allow-listed fields:
//! - **SAFE**: logged in plaintext (roles, outcomes, classifications)
//! - **HASHED**: SHA-256 truncated for correlation (subjects, login identifiers)
//! - **NEVER**: tokens, passwords, key material

pub mod metrics;

use crate::errors::AuthError;
use sha2::{Digest, Sha256};

/// Hash a field value for correlation in logs (SHA-256, first 8 hex chars).
///
/// One-way and truncated: enough to follow a subject across log lines, not
/// enough to recover it.
pub fn hash_for_correlation(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(digest.get(..4).unwrap_or_default())
}

/// Error categories for metrics labels (bounded cardinality).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or bad credentials
    Authentication,
    /// Authenticated but not permitted
    Authorization,
    /// Token structure, signature or claim failures
    Cryptographic,
    /// Rejected request input
    Request,
    /// Keys, signing, dependencies
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::Cryptographic => "cryptographic",
            ErrorCategory::Request => "request",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl From<&AuthError> for ErrorCategory {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::Forbidden | AuthError::InvalidCredentials => ErrorCategory::Authentication,
            AuthError::InsufficientRole { .. } => ErrorCategory::Authorization,
            AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::ExpiredToken
            | AuthError::InvalidToken(_) => ErrorCategory::Cryptographic,
            AuthError::UserExists
            | AuthError::InvalidRole(_)
            | AuthError::BadRequest(_)
            | AuthError::NotFound => ErrorCategory::Request,
            AuthError::ServiceUnavailable(_)
            | AuthError::KeyLoad(_)
            | AuthError::Signing(_)
            | AuthError::Internal => ErrorCategory::Internal,
        }
    }
}
