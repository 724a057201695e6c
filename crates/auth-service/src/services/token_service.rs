//! Token issuance.
//!
//! [`TokenIssuer`] signs `{sub, role, iss, iat, exp}` (plus optional extra
//! claims) with the RS256 private key from the [`KeyProvider`]. Issuance has
//! no side effects beyond logging and metrics.

use crate::crypto::{KeyLoadError, KeyProvider};
use crate::observability::hash_for_correlation;
use crate::observability::metrics::record_token_issuance;
use chrono::Utc;
use common::jwt::{Claims, Role, RESERVED_CLAIMS, TOKEN_ALGORITHM};
use jsonwebtoken::{encode, Header};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::instrument;

/// Longest token lifetime an issuer accepts (30 days).
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Errors from token issuance.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("Signing key unavailable: {0}")]
    KeyUnavailable(#[from] KeyLoadError),

    #[error("Extra claim '{0}' would override a reserved claim")]
    ReservedClaim(String),

    #[error("Token lifetime must be between 1 second and {} seconds", MAX_TOKEN_TTL.as_secs())]
    InvalidTtl,

    #[error("Token expiry overflows the timestamp range")]
    ExpiryOverflow,

    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

/// Signs identity tokens.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    keys: Arc<KeyProvider>,
    issuer: String,
    ttl: Duration,
    ttl_secs: i64,
}

impl TokenIssuer {
    /// Create an issuer.
    ///
    /// # Errors
    ///
    /// `InvalidTtl` if `ttl` is zero or longer than [`MAX_TOKEN_TTL`].
    pub fn new(
        keys: Arc<KeyProvider>,
        issuer: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self, SigningError> {
        if ttl.is_zero() || ttl > MAX_TOKEN_TTL {
            return Err(SigningError::InvalidTtl);
        }
        let ttl_secs = i64::try_from(ttl.as_secs()).map_err(|_| SigningError::InvalidTtl)?;
        Ok(Self {
            keys,
            issuer: issuer.into(),
            ttl,
            ttl_secs,
        })
    }

    /// `iss` claim value.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Token lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `subject` valid from now.
    ///
    /// # Errors
    ///
    /// See [`TokenIssuer::issue_at`].
    pub fn issue(
        &self,
        subject: &str,
        role: Role,
        extra_claims: Option<Map<String, Value>>,
    ) -> Result<String, SigningError> {
        self.issue_at(subject, role, extra_claims, Utc::now().timestamp())
    }

    /// Issue a token with `iat = now` and `exp = now + ttl`.
    ///
    /// # Errors
    ///
    /// - `KeyUnavailable` - the private key could not be loaded
    /// - `ReservedClaim` - an extra claim reuses `sub`, `role`, `iss`, `iat` or `exp`
    /// - `ExpiryOverflow` - `now + ttl` does not fit in an `i64`
    /// - `Encoding` - signing failed
    #[instrument(skip_all, fields(role = %role))]
    pub fn issue_at(
        &self,
        subject: &str,
        role: Role,
        extra_claims: Option<Map<String, Value>>,
        now: i64,
    ) -> Result<String, SigningError> {
        let start = Instant::now();
        let result = self.sign(subject, role, extra_claims.unwrap_or_default(), now);

        let status = if result.is_ok() { "success" } else { "error" };
        record_token_issuance(role.as_str(), status, start.elapsed());

        match &result {
            Ok(_) => tracing::debug!(
                target: "auth.token",
                subject_hash = %hash_for_correlation(subject),
                role = %role,
                "Token issued"
            ),
            Err(e) => tracing::warn!(target: "auth.token", error = %e, "Token issuance failed"),
        }

        result
    }

    fn sign(
        &self,
        subject: &str,
        role: Role,
        extra: Map<String, Value>,
        now: i64,
    ) -> Result<String, SigningError> {
        if let Some(reserved) = extra.keys().find(|k| RESERVED_CLAIMS.contains(&k.as_str())) {
            return Err(SigningError::ReservedClaim(reserved.clone()));
        }

        let exp = now
            .checked_add(self.ttl_secs)
            .ok_or(SigningError::ExpiryOverflow)?;

        let key = self.keys.load_private_key()?;

        let claims = Claims {
            sub: subject.to_string(),
            role,
            iss: self.issuer.clone(),
            iat: now,
            exp,
            extra,
        };

        let mut header = Header::new(TOKEN_ALGORITHM);
        header.typ = Some("JWT".to_string());
        header.kid = Some(key.key_id().to_string());

        encode(&header, &claims, key.encoding_key())
            .map_err(|e| SigningError::Encoding(e.to_string()))
    }
}
