//! Token validation against the local key or a remote discovery document.
//!
//! The checks themselves live in [`common::jwt::verify_token`]; this type only
//! decides which public key to hand it:
//!
//! - `Local` - the service's own [`KeyProvider`]
//! - `Remote` - a [`JwksClient`] keyed by the token's `kid`, for services that
//!   verify tokens they did not issue

use crate::crypto::KeyProvider;
use crate::observability::metrics::record_token_validation;
use chrono::Utc;
use common::jwks::{JwksClient, JwksError};
use common::jwt::{self, JwtValidationError, TokenExpectations, ValidatedClaims};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

enum KeySource {
    Local(Arc<KeyProvider>),
    Remote(JwksClient),
}

/// Validates bearer tokens.
pub struct TokenValidator {
    source: KeySource,
    expectations: TokenExpectations,
}

impl TokenValidator {
    /// Validate with the local public key.
    pub fn local(keys: Arc<KeyProvider>, issuer: impl Into<String>, clock_skew: Duration) -> Self {
        Self {
            source: KeySource::Local(keys),
            expectations: TokenExpectations::new(issuer, clock_skew),
        }
    }

    /// Validate with keys fetched from a discovery document.
    pub fn remote(jwks: JwksClient, issuer: impl Into<String>, clock_skew: Duration) -> Self {
        Self {
            source: KeySource::Remote(jwks),
            expectations: TokenExpectations::new(issuer, clock_skew),
        }
    }

    /// Validate a token against the current time.
    ///
    /// # Errors
    ///
    /// See [`TokenValidator::validate_at`].
    pub async fn validate(&self, token: &str) -> Result<ValidatedClaims, JwtValidationError> {
        self.validate_at(token, Utc::now().timestamp()).await
    }

    /// Validate a token at an explicit time.
    ///
    /// # Errors
    ///
    /// The first failing check, in the order structure, signature, expiry,
    /// claims. `KeyUnavailable` if no public key could be obtained.
    #[instrument(skip_all)]
    pub async fn validate_at(
        &self,
        token: &str,
        now: i64,
    ) -> Result<ValidatedClaims, JwtValidationError> {
        let start = Instant::now();
        let result = self.verify(token, now).await;

        match &result {
            Ok(_) => record_token_validation("success", None, start.elapsed()),
            Err(e) => record_token_validation("error", Some(e.classification()), start.elapsed()),
        }

        result
    }

    async fn verify(&self, token: &str, now: i64) -> Result<ValidatedClaims, JwtValidationError> {
        match &self.source {
            KeySource::Local(keys) => {
                // Structure first so a garbage token never touches the key store
                jwt::parse_header(token)?;
                let public = keys.load_public_key().map_err(|e| {
                    tracing::error!(target: "auth.token", error = %e, "Public key unavailable");
                    JwtValidationError::KeyUnavailable
                })?;
                jwt::verify_token(token, public.decoding_key(), &self.expectations, now)
            }
            KeySource::Remote(jwks) => {
                let kid = jwt::extract_kid(token)?;
                let jwk = jwks.get_key(&kid).await.map_err(|e| match e {
                    JwksError::Unavailable => JwtValidationError::KeyUnavailable,
                    // A token naming a key the authority never published
                    JwksError::KeyNotFound | JwksError::UnsupportedKey => {
                        JwtValidationError::InvalidSignature
                    }
                })?;
                let key = jwk
                    .decoding_key()
                    .map_err(|_| JwtValidationError::InvalidSignature)?;
                jwt::verify_token(token, &key, &self.expectations, now)
            }
        }
    }
}

impl fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            KeySource::Local(_) => "local".to_string(),
            KeySource::Remote(jwks) => format!("remote({})", jwks.url()),
        };
        f.debug_struct("TokenValidator")
            .field("source", &source)
            .field("expectations", &self.expectations)
            .finish()
    }
}
