//! Authentication gate.
//!
//! Runs once per request, ahead of the authorization policy:
//!
//! 1. Exempt paths pass through untouched.
//! 2. No `Authorization: Bearer ...` header means an anonymous request.
//! 3. A bearer token is validated. On success an [`AuthContext`] is inserted
//!    into the request extensions for the policy and handlers.
//! 4. On failure the [`GateMode`] decides: `Passthrough` continues anonymously
//!    and lets the policy decide, `Reject` answers 401 immediately.
//!
//! The gate never decides authorization on its own. Only the failure
//! classification is logged, never the token.

use crate::errors::AuthError;
use crate::observability::hash_for_correlation;
use crate::observability::metrics::record_gate_outcome;
use crate::policy::PathPattern;
use crate::services::token_validator::TokenValidator;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use common::jwt::{Role, ValidatedClaims};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;

/// Identity of an authenticated caller for the lifetime of one request.
#[derive(Clone)]
pub struct AuthContext {
    subject: String,
    role: Role,
}

impl AuthContext {
    #[cfg(test)]
    pub(crate) fn new(subject: String, role: Role) -> Self {
        Self { subject, role }
    }

    /// Authenticated subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Role from the validated token.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }
}

impl From<&ValidatedClaims> for AuthContext {
    fn from(claims: &ValidatedClaims) -> Self {
        Self {
            subject: claims.subject().to_string(),
            role: claims.role(),
        }
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("subject", &"[REDACTED]")
            .field("role", &self.role)
            .finish()
    }
}

/// What the gate does with a token that fails validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GateMode {
    /// Continue without a context and let the policy decide.
    #[default]
    Passthrough,
    /// Respond 401 immediately.
    Reject,
}

impl FromStr for GateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passthrough" => Ok(GateMode::Passthrough),
            "reject" => Ok(GateMode::Reject),
            other => Err(format!(
                "expected 'passthrough' or 'reject', got '{other}'"
            )),
        }
    }
}

/// State for the authentication gate.
#[derive(Clone)]
pub struct GateState {
    pub validator: Arc<TokenValidator>,
    pub exempt: Arc<Vec<PathPattern>>,
    pub mode: GateMode,
}

impl GateState {
    fn is_exempt(&self, path: &str) -> bool {
        self.exempt.iter().any(|pattern| pattern.matches(path))
    }
}

/// Extract a bearer token from the Authorization header.
///
/// The `Bearer ` prefix is case-sensitive. Any other scheme, or a header that
/// is not valid ASCII, counts as no token.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authentication gate middleware.
#[instrument(skip_all, name = "auth.gate")]
pub async fn authenticate(
    State(state): State<Arc<GateState>>,
    mut req: Request,
    next: Next,
) -> Response {
    if state.is_exempt(req.uri().path()) {
        record_gate_outcome("exempt");
        return next.run(req).await;
    }

    let Some(token) = bearer_token(req.headers()) else {
        tracing::debug!(target: "auth.gate", "No bearer token, continuing anonymously");
        record_gate_outcome("anonymous");
        return next.run(req).await;
    };

    match state.validator.validate(token).await {
        Ok(claims) => {
            tracing::debug!(
                target: "auth.gate",
                subject_hash = %hash_for_correlation(claims.subject()),
                role = %claims.role(),
                "Request authenticated"
            );
            record_gate_outcome("authenticated");
            req.extensions_mut().insert(AuthContext::from(&claims));
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(
                target: "auth.gate",
                classification = e.classification(),
                "Token validation failed"
            );
            match state.mode {
                GateMode::Passthrough => {
                    record_gate_outcome("failed_passthrough");
                    next.run(req).await
                }
                GateMode::Reject => {
                    record_gate_outcome("failed_rejected");
                    AuthError::from(e).into_response()
                }
            }
        }
    }
}
