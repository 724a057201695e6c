//! Auth service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl:
//! - MalformedToken, InvalidSignature, ExpiredToken, InvalidToken: 401
//! - Forbidden (no authenticated caller): 401 with `WWW-Authenticate`
//! - InsufficientRole: 403
//! - InvalidCredentials: 401
//! - UserExists: 409
//! - InvalidRole, BadRequest: 400
//! - NotFound: 404
//! - ServiceUnavailable: 503
//! - KeyLoad, Signing, Internal: 500
//!
//! Client-facing messages are generic classifications. Details stay in
//! server-side logs and never include token or key material.

use crate::crypto::{KeyLoadError, PasswordError};
use crate::policy::PolicyDenial;
use crate::services::token_service::SigningError;
use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::jwt::{JwtValidationError, Role};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Malformed token")]
    MalformedToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    ExpiredToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Authentication required")]
    Forbidden,

    #[error("Insufficient role: required one of {required:?}, provided {provided}")]
    InsufficientRole { required: Vec<Role>, provided: Role },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User already exists")]
    UserExists,

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Key error: {0}")]
    KeyLoad(#[from] KeyLoadError),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Internal server error")]
    Internal,
}

impl AuthError {
    /// HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::ExpiredToken
            | AuthError::InvalidToken(_)
            | AuthError::Forbidden
            | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientRole { .. } => StatusCode::FORBIDDEN,
            AuthError::UserExists => StatusCode::CONFLICT,
            AuthError::InvalidRole(_) | AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::KeyLoad(_) | AuthError::Signing(_) | AuthError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JwtValidationError> for AuthError {
    fn from(err: JwtValidationError) -> Self {
        match err {
            JwtValidationError::TokenTooLarge
            | JwtValidationError::MalformedToken
            | JwtValidationError::MissingKid => AuthError::MalformedToken,
            JwtValidationError::InvalidSignature => AuthError::InvalidSignature,
            JwtValidationError::Expired => AuthError::ExpiredToken,
            JwtValidationError::IatTooFarInFuture
            | JwtValidationError::InvalidIssuer
            | JwtValidationError::UnknownRole => AuthError::InvalidToken(err.to_string()),
            JwtValidationError::KeyUnavailable => {
                AuthError::ServiceUnavailable("Token verification key unavailable".to_string())
            }
        }
    }
}

impl From<PolicyDenial> for AuthError {
    fn from(denial: PolicyDenial) -> Self {
        match denial {
            PolicyDenial::Forbidden => AuthError::Forbidden,
            PolicyDenial::InsufficientRole { required, provided } => {
                AuthError::InsufficientRole { required, provided }
            }
        }
    }
}

impl From<SigningError> for AuthError {
    fn from(err: SigningError) -> Self {
        match err {
            SigningError::ReservedClaim(claim) => {
                AuthError::BadRequest(format!("Claim '{claim}' is reserved"))
            }
            other => AuthError::Signing(other.to_string()),
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        tracing::error!(target: "auth.crypto", error = %err, "Password hashing failed");
        AuthError::Internal
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    required_roles: Option<Vec<Role>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provided_role: Option<Role>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message, required_roles, provided_role) = match &self {
            AuthError::MalformedToken => (
                "MALFORMED_TOKEN",
                "The access token is malformed".to_string(),
                None,
                None,
            ),
            AuthError::InvalidSignature => (
                "INVALID_SIGNATURE",
                "The access token signature is invalid".to_string(),
                None,
                None,
            ),
            AuthError::ExpiredToken => (
                "TOKEN_EXPIRED",
                "The access token has expired".to_string(),
                None,
                None,
            ),
            AuthError::InvalidToken(reason) => ("INVALID_TOKEN", reason.clone(), None, None),
            AuthError::Forbidden => (
                "UNAUTHENTICATED",
                "Authentication is required to access this resource".to_string(),
                None,
                None,
            ),
            AuthError::InsufficientRole { required, provided } => (
                "INSUFFICIENT_ROLE",
                "Your role does not permit access to this resource".to_string(),
                Some(required.clone()),
                Some(*provided),
            ),
            AuthError::InvalidCredentials => (
                "INVALID_CREDENTIALS",
                "Invalid username or password".to_string(),
                None,
                None,
            ),
            AuthError::UserExists => (
                "USER_EXISTS",
                "A user with this username or email already exists".to_string(),
                None,
                None,
            ),
            AuthError::InvalidRole(role) => {
                ("INVALID_ROLE", format!("Unknown role: {role}"), None, None)
            }
            AuthError::BadRequest(reason) => ("BAD_REQUEST", reason.clone(), None, None),
            AuthError::NotFound => (
                "NOT_FOUND",
                "The requested resource does not exist".to_string(),
                None,
                None,
            ),
            AuthError::ServiceUnavailable(reason) => {
                tracing::warn!(target: "auth.availability", reason = %reason, "Service unavailable");
                (
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                    None,
                    None,
                )
            }
            AuthError::KeyLoad(err) => {
                tracing::error!(target: "auth.crypto", error = %err, "Signing key unavailable");
                (
                    "KEY_ERROR",
                    "An internal cryptographic error occurred".to_string(),
                    None,
                    None,
                )
            }
            AuthError::Signing(err) => {
                tracing::error!(target: "auth.crypto", error = %err, "Token signing failed");
                (
                    "SIGNING_ERROR",
                    "An internal cryptographic error occurred".to_string(),
                    None,
                    None,
                )
            }
            AuthError::Internal => (
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
                None,
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                timestamp: chrono::Utc::now().to_rfc3339(),
                required_roles,
                provided_role,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            let challenge = match &self {
                AuthError::Forbidden | AuthError::InvalidCredentials => "Bearer",
                _ => "Bearer error=\"invalid_token\"",
            };
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
        }

        response
    }
}
