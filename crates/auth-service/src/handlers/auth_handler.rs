//! Login, registration, token introspection and caller identity.

use crate::errors::AuthError;
use crate::middleware::auth::bearer_token;
use crate::middleware::AuthContext;
use crate::observability::metrics::{record_error, record_login, record_registration};
use crate::observability::{hash_for_correlation, ErrorCategory};
use crate::routes::AppState;
use crate::services::user_service::{NewUser, User};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use common::jwt::Role;
use common::secret::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

const TOKEN_TYPE: &str = "Bearer";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    pub username: String,
    pub password: SecretString,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: SecretString,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub subject: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub subject: String,
    pub role: Role,
}

/// Handle login
///
/// POST /auth/login
#[instrument(skip_all, name = "auth.handlers.login")]
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    let result = login(&state, payload).await;
    record_login(if result.is_ok() { "success" } else { "error" });
    result.map(Json).map_err(|e| observe("login", e))
}

async fn login(state: &AppState, payload: LoginRequest) -> Result<LoginResponse, AuthError> {
    let user = state
        .users
        .authenticate(&payload.username, &payload.password)
        .await?;
    let access_token = issue_for(state, &user)?;

    tracing::info!(
        target: "auth.handlers",
        subject_hash = %hash_for_correlation(&user.username),
        role = %user.role,
        "Login succeeded"
    );

    Ok(LoginResponse {
        access_token,
        token_type: TOKEN_TYPE,
        expires_in: state.issuer.ttl().as_secs(),
        username: user.username,
        email: user.email,
        role: user.role,
        first_name: user.first_name,
        last_name: user.last_name,
    })
}

/// Handle self-registration
///
/// POST /auth/register
///
/// Creates the account and returns a token for it (auto-login).
#[instrument(skip_all, name = "auth.handlers.register")]
pub async fn handle_register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    let result = register(&state, payload).await;
    record_registration(if result.is_ok() { "success" } else { "error" });
    result
        .map(|response| (StatusCode::CREATED, Json(response)))
        .map_err(|e| observe("register", e))
}

async fn register(state: &AppState, payload: RegisterRequest) -> Result<RegisterResponse, AuthError> {
    let user = state
        .users
        .register(NewUser {
            username: payload.username,
            email: payload.email,
            password: payload.password,
            first_name: payload.first_name,
            last_name: payload.last_name,
            role: payload.role,
        })
        .await?;
    let access_token = issue_for(state, &user)?;

    Ok(RegisterResponse {
        user_id: user.user_id,
        username: user.username,
        email: user.email,
        role: user.role,
        access_token,
        token_type: TOKEN_TYPE,
        expires_in: state.issuer.ttl().as_secs(),
    })
}

/// Handle token introspection for services that cannot verify locally
///
/// POST /auth/validate
///
/// Reads the token from `Authorization: Bearer ...`. Answers with the claims
/// on success and the classified 401 otherwise.
#[instrument(skip_all, name = "auth.handlers.validate")]
pub async fn handle_validate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ValidateResponse>, AuthError> {
    let token = bearer_token(&headers).ok_or(AuthError::Forbidden)?;

    let claims = state
        .validator
        .validate(token)
        .await
        .map_err(|e| observe("validate", AuthError::from(e)))?;

    Ok(Json(ValidateResponse {
        valid: true,
        subject: claims.subject().to_string(),
        role: claims.role(),
        expires_at: DateTime::from_timestamp(claims.expires_at(), 0).unwrap_or_default(),
    }))
}

/// Handle caller identity
///
/// GET /auth/me
#[instrument(skip_all, name = "auth.handlers.me")]
pub async fn handle_me(
    context: Option<Extension<AuthContext>>,
) -> Result<Json<MeResponse>, AuthError> {
    let Extension(context) = context.ok_or(AuthError::Forbidden)?;

    Ok(Json(MeResponse {
        subject: context.subject().to_string(),
        role: context.role(),
    }))
}

fn issue_for(state: &AppState, user: &User) -> Result<String, AuthError> {
    let mut extra = Map::new();
    extra.insert("email".to_string(), Value::from(user.email.clone()));
    Ok(state.issuer.issue(&user.username, user.role, Some(extra))?)
}

fn observe(operation: &str, err: AuthError) -> AuthError {
    record_error(
        operation,
        ErrorCategory::from(&err).as_str(),
        err.status_code().as_u16(),
    );
    err
}
