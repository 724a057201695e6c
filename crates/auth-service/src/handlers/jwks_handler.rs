use crate::errors::AuthError;
use crate::observability::metrics::record_jwks_request;
use crate::routes::AppState;
use crate::services::key_management_service;
use axum::{
    extract::State,
    http::header::{HeaderMap, HeaderValue, CACHE_CONTROL},
    Json,
};
use common::jwks::Jwks;
use std::sync::Arc;
use tracing::instrument;

/// Handle discovery document request
///
/// GET /.well-known/jwks.json
/// GET /auth/jwks
///
/// Returns the signing public key in JWKS format (RFC 7517). Remote verifiers
/// may cache the response for an hour.
#[instrument(name = "auth.jwks.get", skip_all, fields(status))]
pub async fn handle_get_jwks(
    State(state): State<Arc<AppState>>,
) -> Result<(HeaderMap, Json<Jwks>), AuthError> {
    let result = key_management_service::publish(&state.keys);

    let status = if result.is_ok() { "success" } else { "error" };
    tracing::Span::current().record("status", status);
    record_jwks_request(status);

    let jwks = result?;

    let mut headers = HeaderMap::new();
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );

    Ok((headers, Json(jwks)))
}
