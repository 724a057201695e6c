//! Integration tests for the discovery document and remote verification

use auth_service::services::token_validator::TokenValidator;
use auth_test_utils::{
    other_encoding_key, Role, TestAuthServer, TestTokenBuilder, OTHER_KID, PRIMARY_JWKS_JSON,
    PRIMARY_KID, TEST_ISSUER,
};
use common::jwks::{Jwks, JwksClient};
use common::jwt::{JwtValidationError, DEFAULT_CLOCK_SKEW};
use reqwest::StatusCode;

#[tokio::test]
async fn test_jwks_matches_published_key() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::get(format!("{}/.well-known/jwks.json", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let cache_control = response
        .headers()
        .get("cache-control")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    assert_eq!(cache_control.as_deref(), Some("public, max-age=3600"));

    let body: serde_json::Value = response.json().await?;
    let expected: serde_json::Value = serde_json::from_str(PRIMARY_JWKS_JSON)?;
    assert_eq!(body, expected);

    let key = &body["keys"][0];
    assert_eq!(key["kty"], "RSA");
    assert_eq!(key["use"], "sig");
    assert_eq!(key["alg"], "RS256");
    assert_eq!(key["kid"], PRIMARY_KID);
    Ok(())
}

#[tokio::test]
async fn test_both_discovery_paths_serve_identical_documents() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let well_known = reqwest::get(format!("{}/.well-known/jwks.json", server.url()))
        .await?
        .text()
        .await?;
    let legacy = reqwest::get(format!("{}/auth/jwks", server.url()))
        .await?
        .text()
        .await?;
    let again = reqwest::get(format!("{}/.well-known/jwks.json", server.url()))
        .await?
        .text()
        .await?;

    assert_eq!(well_known, legacy);
    assert_eq!(well_known, again, "Publishing must be deterministic");
    Ok(())
}

#[tokio::test]
async fn test_jwks_never_exposes_private_parameters() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let body: serde_json::Value =
        reqwest::get(format!("{}/auth/jwks", server.url())).await?.json().await?;

    let key = &body["keys"][0];
    for private in ["d", "p", "q", "dp", "dq", "qi"] {
        assert!(key.get(private).is_none(), "JWK must not contain '{private}'");
    }
    Ok(())
}

#[tokio::test]
async fn test_remote_verifier_accepts_issued_token() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let token = server.issue_token("dr.grey", Role::Doctor)?;

    let jwks = JwksClient::new(format!("{}/.well-known/jwks.json", server.url()));
    let validator = TokenValidator::remote(jwks, TEST_ISSUER, DEFAULT_CLOCK_SKEW);

    let claims = validator.validate(&token).await?;
    assert_eq!(claims.subject(), "dr.grey");
    assert_eq!(claims.role(), Role::Doctor);
    Ok(())
}

#[tokio::test]
async fn test_remote_verifier_rejects_unrelated_key() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let jwks = JwksClient::new(format!("{}/.well-known/jwks.json", server.url()));
    let validator = TokenValidator::remote(jwks, TEST_ISSUER, DEFAULT_CLOCK_SKEW);

    // Unpublished kid
    let foreign = TestTokenBuilder::new()
        .with_kid(OTHER_KID)
        .sign(&other_encoding_key());
    assert_eq!(
        validator.validate(&foreign).await.err(),
        Some(JwtValidationError::InvalidSignature)
    );

    // Published kid, wrong key
    let forged = TestTokenBuilder::new()
        .with_kid(PRIMARY_KID)
        .sign(&other_encoding_key());
    assert_eq!(
        validator.validate(&forged).await.err(),
        Some(JwtValidationError::InvalidSignature)
    );
    Ok(())
}

#[tokio::test]
async fn test_remote_verifier_requires_kid() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let jwks = JwksClient::new(format!("{}/.well-known/jwks.json", server.url()));
    let validator = TokenValidator::remote(jwks, TEST_ISSUER, DEFAULT_CLOCK_SKEW);

    let token = TestTokenBuilder::new().without_kid().sign_primary();
    assert_eq!(
        validator.validate(&token).await.err(),
        Some(JwtValidationError::MissingKid)
    );
    Ok(())
}

#[tokio::test]
async fn test_jwks_document_parses_as_typed_model() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let jwks: Jwks = reqwest::get(format!("{}/auth/jwks", server.url()))
        .await?
        .json()
        .await?;

    assert_eq!(jwks.keys.len(), 1);
    let key = jwks.keys.first().ok_or_else(|| anyhow::anyhow!("no key"))?;
    assert_eq!(key.kid, PRIMARY_KID);
    assert!(key.decoding_key().is_ok());
    Ok(())
}
