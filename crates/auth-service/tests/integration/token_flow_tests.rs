//! Integration tests for issuance and validation over HTTP

use auth_service::services::token_validator::TokenValidator;
use auth_test_utils::{
    flip_signature_byte, other_encoding_key, signature_bytes, tamper_signature, Role,
    TestAuthServer, TestTokenBuilder, TokenAssertions, PRIMARY_KID, TEST_ISSUER,
    TEST_TOKEN_TTL_SECONDS,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use common::jwt::{JwtValidationError, DEFAULT_CLOCK_SKEW};
use reqwest::StatusCode;
use std::sync::Arc;

async fn validate(server: &TestAuthServer, token: &str) -> reqwest::Result<reqwest::Response> {
    reqwest::Client::new()
        .post(format!("{}/auth/validate", server.url()))
        .bearer_auth(token)
        .send()
        .await
}

async fn error_code(response: reqwest::Response) -> Result<String, anyhow::Error> {
    let body: serde_json::Value = response.json().await?;
    Ok(body["error"]["code"].as_str().unwrap_or_default().to_string())
}

#[tokio::test]
async fn test_issued_token_carries_identity() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let token = server.issue_token("dr.grey", Role::Doctor)?;

    token
        .assert_valid_jwt()
        .assert_for_subject("dr.grey")
        .assert_has_role("DOCTOR")
        .assert_issued_by(TEST_ISSUER)
        .assert_signed_by(PRIMARY_KID)
        .assert_expires_in(TEST_TOKEN_TTL_SECONDS);
    Ok(())
}

#[tokio::test]
async fn test_validate_endpoint_returns_claims() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let token = server.issue_token("dr.grey", Role::Doctor)?;

    let response = validate(&server, &token).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["valid"], true);
    assert_eq!(body["subject"], "dr.grey");
    assert_eq!(body["role"], "DOCTOR");
    assert!(body["expires_at"].is_string());
    Ok(())
}

#[tokio::test]
async fn test_validate_in_process_round_trip() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let token = server.issue_token("nurse.joy", Role::Patient)?;

    let validator = TokenValidator::local(
        Arc::clone(&server.state().keys),
        TEST_ISSUER,
        DEFAULT_CLOCK_SKEW,
    );
    let claims = validator.validate(&token).await?;

    assert_eq!(claims.subject(), "nurse.joy");
    assert_eq!(claims.role(), Role::Patient);
    Ok(())
}

#[tokio::test]
async fn test_tampered_signature_is_invalid_signature() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let token = server.issue_token("dr.grey", Role::Doctor)?;

    let response = validate(&server, &tamper_signature(&token)).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await?, "INVALID_SIGNATURE");
    Ok(())
}

#[tokio::test]
async fn test_round_trip_for_every_role_and_subject() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let validator = TokenValidator::local(
        Arc::clone(&server.state().keys),
        TEST_ISSUER,
        DEFAULT_CLOCK_SKEW,
    );

    let subjects = ["a", "dr.grey", "nurse.joy@clinic.test", "ünïcødé", "x y z"];
    for role in Role::ALL {
        for subject in subjects {
            let token = server.issue_token(subject, role)?;
            let claims = validator.validate(&token).await?;
            assert_eq!(claims.subject(), subject, "role {role}");
            assert_eq!(claims.role(), role, "subject {subject}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_any_signature_byte_change_is_invalid_signature() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let token = server.issue_token("dr.grey", Role::Doctor)?;
    let validator = TokenValidator::local(
        Arc::clone(&server.state().keys),
        TEST_ISSUER,
        DEFAULT_CLOCK_SKEW,
    );

    let len = signature_bytes(&token).len();
    assert_eq!(len, 256);
    for index in 0..len {
        let forged = flip_signature_byte(&token, index);
        assert_eq!(
            validator.validate(&forged).await.err(),
            Some(JwtValidationError::InvalidSignature),
            "byte {index}"
        );
    }

    // A truncated signature and an appended byte are rejected too
    let (signed, _) = token
        .rsplit_once('.')
        .ok_or_else(|| anyhow::anyhow!("token has no signature"))?;
    let mut short = signature_bytes(&token);
    short.pop();
    let mut long = signature_bytes(&token);
    long.push(0);
    for bytes in [short, long] {
        let forged = format!("{signed}.{}", URL_SAFE_NO_PAD.encode(bytes));
        assert_eq!(
            validator.validate(&forged).await.err(),
            Some(JwtValidationError::InvalidSignature)
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_token_from_unrelated_key_is_invalid_signature() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let token = TestTokenBuilder::new()
        .for_user("mallory")
        .with_role("ADMIN")
        .sign(&other_encoding_key());

    let response = validate(&server, &token).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await?, "INVALID_SIGNATURE");
    Ok(())
}

#[tokio::test]
async fn test_expired_token_is_expired_despite_valid_signature() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let token = TestTokenBuilder::new()
        .for_user("dr.grey")
        .with_role("DOCTOR")
        .expired()
        .sign_primary();

    let response = validate(&server, &token).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response
        .headers()
        .get("www-authenticate")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    assert_eq!(challenge.as_deref(), Some("Bearer error=\"invalid_token\""));
    assert_eq!(error_code(response).await?, "TOKEN_EXPIRED");

    let validator = TokenValidator::local(
        Arc::clone(&server.state().keys),
        TEST_ISSUER,
        DEFAULT_CLOCK_SKEW,
    );
    assert_eq!(
        validator.validate(&token).await.err(),
        Some(JwtValidationError::Expired)
    );
    Ok(())
}

#[tokio::test]
async fn test_unknown_role_and_foreign_issuer_are_invalid_token() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let nurse = TestTokenBuilder::new().with_role("NURSE").sign_primary();
    let response = validate(&server, &nurse).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await?, "INVALID_TOKEN");

    let foreign = TestTokenBuilder::new()
        .issued_by("https://elsewhere.test")
        .sign_primary();
    let response = validate(&server, &foreign).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await?, "INVALID_TOKEN");
    Ok(())
}

#[tokio::test]
async fn test_garbage_token_is_malformed() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = validate(&server, "definitely.not.ajwt").await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await?, "MALFORMED_TOKEN");
    Ok(())
}

#[tokio::test]
async fn test_validate_without_token_requires_authentication() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::Client::new()
        .post(format!("{}/auth/validate", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await?, "UNAUTHENTICATED");
    Ok(())
}
