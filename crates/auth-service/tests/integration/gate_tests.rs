//! Integration tests for the authentication gate and authorization policy
//!
//! Mounts a `/patients/:id` resource restricted to DOCTOR and ADMIN and
//! drives it through the real router.

use auth_service::middleware::AuthContext;
use auth_test_utils::{Role, TestAuthServer, TestTokenBuilder};
use axum::{extract::Path, routing::get, Extension, Router};
use reqwest::StatusCode;

const PATIENT_RULES: &str = "GET /patients/** DOCTOR,ADMIN";

fn patient_routes() -> Router {
    Router::new().route(
        "/patients/:id",
        get(
            |Path(id): Path<String>, Extension(caller): Extension<AuthContext>| async move {
                format!("{id}:{}", caller.subject())
            },
        ),
    )
}

async fn spawn(mode: &str) -> Result<TestAuthServer, anyhow::Error> {
    TestAuthServer::builder()
        .with_policy_rules(PATIENT_RULES)
        .with_gate_mode(mode)
        .with_routes(patient_routes())
        .spawn()
        .await
}

async fn get_patient(
    server: &TestAuthServer,
    authorization: Option<&str>,
) -> reqwest::Result<reqwest::Response> {
    let mut request = reqwest::Client::new().get(format!("{}/patients/42", server.url()));
    if let Some(value) = authorization {
        request = request.header("authorization", value);
    }
    request.send().await
}

async fn error_body(response: reqwest::Response) -> Result<serde_json::Value, anyhow::Error> {
    let body: serde_json::Value = response.json().await?;
    Ok(body["error"].clone())
}

#[tokio::test]
async fn test_doctor_token_is_allowed() -> Result<(), anyhow::Error> {
    let server = spawn("passthrough").await?;
    let token = server.issue_token("dr.grey", Role::Doctor)?;

    let response = get_patient(&server, Some(&format!("Bearer {token}"))).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "42:dr.grey");
    Ok(())
}

#[tokio::test]
async fn test_admin_token_is_allowed() -> Result<(), anyhow::Error> {
    let server = spawn("passthrough").await?;
    let token = server.issue_token("root", Role::Admin)?;

    let response = get_patient(&server, Some(&format!("Bearer {token}"))).await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_patient_token_has_insufficient_role() -> Result<(), anyhow::Error> {
    let server = spawn("passthrough").await?;
    let token = server.issue_token("alice", Role::Patient)?;

    let response = get_patient(&server, Some(&format!("Bearer {token}"))).await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let error = error_body(response).await?;
    assert_eq!(error["code"], "INSUFFICIENT_ROLE");
    assert_eq!(error["provided_role"], "PATIENT");
    assert_eq!(error["required_roles"], serde_json::json!(["DOCTOR", "ADMIN"]));
    Ok(())
}

#[tokio::test]
async fn test_missing_header_is_unauthenticated() -> Result<(), anyhow::Error> {
    let server = spawn("passthrough").await?;

    let response = get_patient(&server, None).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response
        .headers()
        .get("www-authenticate")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    assert_eq!(challenge.as_deref(), Some("Bearer"));
    assert_eq!(error_body(response).await?["code"], "UNAUTHENTICATED");
    Ok(())
}

#[tokio::test]
async fn test_bearer_prefix_is_case_sensitive() -> Result<(), anyhow::Error> {
    let server = spawn("passthrough").await?;
    let token = server.issue_token("dr.grey", Role::Doctor)?;

    let response = get_patient(&server, Some(&format!("bearer {token}"))).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_body(response).await?["code"], "UNAUTHENTICATED");
    Ok(())
}

#[tokio::test]
async fn test_expired_token_passthrough_is_unauthenticated() -> Result<(), anyhow::Error> {
    let server = spawn("passthrough").await?;
    let token = TestTokenBuilder::new()
        .for_user("dr.grey")
        .with_role("DOCTOR")
        .expired()
        .sign_primary();

    let response = get_patient(&server, Some(&format!("Bearer {token}"))).await?;

    // The gate drops the bad token; the policy sees an anonymous caller
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_body(response).await?["code"], "UNAUTHENTICATED");
    Ok(())
}

#[tokio::test]
async fn test_expired_token_reject_mode_is_expired() -> Result<(), anyhow::Error> {
    let server = spawn("reject").await?;
    let token = TestTokenBuilder::new()
        .for_user("dr.grey")
        .with_role("DOCTOR")
        .expired()
        .sign_primary();

    let response = get_patient(&server, Some(&format!("Bearer {token}"))).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_body(response).await?["code"], "TOKEN_EXPIRED");
    Ok(())
}

#[tokio::test]
async fn test_reject_mode_leaves_exempt_paths_reachable() -> Result<(), anyhow::Error> {
    let server = spawn("reject").await?;

    let response = reqwest::Client::new()
        .get(format!("{}/.well-known/jwks.json", server.url()))
        .bearer_auth("garbage")
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_unknown_route_requires_authentication_then_404() -> Result<(), anyhow::Error> {
    let server = spawn("passthrough").await?;
    let token = server.issue_token("dr.grey", Role::Doctor)?;

    let anonymous = reqwest::get(format!("{}/nowhere", server.url())).await?;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let authenticated = reqwest::Client::new()
        .get(format!("{}/nowhere", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(authenticated.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_body(authenticated).await?["code"], "NOT_FOUND");
    Ok(())
}
