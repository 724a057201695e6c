//! Integration tests for login and self-registration

use auth_test_utils::{Role, TestAuthServer, TokenAssertions, TEST_PASSWORD};
use reqwest::StatusCode;
use serde_json::json;

async fn post(
    server: &TestAuthServer,
    path: &str,
    body: serde_json::Value,
) -> reqwest::Result<reqwest::Response> {
    reqwest::Client::new()
        .post(format!("{}{}", server.url(), path))
        .json(&body)
        .send()
        .await
}

#[tokio::test]
async fn test_login_with_username_returns_token() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    server.seed_user("dr.grey", Role::Doctor).await?;

    let response = post(
        &server,
        "/auth/login",
        json!({"username": "dr.grey", "password": TEST_PASSWORD}),
    )
    .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["username"], "dr.grey");
    assert_eq!(body["email"], "dr.grey@clinic.test");
    assert_eq!(body["role"], "DOCTOR");
    assert_eq!(body["expires_in"], 86_400);

    let token = body["access_token"].as_str().unwrap_or_default();
    token
        .assert_valid_jwt()
        .assert_for_subject("dr.grey")
        .assert_has_role("DOCTOR");
    Ok(())
}

#[tokio::test]
async fn test_login_with_email() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    server.seed_user("alice", Role::Patient).await?;

    let response = post(
        &server,
        "/auth/login",
        json!({"username": "alice@clinic.test", "password": TEST_PASSWORD}),
    )
    .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["username"], "alice");
    Ok(())
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    server.seed_user("alice", Role::Patient).await?;

    let wrong_password = post(
        &server,
        "/auth/login",
        json!({"username": "alice", "password": "wrong-password"}),
    )
    .await?;
    let unknown_user = post(
        &server,
        "/auth/login",
        json!({"username": "nobody", "password": TEST_PASSWORD}),
    )
    .await?;

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);

    let a: serde_json::Value = wrong_password.json().await?;
    let b: serde_json::Value = unknown_user.json().await?;
    assert_eq!(a["error"]["code"], "INVALID_CREDENTIALS");
    assert_eq!(a["error"]["code"], b["error"]["code"]);
    assert_eq!(a["error"]["message"], b["error"]["message"]);
    Ok(())
}

#[tokio::test]
async fn test_register_defaults_to_patient_and_logs_in() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = post(
        &server,
        "/auth/register",
        json!({
            "username": "bob",
            "email": "bob@clinic.test",
            "password": "hunter2hunter2",
            "first_name": "Bob"
        }),
    )
    .await?;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["role"], "PATIENT");
    assert!(body["user_id"].is_string());
    body["access_token"]
        .as_str()
        .unwrap_or_default()
        .assert_for_subject("bob")
        .assert_has_role("PATIENT");

    // The new account can log in
    let login = post(
        &server,
        "/auth/login",
        json!({"username": "bob", "password": "hunter2hunter2"}),
    )
    .await?;
    assert_eq!(login.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_register_duplicate_is_conflict() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    server.seed_user("alice", Role::Patient).await?;

    let response = post(
        &server,
        "/auth/register",
        json!({"username": "alice", "email": "new@clinic.test", "password": "hunter2hunter2"}),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = post(
        &server,
        "/auth/register",
        json!({"username": "alice2", "email": "alice@clinic.test", "password": "hunter2hunter2"}),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "USER_EXISTS");
    Ok(())
}

#[tokio::test]
async fn test_register_unknown_role_is_bad_request() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = post(
        &server,
        "/auth/register",
        json!({
            "username": "carol",
            "email": "carol@clinic.test",
            "password": "hunter2hunter2",
            "role": "NURSE"
        }),
    )
    .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "INVALID_ROLE");
    Ok(())
}

#[tokio::test]
async fn test_privileged_registration_is_opt_in() -> Result<(), anyhow::Error> {
    let request = json!({
        "username": "house",
        "email": "house@clinic.test",
        "password": "hunter2hunter2",
        "role": "doctor"
    });

    let closed = TestAuthServer::spawn().await?;
    let response = post(&closed, "/auth/register", request.clone()).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let open = TestAuthServer::builder()
        .allow_privileged_registration()
        .spawn()
        .await?;
    let response = post(&open, "/auth/register", request).await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["role"], "DOCTOR");
    Ok(())
}

#[tokio::test]
async fn test_me_returns_caller() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;
    let token = server.issue_token("dr.grey", Role::Doctor)?;

    let response = reqwest::Client::new()
        .get(format!("{}/auth/me", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["subject"], "dr.grey");
    assert_eq!(body["role"], "DOCTOR");

    let anonymous = reqwest::get(format!("{}/auth/me", server.url())).await?;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}
