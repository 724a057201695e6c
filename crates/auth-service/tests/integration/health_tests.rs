//! Integration tests for health probes and the metrics endpoint

use auth_test_utils::{fixture_path, TestAuthServer};
use reqwest::StatusCode;

// ============================================================================
// Liveness Probe Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint_returns_ok() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "OK");
    Ok(())
}

#[tokio::test]
async fn test_health_ignores_bad_bearer_token() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::Client::new()
        .get(format!("{}/health", server.url()))
        .bearer_auth("not-a-token")
        .send()
        .await?;

    assert_eq!(
        response.status(),
        StatusCode::OK,
        "Exempt paths must not attempt token validation"
    );
    Ok(())
}

// ============================================================================
// Readiness Probe Tests
// ============================================================================

#[tokio::test]
async fn test_ready_endpoint_returns_ok_when_keys_load() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["keys"], "loaded");
    assert!(body.get("error").is_none());
    Ok(())
}

#[tokio::test]
async fn test_ready_endpoint_returns_503_without_keys() -> Result<(), anyhow::Error> {
    let missing = fixture_path("does_not_exist.pem");
    let server = TestAuthServer::builder()
        .with_keys(&missing, &missing)
        .skip_key_check()
        .spawn()
        .await?;

    let response = reqwest::get(format!("{}/ready", server.url())).await?;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "not_ready");

    // Generic message only, never the file path
    let error = body["error"].as_str().unwrap_or_default();
    assert!(!error.contains("does_not_exist"));
    Ok(())
}

#[tokio::test]
async fn test_startup_rejects_mismatched_key_pair() {
    let result = TestAuthServer::builder()
        .with_keys(
            &fixture_path("primary_private.pem"),
            &fixture_path("other_public.pem"),
        )
        .spawn()
        .await;

    assert!(result.is_err(), "Mismatched keys must stop startup");
}

#[tokio::test]
async fn test_startup_rejects_weak_key() {
    let result = TestAuthServer::builder()
        .with_keys(
            &fixture_path("weak_private.pem"),
            &fixture_path("weak_public.pem"),
        )
        .spawn()
        .await;

    assert!(result.is_err(), "1024-bit keys must stop startup");
}

// ============================================================================
// Metrics Endpoint Tests
// ============================================================================

#[tokio::test]
async fn test_metrics_endpoint_is_public() -> Result<(), anyhow::Error> {
    let server = TestAuthServer::spawn().await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}
