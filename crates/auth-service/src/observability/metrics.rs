//! Metrics definitions for the auth service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `auth_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `role`: 3 values (PATIENT, DOCTOR, ADMIN)
//! - `status`: 2 values (success, error)
//! - `error_category`: validation classifications or [`ErrorCategory`] labels
//! - `path`: normalized to known routes or `/other`
//!
//! [`ErrorCategory`]: super::ErrorCategory

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the global Prometheus recorder.
///
/// # Errors
///
/// Returns an error if bucket configuration is rejected or a recorder is
/// already installed in this process.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("auth_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // RSA signing and verification are sub-10ms on 2048-bit keys
        .set_buckets_for_metric(
            Matcher::Prefix("auth_token_".to_string()),
            &[
                0.0005, 0.001, 0.002, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250,
            ],
        )
        .map_err(|e| format!("Failed to set token buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Token Metrics
// ============================================================================

/// Record token issuance duration and outcome
///
/// Metric: `auth_token_issuance_duration_seconds`, `auth_token_issuance_total`
/// Labels: `role`, `status`
pub fn record_token_issuance(role: &str, status: &str, duration: Duration) {
    histogram!("auth_token_issuance_duration_seconds", "role" => role.to_string(), "status" => status.to_string())
        .record(duration.as_secs_f64());

    counter!("auth_token_issuance_total", "role" => role.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record token validation result
///
/// Metric: `auth_token_validation_duration_seconds`, `auth_token_validations_total`
/// Labels: `status`, `error_category`
pub fn record_token_validation(status: &str, error_category: Option<&str>, duration: Duration) {
    let category = error_category.unwrap_or("none");

    histogram!("auth_token_validation_duration_seconds", "status" => status.to_string())
        .record(duration.as_secs_f64());

    counter!("auth_token_validations_total", "status" => status.to_string(), "error_category" => category.to_string())
        .increment(1);
}

// ============================================================================
// Gate and Policy Metrics
// ============================================================================

/// Record an authentication gate outcome
///
/// Metric: `auth_gate_outcomes_total`
/// Labels: `outcome` (exempt, anonymous, authenticated, failed_passthrough, failed_rejected)
pub fn record_gate_outcome(outcome: &str) {
    counter!("auth_gate_outcomes_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record an authorization policy decision
///
/// Metric: `auth_authorization_decisions_total`
/// Labels: `decision` (allowed, forbidden, insufficient_role)
pub fn record_authorization_decision(decision: &str) {
    counter!("auth_authorization_decisions_total", "decision" => decision.to_string())
        .increment(1);
}

// ============================================================================
// JWKS Metrics
// ============================================================================

/// Record a discovery document request
///
/// Metric: `auth_jwks_requests_total`
/// Labels: `status` (success, error)
pub fn record_jwks_request(status: &str) {
    counter!("auth_jwks_requests_total", "status" => status.to_string()).increment(1);
}

// ============================================================================
// Account Metrics
// ============================================================================

/// Record a login attempt
///
/// Metric: `auth_logins_total`
/// Labels: `status`
pub fn record_login(status: &str) {
    counter!("auth_logins_total", "status" => status.to_string()).increment(1);
}

/// Record a self-registration attempt
///
/// Metric: `auth_registrations_total`
/// Labels: `status`
pub fn record_registration(status: &str) {
    counter!("auth_registrations_total", "status" => status.to_string()).increment(1);
}

// ============================================================================
// Error Metrics
// ============================================================================

/// Record error by category
///
/// Metric: `auth_errors_total`
/// Labels: `operation`, `error_category`, `status_code`
pub fn record_error(operation: &str, error_category: &str, status_code: u16) {
    counter!("auth_errors_total",
        "operation" => operation.to_string(),
        "error_category" => error_category.to_string(),
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `auth_http_requests_total`, `auth_http_request_duration_seconds`
/// Labels: `method`, `path`, `status_code`
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let normalized_path = normalize_path(path);

    histogram!("auth_http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => normalized_path.to_string(),
        "status_code" => status_code.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("auth_http_requests_total",
        "method" => method.to_string(),
        "path" => normalized_path.to_string(),
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Map a request path to a bounded label.
fn normalize_path(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/.well-known/jwks.json" => "/.well-known/jwks.json",
        "/auth/jwks" => "/auth/jwks",
        "/auth/login" => "/auth/login",
        "/auth/register" => "/auth/register",
        "/auth/validate" => "/auth/validate",
        "/auth/me" => "/auth/me",
        _ => "/other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_known_paths() {
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/.well-known/jwks.json"), "/.well-known/jwks.json");
        assert_eq!(normalize_path("/auth/login"), "/auth/login");
    }

    #[test]
    fn test_normalize_unknown_paths() {
        assert_eq!(normalize_path("/patients/42"), "/other");
        assert_eq!(normalize_path("/auth/login/extra"), "/other");
    }

    #[test]
    fn test_record_functions_without_recorder() {
        // No recorder installed: calls are no-ops and must not panic
        record_token_issuance("DOCTOR", "success", Duration::from_millis(2));
        record_token_validation("error", Some("expired"), Duration::from_millis(1));
        record_token_validation("success", None, Duration::from_millis(1));
        record_gate_outcome("anonymous");
        record_authorization_decision("allowed");
        record_jwks_request("success");
        record_login("error");
        record_registration("success");
        record_error("login", "authentication", 401);
        record_http_request("GET", "/health", 200, Duration::from_millis(1));
    }
}
