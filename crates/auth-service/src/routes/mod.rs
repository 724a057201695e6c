//! HTTP routes for the auth service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::crypto::KeyProvider;
use crate::handlers;
use crate::middleware::{authenticate, enforce_policy, http_metrics_middleware, GateState};
use crate::policy::AuthorizationPolicy;
use crate::services::token_service::{SigningError, TokenIssuer};
use crate::services::token_validator::TokenValidator;
use crate::services::user_service::UserStore;
use axum::{
    middleware,
    routing::{any, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Signing key pair.
    pub keys: Arc<KeyProvider>,

    /// Token issuer bound to `keys`.
    pub issuer: TokenIssuer,

    /// Local-key validator for the gate and `/auth/validate`.
    pub validator: Arc<TokenValidator>,

    /// In-memory accounts.
    pub users: Arc<UserStore>,

    /// Route access rules, configured rules ahead of the defaults.
    pub policy: Arc<AuthorizationPolicy>,
}

impl AppState {
    /// Wire the components for `config`. Keys are not read yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured token lifetime is zero.
    pub fn new(config: Config) -> Result<Self, SigningError> {
        let keys = Arc::new(KeyProvider::from_config(&config));
        let issuer = TokenIssuer::new(Arc::clone(&keys), config.issuer.clone(), config.token_ttl)?;
        let validator = Arc::new(TokenValidator::local(
            Arc::clone(&keys),
            config.issuer.clone(),
            config.jwt_clock_skew,
        ));
        let users = Arc::new(UserStore::from_config(&config));
        let policy = Arc::new(AuthorizationPolicy::with_defaults(
            config.policy_rules.clone(),
        ));

        Ok(Self {
            config,
            keys,
            issuer,
            validator,
            users,
            policy,
        })
    }
}

/// Build the application routes.
///
/// - `/health`, `/ready` - liveness and readiness probes
/// - `/metrics` - Prometheus scrape endpoint
/// - `/.well-known/jwks.json`, `/auth/jwks` - discovery document
/// - `/auth/login`, `/auth/register`, `/auth/validate`, `/auth/me`
/// - `/error` - generic error page
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    build_routes_with(state, metrics_handle, Router::new())
}

/// Build the application routes plus `extra` protected by the same gate and
/// policy.
pub fn build_routes_with(
    state: Arc<AppState>,
    metrics_handle: PrometheusHandle,
    extra: Router,
) -> Router {
    let gate_state = Arc::new(GateState {
        validator: Arc::clone(&state.validator),
        exempt: Arc::new(state.config.exempt_paths.clone()),
        mode: state.config.gate_mode,
    });
    let policy = Arc::clone(&state.policy);

    let app_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/.well-known/jwks.json", get(handlers::handle_get_jwks))
        .route("/auth/jwks", get(handlers::handle_get_jwks))
        .route("/auth/login", post(handlers::handle_login))
        .route("/auth/register", post(handlers::handle_register))
        .route("/auth/validate", post(handlers::handle_validate))
        .route("/auth/me", get(handlers::handle_me))
        .route("/error", any(handlers::error_page))
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (outermost first on the way in):
    // 1. http_metrics_middleware - records ALL responses
    // 2. TimeoutLayer
    // 3. TraceLayer
    // 4. authenticate - attaches AuthContext when a token validates
    // 5. enforce_policy - allows or rejects using that context
    app_routes
        .merge(metrics_routes)
        .merge(extra)
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(policy, enforce_policy))
        .layer(middleware::from_fn_with_state(gate_state, authenticate))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
