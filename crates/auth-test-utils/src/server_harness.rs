//! Test server harness for E2E testing
//!
//! Provides [`TestAuthServer`] for spawning the real auth service router in
//! tests, backed by the fixture keys and an in-memory user store.

use crate::crypto_fixtures::primary_key_paths;
use crate::token_builders::TEST_ISSUER;
use auth_service::config::Config;
use auth_service::observability::metrics::init_metrics_recorder;
use auth_service::routes::{self, AppState};
use auth_service::services::user_service::{NewUser, User};
use axum::Router;
use common::jwt::Role;
use common::secret::SecretString;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Token lifetime used by test servers (24 hours).
pub const TEST_TOKEN_TTL_SECONDS: u64 = 86_400;

/// Password used by [`TestAuthServer::seed_user`].
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Test harness for spawning the auth service in E2E tests
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_login_flow() -> Result<()> {
///     let server = TestAuthServer::spawn().await?;
///     server.seed_user("dr.grey", Role::Doctor).await?;
///
///     let response = reqwest::Client::new()
///         .post(format!("{}/auth/login", server.url()))
///         .json(&json!({"username": "dr.grey", "password": TEST_PASSWORD}))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestAuthServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestAuthServer {
    /// Spawn a server with default configuration
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        TestAuthServerBuilder::new().spawn().await
    }

    /// Start building a customized server
    pub fn builder() -> TestAuthServerBuilder {
        TestAuthServerBuilder::new()
    }

    /// Get the base URL of the test server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the application state
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Get reference to the server configuration
    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// Issue a token directly through the server's issuer
    pub fn issue_token(&self, subject: &str, role: Role) -> Result<String, anyhow::Error> {
        Ok(self.state.issuer.issue(subject, role, None)?)
    }

    /// Create an account with [`TEST_PASSWORD`] and any role
    pub async fn seed_user(&self, username: &str, role: Role) -> Result<User, anyhow::Error> {
        let user = self
            .state
            .users
            .create(
                NewUser {
                    username: username.to_string(),
                    email: format!("{username}@clinic.test"),
                    password: SecretString::from(TEST_PASSWORD),
                    first_name: None,
                    last_name: None,
                    role: None,
                },
                role,
            )
            .await?;
        Ok(user)
    }
}

/// Builder for [`TestAuthServer`]
///
/// Configuration goes through [`Config::from_vars`], so every option uses
/// the same environment variable names as production.
pub struct TestAuthServerBuilder {
    vars: HashMap<String, String>,
    extra_routes: Router,
    check_keys: bool,
}

impl TestAuthServerBuilder {
    fn new() -> Self {
        let (private, public) = primary_key_paths();
        let vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            (
                "AUTH_PRIVATE_KEY_PATH".to_string(),
                private.display().to_string(),
            ),
            (
                "AUTH_PUBLIC_KEY_PATH".to_string(),
                public.display().to_string(),
            ),
            ("AUTH_ISSUER".to_string(), TEST_ISSUER.to_string()),
            (
                "AUTH_TOKEN_TTL_SECONDS".to_string(),
                TEST_TOKEN_TTL_SECONDS.to_string(),
            ),
            // Lowest accepted cost keeps registration tests fast
            ("BCRYPT_COST".to_string(), "10".to_string()),
        ]);

        Self {
            vars,
            extra_routes: Router::new(),
            check_keys: true,
        }
    }

    /// Set any configuration variable
    pub fn with_var(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }

    /// Use a different key pair
    pub fn with_keys(self, private: &Path, public: &Path) -> Self {
        self.with_var("AUTH_PRIVATE_KEY_PATH", &private.display().to_string())
            .with_var("AUTH_PUBLIC_KEY_PATH", &public.display().to_string())
    }

    /// `;`-separated policy rules, e.g. `GET /patients/** DOCTOR,ADMIN`
    pub fn with_policy_rules(self, rules: &str) -> Self {
        self.with_var("AUTH_POLICY_RULES", rules)
    }

    /// `passthrough` or `reject`
    pub fn with_gate_mode(self, mode: &str) -> Self {
        self.with_var("AUTH_GATE_MODE", mode)
    }

    /// Allow DOCTOR and ADMIN self-registration
    pub fn allow_privileged_registration(self) -> Self {
        self.with_var("AUTH_ALLOW_PRIVILEGED_REGISTRATION", "true")
    }

    /// Extra routes served behind the same gate and policy
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.extra_routes = self.extra_routes.merge(routes);
        self
    }

    /// Start without the startup key check, for exercising readiness
    /// failures
    pub fn skip_key_check(mut self) -> Self {
        self.check_keys = false;
        self
    }

    /// Spawn the server
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Load and cross-check the key pair (unless skipped)
    /// - Start the HTTP server in the background
    pub async fn spawn(self) -> Result<TestAuthServer, anyhow::Error> {
        let config = Config::from_vars(&self.vars)
            .map_err(|e| anyhow::anyhow!("Invalid test configuration: {}", e))?;

        let state = Arc::new(AppState::new(config)?);

        if self.check_keys {
            state
                .keys
                .ensure_loaded()
                .map_err(|e| anyhow::anyhow!("Failed to load test keys: {}", e))?;
        }

        // The global recorder can only be installed once per process; later
        // servers get a standalone recorder.
        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                PrometheusBuilder::new().build_recorder().handle()
            }
        };

        let app = routes::build_routes_with(Arc::clone(&state), metrics_handle, self.extra_routes);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(TestAuthServer {
            addr,
            state,
            _handle: handle,
        })
    }
}

impl Drop for TestAuthServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
