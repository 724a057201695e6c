//! In-memory account store for login and self-registration.
//!
//! Supplies `(subject, role)` pairs to the token issuer. Passwords are stored
//! as bcrypt hashes only. Lookups by username and email both resolve to the
//! same account; both must be unique.

use crate::config::Config;
use crate::crypto;
use crate::errors::AuthError;
use crate::observability::hash_for_correlation;
use chrono::{DateTime, Utc};
use common::jwt::Role;
use common::secret::{ExposeSecret, SecretString};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

const MIN_PASSWORD_LENGTH: usize = 8;

// Verified against when the identifier is unknown so both paths cost one bcrypt check
const DUMMY_PASSWORD_HASH: &str = "$2b$12$LQv3c1yqBWVHxkd0LHAkCOYz6TtxMQJqhN8/LewY5GyYqExt7YD3a";

/// A registered account.
#[derive(Clone)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    password_hash: String,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .field("password_hash", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Self-registration request.
#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: SecretString,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
}

/// Account store guarded by an async read/write lock.
pub struct UserStore {
    users: RwLock<HashMap<Uuid, User>>,
    bcrypt_cost: u32,
    allow_privileged_registration: bool,
}

impl UserStore {
    pub fn new(bcrypt_cost: u32, allow_privileged_registration: bool) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            bcrypt_cost,
            allow_privileged_registration,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.bcrypt_cost, config.allow_privileged_registration)
    }

    /// Number of registered accounts.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    /// Register a new account.
    ///
    /// Role defaults to PATIENT. DOCTOR and ADMIN require privileged
    /// registration to be enabled.
    ///
    /// # Errors
    ///
    /// - `BadRequest` - invalid input, or a privileged role when not allowed
    /// - `InvalidRole` - unknown role
    /// - `UserExists` - username or email already taken
    #[instrument(skip_all)]
    pub async fn register(&self, request: NewUser) -> Result<User, AuthError> {
        let role = self.resolve_role(request.role.as_deref())?;
        self.insert(request, role).await
    }

    /// Create an account with any role, bypassing the privileged-role check.
    ///
    /// # Errors
    ///
    /// Same as [`UserStore::register`] apart from role checks.
    #[instrument(skip_all, fields(role = %role))]
    pub async fn create(&self, request: NewUser, role: Role) -> Result<User, AuthError> {
        self.insert(request, role).await
    }

    /// Verify credentials. `identifier` matches either username or email;
    /// an exact username match wins over an email match.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` for an unknown identifier or a wrong password;
    /// the two are indistinguishable to the caller.
    #[instrument(skip_all)]
    pub async fn authenticate(
        &self,
        identifier: &str,
        password: &SecretString,
    ) -> Result<User, AuthError> {
        let found = {
            let users = self.users.read().await;
            users
                .values()
                .find(|u| u.username == identifier)
                .or_else(|| {
                    users
                        .values()
                        .find(|u| u.email.eq_ignore_ascii_case(identifier))
                })
                .cloned()
        };

        let hash = found
            .as_ref()
            .map_or(DUMMY_PASSWORD_HASH, |u| u.password_hash.as_str());
        let valid = crypto::verify_password(password.expose_secret(), hash)?;

        let Some(mut user) = found.filter(|_| valid) else {
            tracing::debug!(
                target: "auth.users",
                identifier_hash = %hash_for_correlation(identifier),
                "Login rejected"
            );
            return Err(AuthError::InvalidCredentials);
        };

        let now = Utc::now();
        if let Some(stored) = self.users.write().await.get_mut(&user.user_id) {
            stored.last_login = Some(now);
        }
        user.last_login = Some(now);

        Ok(user)
    }

    fn resolve_role(&self, requested: Option<&str>) -> Result<Role, AuthError> {
        let role = match requested {
            None => Role::Patient,
            Some(name) => name
                .parse::<Role>()
                .map_err(|e| AuthError::InvalidRole(e.0))?,
        };

        if role != Role::Patient && !self.allow_privileged_registration {
            return Err(AuthError::BadRequest(format!(
                "{role} accounts cannot be self-registered"
            )));
        }
        Ok(role)
    }

    async fn insert(&self, request: NewUser, role: Role) -> Result<User, AuthError> {
        let username = request.username.trim().to_string();
        let email = request.email.trim().to_string();

        if username.is_empty() {
            return Err(AuthError::BadRequest("Username cannot be empty".to_string()));
        }
        if !is_valid_email(&email) {
            return Err(AuthError::BadRequest("Invalid email format".to_string()));
        }
        let password = request.password.expose_secret();
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::BadRequest(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        // Hash outside the lock; uniqueness is checked under the write lock
        let password_hash = crypto::hash_password(password, self.bcrypt_cost)?;

        // Usernames and emails share one login namespace
        let mut users = self.users.write().await;
        if users.values().any(|u| {
            u.username == username
                || u.email.eq_ignore_ascii_case(&email)
                || u.email.eq_ignore_ascii_case(&username)
                || u.username.eq_ignore_ascii_case(&email)
        }) {
            return Err(AuthError::UserExists);
        }

        let user = User {
            user_id: Uuid::new_v4(),
            username,
            email,
            first_name: request.first_name,
            last_name: request.last_name,
            role,
            created_at: Utc::now(),
            last_login: None,
            password_hash,
        };
        users.insert(user.user_id, user.clone());

        tracing::info!(
            target: "auth.users",
            user_id = %user.user_id,
            role = %role,
            "User registered"
        );

        Ok(user)
    }
}

impl std::fmt::Debug for UserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserStore")
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field(
                "allow_privileged_registration",
                &self.allow_privileged_registration,
            )
            .finish_non_exhaustive()
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}
