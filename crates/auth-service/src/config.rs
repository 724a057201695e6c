//! Auth service configuration.
//!
//! Configuration is loaded from environment variables. Key file paths are
//! required; a misconfigured key is a startup error.

use crate::middleware::auth::GateMode;
use crate::policy::{self, PathPattern, PolicyRule};
use crate::services::token_service::MAX_TOKEN_TTL;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default listen address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:4002";

/// Default bcrypt cost factor.
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Minimum accepted bcrypt cost factor.
pub const MIN_BCRYPT_COST: u32 = 10;

/// Maximum accepted bcrypt cost factor.
pub const MAX_BCRYPT_COST: u32 = 14;

/// Paths the authentication gate skips when `AUTH_EXEMPT_PATHS` is unset.
pub const DEFAULT_EXEMPT_PATHS: &str =
    "/health,/ready,/metrics,/auth/login,/auth/register,/auth/jwks,/.well-known/jwks.json,/error";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub private_key_path: PathBuf,
    pub public_key_path: PathBuf,
    /// Overrides the thumbprint-derived `kid` when set.
    pub key_id: Option<String>,
    pub issuer: String,
    pub token_ttl: Duration,
    pub jwt_clock_skew: Duration,
    pub bcrypt_cost: u32,
    pub gate_mode: GateMode,
    pub exempt_paths: Vec<PathPattern>,
    pub policy_rules: Vec<PolicyRule>,
    pub allow_privileged_registration: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid token TTL configuration: {0}")]
    InvalidTokenTtl(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid bcrypt cost configuration: {0}")]
    InvalidBcryptCost(String),

    #[error("Invalid AUTH_GATE_MODE: {0}")]
    InvalidGateMode(String),

    #[error("Invalid AUTH_EXEMPT_PATHS: {0}")]
    InvalidExemptPaths(policy::PolicyParseError),

    #[error("Invalid AUTH_POLICY_RULES: {0}")]
    InvalidPolicyRules(policy::PolicyParseError),

    #[error("Invalid boolean for {0}: expected 'true' or 'false'")]
    InvalidBoolean(String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let required = |name: &str| -> Result<String, ConfigError> {
            vars.get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
        };

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let private_key_path = PathBuf::from(required("AUTH_PRIVATE_KEY_PATH")?);
        let public_key_path = PathBuf::from(required("AUTH_PUBLIC_KEY_PATH")?);
        let issuer = required("AUTH_ISSUER")?;

        let key_id = vars
            .get("AUTH_KEY_ID")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        // Token lifetime has no default: an unset TTL is a deployment error
        let ttl_str = required("AUTH_TOKEN_TTL_SECONDS")?;
        let ttl_secs: u64 = ttl_str.parse().map_err(|e| {
            ConfigError::InvalidTokenTtl(format!(
                "AUTH_TOKEN_TTL_SECONDS must be a valid integer, got '{ttl_str}': {e}"
            ))
        })?;
        if ttl_secs == 0 {
            return Err(ConfigError::InvalidTokenTtl(
                "AUTH_TOKEN_TTL_SECONDS must be greater than 0".to_string(),
            ));
        }
        if ttl_secs > MAX_TOKEN_TTL.as_secs() {
            return Err(ConfigError::InvalidTokenTtl(format!(
                "AUTH_TOKEN_TTL_SECONDS must be at most {}, got {ttl_secs}",
                MAX_TOKEN_TTL.as_secs()
            )));
        }

        let jwt_clock_skew = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{value_str}': {e}"
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {value}"
                )));
            }

            let value = value.unsigned_abs();
            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {value}",
                    MAX_CLOCK_SKEW.as_secs()
                )));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_CLOCK_SKEW
        };

        let bcrypt_cost = if let Some(value_str) = vars.get("BCRYPT_COST") {
            let value: u32 = value_str.parse().map_err(|e| {
                ConfigError::InvalidBcryptCost(format!(
                    "BCRYPT_COST must be a valid integer, got '{value_str}': {e}"
                ))
            })?;

            if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&value) {
                return Err(ConfigError::InvalidBcryptCost(format!(
                    "BCRYPT_COST must be between {MIN_BCRYPT_COST} and {MAX_BCRYPT_COST}, got {value}"
                )));
            }

            value
        } else {
            DEFAULT_BCRYPT_COST
        };

        let gate_mode = match vars.get("AUTH_GATE_MODE") {
            Some(value) => value.parse().map_err(ConfigError::InvalidGateMode)?,
            None => GateMode::default(),
        };

        let exempt_paths = policy::parse_patterns(
            vars.get("AUTH_EXEMPT_PATHS")
                .map_or(DEFAULT_EXEMPT_PATHS, String::as_str),
        )
        .map_err(ConfigError::InvalidExemptPaths)?;

        let policy_rules = match vars.get("AUTH_POLICY_RULES") {
            Some(text) => policy::parse_rules(text).map_err(ConfigError::InvalidPolicyRules)?,
            None => Vec::new(),
        };

        let allow_privileged_registration = match vars.get("AUTH_ALLOW_PRIVILEGED_REGISTRATION") {
            Some(value) => parse_bool(value).ok_or_else(|| {
                ConfigError::InvalidBoolean("AUTH_ALLOW_PRIVILEGED_REGISTRATION".to_string())
            })?,
            None => false,
        };

        Ok(Config {
            bind_address,
            private_key_path,
            public_key_path,
            key_id,
            issuer,
            token_ttl: Duration::from_secs(ttl_secs),
            jwt_clock_skew,
            bcrypt_cost,
            gate_mode,
            exempt_paths,
            policy_rules,
            allow_privileged_registration,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
