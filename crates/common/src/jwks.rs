//! Public-key discovery document (JWKS) and a caching client for it.
//!
//! The signing authority publishes its RSA public key at
//! `/.well-known/jwks.json`. Remote verifiers use [`JwksClient`] to fetch that
//! document, cache the keys by `kid` and turn a [`Jwk`] into a
//! [`DecodingKey`].
//!
//! # Security
//!
//! - Keys are cached to reduce load on the signing authority
//! - The cache is refreshed on TTL expiry, or on an unknown `kid`, so a
//!   rotated key is picked up without a restart
//! - Unknown-`kid` refetches are limited to one per refresh interval, and
//!   concurrent refreshes collapse into a single fetch
//! - Only `kty = "RSA"` keys are turned into verification keys

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Default cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Minimum time between refetches triggered by an unknown `kid`.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Timeout for a single discovery document fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from discovery document lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwksError {
    /// The discovery document could not be fetched or parsed.
    #[error("Key discovery endpoint unavailable")]
    Unavailable,

    /// The document does not contain the requested `kid`.
    #[error("No key with the requested key ID")]
    KeyNotFound,

    /// The key exists but cannot be used for RS256 verification.
    #[error("Key is not a usable RSA verification key")]
    UnsupportedKey,
}

/// A single RSA public key entry (RFC 7517 / RFC 7518 §6.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type. Always "RSA" for keys this workspace publishes.
    pub kty: String,

    /// Intended use. Always "sig".
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// Key ID matching the `kid` header of issued tokens.
    pub kid: String,

    /// Algorithm. Always "RS256".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Modulus, base64url without padding.
    #[serde(default)]
    pub n: String,

    /// Public exponent, base64url without padding.
    #[serde(default)]
    pub e: String,
}

impl Jwk {
    /// Build a signing-key entry from modulus and exponent.
    #[must_use]
    pub fn rsa_signing_key(kid: impl Into<String>, n: String, e: String) -> Self {
        Self {
            kty: "RSA".to_string(),
            key_use: Some("sig".to_string()),
            kid: kid.into(),
            alg: Some("RS256".to_string()),
            n,
            e,
        }
    }

    /// Convert this entry into a verification key.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedKey` for non-RSA keys, a non-RS256 `alg`, or
    /// components that do not decode.
    pub fn decoding_key(&self) -> Result<DecodingKey, JwksError> {
        if self.kty != "RSA" {
            return Err(JwksError::UnsupportedKey);
        }
        if self.alg.as_deref().is_some_and(|alg| alg != "RS256") {
            return Err(JwksError::UnsupportedKey);
        }
        if self.n.is_empty() || self.e.is_empty() {
            return Err(JwksError::UnsupportedKey);
        }
        DecodingKey::from_rsa_components(&self.n, &self.e).map_err(|e| {
            tracing::debug!(target: "common.jwks", kid = %self.kid, error = %e, "Unusable RSA key components");
            JwksError::UnsupportedKey
        })
    }
}

/// A key set document: `{"keys": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    /// Published keys.
    pub keys: Vec<Jwk>,
}

/// RFC 7638 thumbprint of an RSA public key.
///
/// SHA-256 over the canonical JSON `{"e":..,"kty":"RSA","n":..}`, encoded as
/// base64url without padding. Used as the default `kid`.
#[must_use]
pub fn rsa_thumbprint(n: &str, e: &str) -> String {
    let canonical = format!(r#"{{"e":"{e}","kty":"RSA","n":"{n}"}}"#);
    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}

/// Cached key set with expiry time.
struct CachedJwks {
    keys: HashMap<String, Jwk>,
    fetched_at: Instant,
    expires_at: Instant,
}

enum Lookup {
    Hit(Jwk),
    /// Fresh cache without the `kid`, fetched too recently to refetch.
    RecentMiss,
    Stale,
}

/// Caching client for a remote discovery document.
///
/// Thread-safe; clones share the cache.
#[derive(Clone)]
pub struct JwksClient {
    jwks_url: String,
    http_client: reqwest::Client,
    cache: Arc<RwLock<Option<CachedJwks>>>,
    refresh_lock: Arc<Mutex<()>>,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
}

impl JwksClient {
    /// Create a client with the default 5 minute cache TTL.
    pub fn new(jwks_url: impl Into<String>) -> Self {
        Self::with_ttl(jwks_url, DEFAULT_CACHE_TTL)
    }

    /// Create a client with a custom cache TTL.
    pub fn with_ttl(jwks_url: impl Into<String>, cache_ttl: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "common.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url: jwks_url.into(),
            http_client,
            cache: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
            cache_ttl,
            min_refresh_interval: MIN_REFRESH_INTERVAL,
        }
    }

    /// Set the minimum time between unknown-`kid` refetches.
    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// URL this client fetches from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.jwks_url
    }

    /// Look up a key by `kid`.
    ///
    /// Served from cache while the cache is fresh. An expired cache triggers
    /// a refetch. A fresh cache that lacks `kid` is refetched only if the last
    /// fetch is older than the refresh interval; otherwise the lookup fails
    /// without contacting the server. Concurrent callers that need a refetch
    /// share one request.
    ///
    /// # Errors
    ///
    /// - `Unavailable` - fetching the document failed
    /// - `KeyNotFound` - `kid` is absent from the current document
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Jwk, JwksError> {
        match self.lookup(kid).await {
            Lookup::Hit(key) => return Ok(key),
            Lookup::RecentMiss => return Err(JwksError::KeyNotFound),
            Lookup::Stale => {}
        }

        let _refresh = self.refresh_lock.lock().await;

        // Another caller may have refreshed while this one waited
        match self.lookup(kid).await {
            Lookup::Hit(key) => return Ok(key),
            Lookup::RecentMiss => return Err(JwksError::KeyNotFound),
            Lookup::Stale => {}
        }

        self.refresh_cache().await?;

        let cache = self.cache.read().await;
        if let Some(key) = cache.as_ref().and_then(|c| c.keys.get(kid)) {
            return Ok(key.clone());
        }

        tracing::warn!(target: "common.jwks", "Key not found in JWKS after refresh");
        Err(JwksError::KeyNotFound)
    }

    /// Fetch the document now, replacing the cache.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the fetch or parse fails. The previous cache
    /// is left untouched in that case.
    pub async fn force_refresh(&self) -> Result<(), JwksError> {
        let _refresh = self.refresh_lock.lock().await;
        self.refresh_cache().await
    }

    async fn lookup(&self, kid: &str) -> Lookup {
        let cache = self.cache.read().await;
        let Some(cached) = cache.as_ref() else {
            return Lookup::Stale;
        };
        if cached.expires_at <= Instant::now() {
            return Lookup::Stale;
        }
        if let Some(key) = cached.keys.get(kid) {
            tracing::debug!(target: "common.jwks", "JWKS cache hit");
            return Lookup::Hit(key.clone());
        }
        if cached.fetched_at.elapsed() < self.min_refresh_interval {
            tracing::debug!(target: "common.jwks", "Unknown kid, refetch suppressed");
            return Lookup::RecentMiss;
        }
        tracing::debug!(target: "common.jwks", "Key not in cache, refetching");
        Lookup::Stale
    }

    #[instrument(skip(self))]
    async fn refresh_cache(&self) -> Result<(), JwksError> {
        tracing::debug!(target: "common.jwks", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "common.jwks", error = %e, "Failed to fetch JWKS");
                JwksError::Unavailable
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "common.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(JwksError::Unavailable);
        }

        let jwks: Jwks = response.json().await.map_err(|e| {
            tracing::error!(target: "common.jwks", error = %e, "Failed to parse JWKS response");
            JwksError::Unavailable
        })?;

        let keys: HashMap<String, Jwk> = jwks
            .keys
            .into_iter()
            .map(|key| (key.kid.clone(), key))
            .collect();

        tracing::info!(target: "common.jwks", key_count = keys.len(), "JWKS cache refreshed");

        let now = Instant::now();
        let mut cache = self.cache.write().await;
        *cache = Some(CachedJwks {
            keys,
            fetched_at: now,
            expires_at: now + self.cache_ttl,
        });

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PRIMARY_JWKS: &str = include_str!("../../auth-test-utils/fixtures/primary_jwks.json");
    const OTHER_JWKS: &str = include_str!("../../auth-test-utils/fixtures/other_jwks.json");
    const PRIMARY_KID: &str = "Iie9XEmZmJz8JrU_A6-klQFx0kCqf3IvnPL1nQgTdrk";
    const OTHER_KID: &str = "-jlh_NWCefGIzffDGbAmMcpDa05XaSlYHp15L65gmxA";

    fn primary() -> Jwk {
        let jwks: Jwks = serde_json::from_str(PRIMARY_JWKS).unwrap();
        jwks.keys[0].clone()
    }

    async fn serve(body: &str, expected_calls: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json"))
            .expect(expected_calls)
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_jwk_serializes_use_field() {
        let jwk = Jwk::rsa_signing_key("k1", "bW9k".to_string(), "AQAB".to_string());
        let json = serde_json::to_value(&jwk).unwrap();

        assert_eq!(json["kty"], "RSA");
        assert_eq!(json["use"], "sig");
        assert_eq!(json["alg"], "RS256");
        assert!(json.get("key_use").is_none());
    }

    #[test]
    fn test_fixture_kid_is_rfc7638_thumbprint() {
        let jwk = primary();
        assert_eq!(rsa_thumbprint(&jwk.n, &jwk.e), PRIMARY_KID);
        assert_eq!(jwk.kid, PRIMARY_KID);
    }

    #[test]
    fn test_decoding_key_accepts_rsa() {
        assert!(primary().decoding_key().is_ok());
    }

    #[test]
    fn test_decoding_key_rejects_non_rsa() {
        let mut jwk = primary();
        jwk.kty = "OKP".to_string();
        assert!(matches!(jwk.decoding_key(), Err(JwksError::UnsupportedKey)));

        let mut jwk = primary();
        jwk.alg = Some("HS256".to_string());
        assert!(matches!(jwk.decoding_key(), Err(JwksError::UnsupportedKey)));

        let mut jwk = primary();
        jwk.n = String::new();
        assert!(matches!(jwk.decoding_key(), Err(JwksError::UnsupportedKey)));

        let mut jwk = primary();
        jwk.e = "!!".to_string();
        assert!(matches!(jwk.decoding_key(), Err(JwksError::UnsupportedKey)));
    }

    #[tokio::test]
    async fn test_get_key_fetches_then_caches() {
        let server = serve(PRIMARY_JWKS, 1).await;
        let client = JwksClient::new(format!("{}/.well-known/jwks.json", server.uri()));

        let first = client.get_key(PRIMARY_KID).await.unwrap();
        let second = client.get_key(PRIMARY_KID).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.kid, PRIMARY_KID);
    }

    #[tokio::test]
    async fn test_get_key_unknown_kid_within_interval_does_not_refetch() {
        let server = serve(PRIMARY_JWKS, 1).await;
        let client = JwksClient::new(format!("{}/.well-known/jwks.json", server.uri()));

        client.get_key(PRIMARY_KID).await.unwrap();
        let err = client.get_key(OTHER_KID).await.unwrap_err();

        assert_eq!(err, JwksError::KeyNotFound);
    }

    #[tokio::test]
    async fn test_get_key_unknown_kid_refetches_after_interval() {
        let server = serve(PRIMARY_JWKS, 2).await;
        let client = JwksClient::new(format!("{}/.well-known/jwks.json", server.uri()))
            .with_refresh_interval(Duration::ZERO);

        client.get_key(PRIMARY_KID).await.unwrap();
        let err = client.get_key(OTHER_KID).await.unwrap_err();

        assert_eq!(err, JwksError::KeyNotFound);
    }

    #[tokio::test]
    async fn test_get_key_many_unknown_kids_fetch_once() {
        let server = serve(PRIMARY_JWKS, 1).await;
        let client = JwksClient::new(format!("{}/.well-known/jwks.json", server.uri()));

        client.get_key(PRIMARY_KID).await.unwrap();
        for i in 0..20 {
            let err = client.get_key(&format!("forged-{i}")).await.unwrap_err();
            assert_eq!(err, JwksError::KeyNotFound);
        }
    }

    #[tokio::test]
    async fn test_get_key_concurrent_callers_share_one_fetch() {
        let server = serve(PRIMARY_JWKS, 1).await;
        let client = JwksClient::new(format!("{}/.well-known/jwks.json", server.uri()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let client = client.clone();
            let kid = if i % 2 == 0 {
                PRIMARY_KID.to_string()
            } else {
                format!("forged-{i}")
            };
            handles.push(tokio::spawn(async move { client.get_key(&kid).await }));
        }

        for (i, handle) in handles.into_iter().enumerate() {
            let result = handle.await.unwrap();
            if i % 2 == 0 {
                assert_eq!(result.unwrap().kid, PRIMARY_KID);
            } else {
                assert_eq!(result.unwrap_err(), JwksError::KeyNotFound);
            }
        }
    }

    #[tokio::test]
    async fn test_get_key_expired_cache_refetches() {
        let server = serve(OTHER_JWKS, 2).await;
        let client = JwksClient::with_ttl(
            format!("{}/.well-known/jwks.json", server.uri()),
            Duration::from_millis(0),
        );

        client.get_key(OTHER_KID).await.unwrap();
        client.get_key(OTHER_KID).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_key_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let client = JwksClient::new(format!("{}/.well-known/jwks.json", server.uri()));

        assert_eq!(
            client.get_key(PRIMARY_KID).await.unwrap_err(),
            JwksError::Unavailable
        );
    }

    #[tokio::test]
    async fn test_get_key_invalid_body_is_unavailable() {
        let server = serve("not json", 1).await;
        let client = JwksClient::new(format!("{}/.well-known/jwks.json", server.uri()));

        assert_eq!(
            client.force_refresh().await.unwrap_err(),
            JwksError::Unavailable
        );
    }
}
