//! Builder for test tokens
//!
//! Signs arbitrary claims with a fixture key, including tokens the service
//! would refuse to issue: already expired, future `iat`, unknown roles,
//! foreign issuers or missing `kid`.

use crate::crypto_fixtures::{primary_encoding_key, PRIMARY_KID};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Issuer used by [`TestAuthServer`](crate::TestAuthServer).
pub const TEST_ISSUER: &str = "http://auth.test/auth";

/// Builder for signed test tokens
///
/// # Example
/// ```rust,ignore
/// let expired = TestTokenBuilder::new()
///     .for_user("dr.grey")
///     .with_role("DOCTOR")
///     .expired()
///     .sign_primary();
/// ```
pub struct TestTokenBuilder {
    sub: String,
    role: String,
    iss: String,
    iat: i64,
    exp: i64,
    kid: Option<String>,
    extra: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a builder: PATIENT token for `test-subject`, valid for an hour.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-subject".to_string(),
            role: "PATIENT".to_string(),
            iss: TEST_ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(3600)).timestamp(),
            kid: Some(PRIMARY_KID.to_string()),
            extra: Map::new(),
        }
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the role claim verbatim (may be a role the service does not know)
    pub fn with_role(mut self, role: &str) -> Self {
        self.role = role.to_string();
        self
    }

    /// Set the issuer
    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.iss = issuer.to_string();
        self
    }

    /// Set expiration in seconds from now (negative for the past)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Expired one minute ago, issued an hour before that
    pub fn expired(mut self) -> Self {
        let now = Utc::now();
        self.iat = (now - Duration::seconds(3660)).timestamp();
        self.exp = (now - Duration::seconds(60)).timestamp();
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Set the `kid` header
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = Some(kid.to_string());
        self
    }

    /// Omit the `kid` header
    pub fn without_kid(mut self) -> Self {
        self.kid = None;
        self
    }

    /// Add a non-reserved claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build_claims(&self) -> Value {
        let mut claims = self.extra.clone();
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("role".to_string(), json!(self.role));
        claims.insert("iss".to_string(), json!(self.iss));
        claims.insert("iat".to_string(), json!(self.iat));
        claims.insert("exp".to_string(), json!(self.exp));
        Value::Object(claims)
    }

    /// Sign with RS256 using `key`
    pub fn sign(&self, key: &EncodingKey) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("JWT".to_string());
        header.kid = self.kid.clone();
        encode(&header, &self.build_claims(), key).expect("test token should sign")
    }

    /// Sign with the primary fixture key
    pub fn sign_primary(&self) -> String {
        self.sign(&primary_encoding_key())
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Flip one character of the signature segment.
pub fn tamper_signature(token: &str) -> String {
    let (signed, signature) = token.rsplit_once('.').expect("token should have a signature");
    let mut chars: Vec<char> = signature.chars().collect();
    let first = chars.first_mut().expect("signature should not be empty");
    *first = if *first == 'A' { 'B' } else { 'A' };
    format!("{signed}.{}", chars.into_iter().collect::<String>())
}

/// Decoded signature bytes of a token.
pub fn signature_bytes(token: &str) -> Vec<u8> {
    let (_, signature) = token.rsplit_once('.').expect("token should have a signature");
    URL_SAFE_NO_PAD
        .decode(signature)
        .expect("signature should be base64url")
}

/// Invert the bits of one decoded signature byte and re-encode the token.
pub fn flip_signature_byte(token: &str, index: usize) -> String {
    let (signed, _) = token.rsplit_once('.').expect("token should have a signature");
    let mut bytes = signature_bytes(token);
    let byte = bytes.get_mut(index).expect("index should be inside the signature");
    *byte ^= 0xFF;
    format!("{signed}.{}", URL_SAFE_NO_PAD.encode(bytes))
}
