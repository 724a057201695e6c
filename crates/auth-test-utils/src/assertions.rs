//! Custom test assertions for expressive tests
//!
//! Decodes tokens without verifying them; signature checks belong to the
//! code under test.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;

/// JWT header structure
#[derive(Debug, Deserialize)]
struct JwtHeader {
    pub alg: String,
    pub typ: String,
    #[serde(default)]
    pub kid: Option<String>,
}

/// JWT claims structure
#[derive(Debug, Deserialize)]
struct JwtClaims {
    pub sub: String,
    pub role: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

fn segment(token: &str, index: usize) -> Vec<u8> {
    let part = token
        .split('.')
        .nth(index)
        .unwrap_or_else(|| panic!("JWT is missing segment {index}"));
    URL_SAFE_NO_PAD
        .decode(part)
        .unwrap_or_else(|e| panic!("Failed to base64 decode JWT segment {index}: {e}"))
}

fn header(token: &str) -> JwtHeader {
    serde_json::from_slice(&segment(token, 0)).expect("Failed to parse JWT header")
}

fn claims(token: &str) -> JwtClaims {
    serde_json::from_slice(&segment(token, 1)).expect("Failed to parse JWT claims")
}

/// Custom assertions for token strings
///
/// # Example
/// ```rust,ignore
/// token
///     .assert_valid_jwt()
///     .assert_for_subject("dr.grey")
///     .assert_has_role("DOCTOR")
///     .assert_signed_by(PRIMARY_KID);
/// ```
pub trait TokenAssertions {
    /// Assert the token is a three-part RS256 JWT with the standard claims
    fn assert_valid_jwt(&self) -> &Self;

    /// Assert the `role` claim
    fn assert_has_role(&self, role: &str) -> &Self;

    /// Assert the `kid` header
    fn assert_signed_by(&self, key_id: &str) -> &Self;

    /// Assert the token expires within `seconds` of now (5 s tolerance)
    fn assert_expires_in(&self, seconds: u64) -> &Self;

    /// Assert the `sub` claim
    fn assert_for_subject(&self, subject: &str) -> &Self;

    /// Assert the `iss` claim
    fn assert_issued_by(&self, issuer: &str) -> &Self;
}

impl TokenAssertions for str {
    fn assert_valid_jwt(&self) -> &Self {
        let parts = self.split('.').count();
        assert_eq!(
            parts, 3,
            "JWT must have 3 parts (header.payload.signature), got {parts}"
        );

        let header = header(self);
        assert_eq!(header.alg, "RS256", "Expected RS256 algorithm");
        assert_eq!(header.typ, "JWT", "Expected JWT type");
        assert!(header.kid.is_some(), "Expected a kid header");

        let claims = claims(self);
        assert!(
            claims.exp > claims.iat,
            "exp ({}) must be after iat ({})",
            claims.exp,
            claims.iat
        );

        self
    }

    fn assert_has_role(&self, role: &str) -> &Self {
        let claims = claims(self);
        assert_eq!(
            claims.role, role,
            "Expected role '{}', got '{}'",
            role, claims.role
        );
        self
    }

    fn assert_signed_by(&self, key_id: &str) -> &Self {
        let header = header(self);
        assert_eq!(
            header.kid.as_deref(),
            Some(key_id),
            "Expected key_id '{}', got {:?}",
            key_id,
            header.kid
        );
        self
    }

    fn assert_expires_in(&self, seconds: u64) -> &Self {
        let claims = claims(self);
        let expires_in = claims.exp - chrono::Utc::now().timestamp();

        assert!(
            (expires_in - seconds as i64).abs() <= 5,
            "Expected token to expire in {} seconds, but expires in {} seconds",
            seconds,
            expires_in
        );
        self
    }

    fn assert_for_subject(&self, subject: &str) -> &Self {
        let claims = claims(self);
        assert_eq!(
            claims.sub, subject,
            "Expected subject '{}', got '{}'",
            subject, claims.sub
        );
        self
    }

    fn assert_issued_by(&self, issuer: &str) -> &Self {
        let claims = claims(self);
        assert_eq!(
            claims.iss, issuer,
            "Expected issuer '{}', got '{}'",
            issuer, claims.iss
        );
        self
    }
}
