//! Token model and verification shared by issuers and verifiers.
//!
//! This module provides:
//! - The closed [`Role`] enumeration carried in every token
//! - [`Claims`], the signed payload `{sub, role, iss, iat, exp, ..extra}`
//! - [`verify_token`], the only way to obtain [`ValidatedClaims`]
//! - Size limits and clock skew constants
//! - Key ID extraction from token headers
//!
//! # Verification order
//!
//! [`verify_token`] runs its checks in a fixed order and stops at the first
//! failure:
//!
//! 1. Structure (size, three segments, decodable header)
//! 2. Signature (RS256 only, against the caller-supplied public key)
//! 3. Expiry (`exp`)
//! 4. `iat` clock skew, issuer, role
//!
//! No claim is read before step 2 succeeds, and claims are only reachable
//! through a [`ValidatedClaims`] value, so there is no way to "peek" at a
//! subject or role on an unverified token.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only RS256 is accepted; a header naming any other algorithm is treated
//!   as a signature failure
//! - Error messages are classifications only and never echo token content
//! - `sub` is redacted in Debug output

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed token size in bytes (8KB).
///
/// Tokens larger than this are rejected before any base64 decoding or
/// cryptographic work. A 2048-bit RS256 token with the standard claim set is
/// roughly 600 bytes.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default clock skew tolerance for the `iat` claim (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum configurable clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// The single signing algorithm issued and accepted.
pub const TOKEN_ALGORITHM: Algorithm = Algorithm::RS256;

/// Claim names owned by the issuer. Extra claims may not reuse them.
pub const RESERVED_CLAIMS: [&str; 5] = ["sub", "role", "iss", "iat", "exp"];

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during token validation.
///
/// Display strings are deliberately short classifications. Details useful for
/// troubleshooting are logged at debug level without token content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("The access token is malformed")]
    TokenTooLarge,

    /// Token is not a structurally valid compact JWS.
    #[error("The access token is malformed")]
    MalformedToken,

    /// Token header carries no usable `kid`.
    #[error("The access token is malformed")]
    MissingKid,

    /// Signature does not verify against the expected public key.
    #[error("The access token signature is invalid")]
    InvalidSignature,

    /// `exp` is at or before the current time.
    #[error("The access token has expired")]
    Expired,

    /// `iat` is further in the future than the clock skew allows.
    #[error("The access token is not yet valid")]
    IatTooFarInFuture,

    /// `iss` does not name the expected signing authority.
    #[error("The access token was issued by an unknown authority")]
    InvalidIssuer,

    /// `role` is not one of the known roles.
    #[error("The access token carries an unknown role")]
    UnknownRole,

    /// The public key needed for verification could not be obtained.
    #[error("The token verification key is unavailable")]
    KeyUnavailable,
}

impl JwtValidationError {
    /// Bounded classification label for logs and metrics.
    #[must_use]
    pub fn classification(&self) -> &'static str {
        match self {
            Self::TokenTooLarge | Self::MalformedToken | Self::MissingKid => "malformed",
            Self::InvalidSignature => "invalid_signature",
            Self::Expired => "expired",
            Self::IatTooFarInFuture | Self::InvalidIssuer | Self::UnknownRole => "invalid_claims",
            Self::KeyUnavailable => "key_unavailable",
        }
    }
}

/// A role string that is not one of [`Role::ALL`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

// =============================================================================
// Role
// =============================================================================

/// Closed set of roles a token can carry.
///
/// Parsing is case-insensitive; the wire form is upper case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Can view their own records.
    Patient,
    /// Can create and update clinical records.
    Doctor,
    /// Can manage users and system settings.
    Admin,
}

impl Role {
    /// Every role, in declaration order.
    pub const ALL: [Role; 3] = [Role::Patient, Role::Doctor, Role::Admin];

    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "PATIENT",
            Role::Doctor => "DOCTOR",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PATIENT" => Ok(Role::Patient),
            "DOCTOR" => Ok(Role::Doctor),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

// =============================================================================
// Claims Types
// =============================================================================

/// Token payload as signed by the issuer.
///
/// # Fields
///
/// - `sub`: Subject (username)
/// - `role`: Caller role
/// - `iss`: Issuer URI of the signing authority
/// - `iat`: Issued-at timestamp (Unix epoch seconds)
/// - `exp`: Expiration timestamp (Unix epoch seconds)
/// - `extra`: Optional non-reserved claims, flattened into the payload
#[derive(Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - redacted in Debug output.
    pub sub: String,

    /// Role of the subject.
    pub role: Role,

    /// Issuer URI.
    pub iss: String,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Additional claims supplied at issuance.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("role", &self.role)
            .field("iss", &self.iss)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Payload shape used while verifying. `role` stays a string so an unknown
/// role surfaces as [`JwtValidationError::UnknownRole`] instead of a parse
/// failure.
#[derive(Deserialize)]
struct RawClaims {
    sub: String,
    role: String,
    iss: String,
    iat: i64,
    exp: i64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Claims of a token whose signature, expiry and claim checks all passed.
///
/// Only [`verify_token`] constructs this type. The accessors are pure
/// projections.
#[derive(Clone)]
pub struct ValidatedClaims {
    subject: String,
    role: Role,
    issuer: String,
    issued_at: i64,
    expires_at: i64,
    extra: Map<String, Value>,
}

impl ValidatedClaims {
    /// Subject identity.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Role claim.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Issuer claim.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Issued-at (Unix epoch seconds).
    #[must_use]
    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    /// Expiry (Unix epoch seconds).
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Non-reserved claims.
    #[must_use]
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

impl fmt::Debug for ValidatedClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedClaims")
            .field("subject", &"[REDACTED]")
            .field("role", &self.role)
            .field("issuer", &self.issuer)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// What a verifier expects of a token beyond a good signature.
#[derive(Debug, Clone)]
pub struct TokenExpectations {
    /// Required `iss` value. `None` accepts any issuer.
    pub issuer: Option<String>,

    /// Tolerance for `iat` in the future.
    pub clock_skew: Duration,
}

impl TokenExpectations {
    /// Expect tokens from `issuer`.
    pub fn new(issuer: impl Into<String>, clock_skew: Duration) -> Self {
        Self {
            issuer: Some(issuer.into()),
            clock_skew,
        }
    }
}

impl Default for TokenExpectations {
    fn default() -> Self {
        Self {
            issuer: None,
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Structurally parse a token and return its header.
///
/// Checks size, that there are exactly three non-empty segments, and that the
/// header segment decodes to a JWS header. The payload is NOT inspected.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - Wrong segment count, empty segment, bad header
pub fn parse_header(token: &str) -> Result<Header, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        tracing::debug!(
            target: "common.jwt",
            segments = segments.len(),
            "Token rejected: invalid compact serialization"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    decode_header(token).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Token rejected: undecodable header");
        JwtValidationError::MalformedToken
    })
}

/// Extract the `kid` (key ID) from a token header without verifying it.
///
/// Used by remote verifiers to pick the right key out of a discovery
/// document. The token MUST still be passed to [`verify_token`].
///
/// # Errors
///
/// - `TokenTooLarge` / `MalformedToken` - see [`parse_header`]
/// - `MissingKid` - header has no non-empty `kid`
pub fn extract_kid(token: &str) -> Result<String, JwtValidationError> {
    parse_header(token)?
        .kid
        .filter(|kid| !kid.is_empty())
        .ok_or(JwtValidationError::MissingKid)
}

/// Verify a token and return its claims.
///
/// # Arguments
///
/// * `token` - Compact serialized token
/// * `key` - RSA public key of the issuer
/// * `expectations` - Issuer and clock skew requirements
/// * `now` - Current time (Unix epoch seconds)
///
/// # Errors
///
/// Returns the first failing check in the order documented at module level.
pub fn verify_token(
    token: &str,
    key: &DecodingKey,
    expectations: &TokenExpectations,
    now: i64,
) -> Result<ValidatedClaims, JwtValidationError> {
    // 1. Structure
    let header = parse_header(token)?;

    // 2. Signature
    if header.alg != TOKEN_ALGORITHM {
        tracing::debug!(
            target: "common.jwt",
            alg = ?header.alg,
            "Token rejected: unsupported signing algorithm"
        );
        return Err(JwtValidationError::InvalidSignature);
    }
    let raw = verify_signature(token, key)?;

    // 3. Expiry
    if now >= raw.exp {
        tracing::debug!(
            target: "common.jwt",
            exp = raw.exp,
            now = now,
            "Token rejected: expired"
        );
        return Err(JwtValidationError::Expired);
    }

    // 4. Remaining claim checks
    validate_iat_at(raw.iat, expectations.clock_skew, now)?;

    if let Some(expected) = expectations.issuer.as_deref() {
        if raw.iss != expected {
            tracing::debug!(target: "common.jwt", iss = %raw.iss, "Token rejected: unexpected issuer");
            return Err(JwtValidationError::InvalidIssuer);
        }
    }

    let role = raw.role.parse::<Role>().map_err(|_| {
        tracing::debug!(target: "common.jwt", "Token rejected: unknown role");
        JwtValidationError::UnknownRole
    })?;

    Ok(ValidatedClaims {
        subject: raw.sub,
        role,
        issuer: raw.iss,
        issued_at: raw.iat,
        expires_at: raw.exp,
        extra: raw.extra,
    })
}

/// Check the signature and decode the payload. Time-based checks are left to
/// the caller so that their ordering is explicit.
fn verify_signature(token: &str, key: &DecodingKey) -> Result<RawClaims, JwtValidationError> {
    let mut validation = Validation::new(TOKEN_ALGORITHM);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<RawClaims>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            // Only reachable once the signature has verified: the signed
            // payload is not a claim set we understand.
            ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                tracing::debug!(target: "common.jwt", "Token rejected: signed payload is not a claim set");
                JwtValidationError::MalformedToken
            }
            _ => {
                tracing::debug!(target: "common.jwt", error = %e, "Token rejected: signature verification failed");
                JwtValidationError::InvalidSignature
            }
        })
}

/// Validate the `iat` claim against the current wall clock.
///
/// # Errors
///
/// Returns `IatTooFarInFuture` if `iat` is more than `clock_skew` ahead.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    validate_iat_at(iat, clock_skew, chrono::Utc::now().timestamp())
}

/// Deterministic `iat` validation against an explicit `now`.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW by configuration
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

/// Encode an unsigned big-endian integer as base64url without padding,
/// stripping leading zero bytes (RFC 7518 §6.3.1).
#[must_use]
pub fn encode_unsigned_be(bytes: &[u8]) -> String {
    let first_non_zero = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    let trimmed = bytes.get(first_non_zero..).unwrap_or_default();
    if trimmed.is_empty() {
        return URL_SAFE_NO_PAD.encode([0u8]);
    }
    URL_SAFE_NO_PAD.encode(trimmed)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::cast_possible_wrap,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey};

    const PRIVATE_PEM: &str =
        include_str!("../../auth-test-utils/fixtures/primary_private_pkcs1.pem");
    const PUBLIC_PEM: &str = include_str!("../../auth-test-utils/fixtures/primary_public.pem");
    const OTHER_PUBLIC_PEM: &str =
        include_str!("../../auth-test-utils/fixtures/other_public.pem");

    const ISSUER: &str = "http://localhost:4002/auth";
    const NOW: i64 = 1_700_000_000;

    fn claims(role: &str, iat: i64, exp: i64) -> serde_json::Value {
        serde_json::json!({
            "sub": "dr.grey",
            "role": role,
            "iss": ISSUER,
            "iat": iat,
            "exp": exp,
        })
    }

    fn sign(payload: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("test-key".to_string());
        let key = EncodingKey::from_rsa_pem(PRIVATE_PEM.as_bytes()).unwrap();
        encode(&header, payload, &key).unwrap()
    }

    fn public_key() -> DecodingKey {
        DecodingKey::from_rsa_pem(PUBLIC_PEM.as_bytes()).unwrap()
    }

    fn expectations() -> TokenExpectations {
        TokenExpectations::new(ISSUER, DEFAULT_CLOCK_SKEW)
    }

    // -------------------------------------------------------------------------
    // Role Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_role_parse_is_case_insensitive() {
        assert_eq!("doctor".parse::<Role>().unwrap(), Role::Doctor);
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("PATIENT".parse::<Role>().unwrap(), Role::Patient);
    }

    #[test]
    fn test_role_parse_rejects_unknown() {
        let err = "NURSE".parse::<Role>().unwrap_err();
        assert_eq!(err, UnknownRole("NURSE".to_string()));
    }

    #[test]
    fn test_role_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&Role::Doctor).unwrap(), "\"DOCTOR\"");
        assert_eq!(Role::Admin.to_string(), "ADMIN");
    }

    // -------------------------------------------------------------------------
    // Claims Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_claims_debug_redacts_sub() {
        let claims = Claims {
            sub: "secret-username".to_string(),
            role: Role::Patient,
            iss: ISSUER.to_string(),
            iat: NOW,
            exp: NOW + 60,
            extra: Map::new(),
        };

        let debug_str = format!("{claims:?}");
        assert!(!debug_str.contains("secret-username"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_claims_flatten_extra() {
        let mut extra = Map::new();
        extra.insert("user_id".to_string(), Value::from("42"));
        let claims = Claims {
            sub: "alice".to_string(),
            role: Role::Patient,
            iss: ISSUER.to_string(),
            iat: NOW,
            exp: NOW + 60,
            extra,
        };

        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["user_id"], "42");
        assert_eq!(json["role"], "PATIENT");
        assert!(json.get("extra").is_none());
    }

    // -------------------------------------------------------------------------
    // parse_header / extract_kid Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_extract_kid_valid_token() {
        let token = sign(&claims("DOCTOR", NOW, NOW + 60));
        assert_eq!(extract_kid(&token).unwrap(), "test-key");
    }

    #[test]
    fn test_extract_kid_missing_kid() {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
        let token = format!("{header}.payload.signature");
        assert_eq!(extract_kid(&token), Err(JwtValidationError::MissingKid));
    }

    #[test]
    fn test_parse_header_rejects_wrong_segment_count() {
        for token in ["", "single", "only.two", "a.b.c.d", "a..c"] {
            assert_eq!(
                parse_header(token).unwrap_err(),
                JwtValidationError::MalformedToken,
                "token {token:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_parse_header_rejects_bad_header_encoding() {
        assert_eq!(
            parse_header("!!!invalid!!!.payload.signature").unwrap_err(),
            JwtValidationError::MalformedToken
        );
        let not_json = URL_SAFE_NO_PAD.encode("not-json");
        assert_eq!(
            parse_header(&format!("{not_json}.payload.signature")).unwrap_err(),
            JwtValidationError::MalformedToken
        );
    }

    #[test]
    fn test_parse_header_rejects_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(
            parse_header(&oversized).unwrap_err(),
            JwtValidationError::TokenTooLarge
        );
    }

    // -------------------------------------------------------------------------
    // verify_token Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_verify_token_happy_path() {
        let token = sign(&claims("DOCTOR", NOW, NOW + 3600));
        let validated = verify_token(&token, &public_key(), &expectations(), NOW).unwrap();

        assert_eq!(validated.subject(), "dr.grey");
        assert_eq!(validated.role(), Role::Doctor);
        assert_eq!(validated.issuer(), ISSUER);
        assert_eq!(validated.expires_at(), NOW + 3600);
    }

    #[test]
    fn test_verify_token_wrong_key_is_invalid_signature() {
        let token = sign(&claims("DOCTOR", NOW, NOW + 3600));
        let other = DecodingKey::from_rsa_pem(OTHER_PUBLIC_PEM.as_bytes()).unwrap();

        let err = verify_token(&token, &other, &expectations(), NOW).unwrap_err();
        assert_eq!(err, JwtValidationError::InvalidSignature);
    }

    #[test]
    fn test_verify_token_checks_signature_before_expiry() {
        // Expired AND signed by a different key: signature failure wins
        let token = sign(&claims("DOCTOR", NOW - 7200, NOW - 3600));
        let other = DecodingKey::from_rsa_pem(OTHER_PUBLIC_PEM.as_bytes()).unwrap();

        let err = verify_token(&token, &other, &expectations(), NOW).unwrap_err();
        assert_eq!(err, JwtValidationError::InvalidSignature);
    }

    #[test]
    fn test_verify_token_expired() {
        let token = sign(&claims("DOCTOR", NOW - 7200, NOW - 1));
        let err = verify_token(&token, &public_key(), &expectations(), NOW).unwrap_err();
        assert_eq!(err, JwtValidationError::Expired);
    }

    #[test]
    fn test_verify_token_expires_exactly_at_exp() {
        let token = sign(&claims("DOCTOR", NOW - 60, NOW));
        let err = verify_token(&token, &public_key(), &expectations(), NOW).unwrap_err();
        assert_eq!(err, JwtValidationError::Expired);

        assert!(verify_token(&token, &public_key(), &expectations(), NOW - 1).is_ok());
    }

    #[test]
    fn test_verify_token_rejects_unknown_issuer() {
        let mut payload = claims("DOCTOR", NOW, NOW + 60);
        payload["iss"] = Value::from("https://evil.example");
        let token = sign(&payload);

        let err = verify_token(&token, &public_key(), &expectations(), NOW).unwrap_err();
        assert_eq!(err, JwtValidationError::InvalidIssuer);

        // Without an issuer expectation the same token is accepted
        let any_issuer = TokenExpectations::default();
        assert!(verify_token(&token, &public_key(), &any_issuer, NOW).is_ok());
    }

    #[test]
    fn test_verify_token_rejects_unknown_role() {
        let token = sign(&claims("NURSE", NOW, NOW + 60));
        let err = verify_token(&token, &public_key(), &expectations(), NOW).unwrap_err();
        assert_eq!(err, JwtValidationError::UnknownRole);
    }

    #[test]
    fn test_verify_token_rejects_future_iat() {
        let token = sign(&claims("DOCTOR", NOW + 3600, NOW + 7200));
        let err = verify_token(&token, &public_key(), &expectations(), NOW).unwrap_err();
        assert_eq!(err, JwtValidationError::IatTooFarInFuture);
    }

    #[test]
    fn test_verify_token_missing_claim_is_malformed() {
        let token = sign(&serde_json::json!({"sub": "x", "iss": ISSUER, "iat": NOW, "exp": NOW + 60}));
        let err = verify_token(&token, &public_key(), &expectations(), NOW).unwrap_err();
        assert_eq!(err, JwtValidationError::MalformedToken);
    }

    #[test]
    fn test_verify_token_rejects_alg_none() {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims("ADMIN", NOW, NOW + 60).to_string());
        let token = format!("{header}.{payload}.AAAA");

        let err = verify_token(&token, &public_key(), &expectations(), NOW).unwrap_err();
        assert!(
            matches!(
                err,
                JwtValidationError::MalformedToken | JwtValidationError::InvalidSignature
            ),
            "alg=none must never verify, got {err:?}"
        );
    }

    #[test]
    fn test_verify_token_rejects_hs256_header() {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims("ADMIN", NOW, NOW + 60).to_string());
        let token = format!("{header}.{payload}.c2lnbmF0dXJl");

        let err = verify_token(&token, &public_key(), &expectations(), NOW).unwrap_err();
        assert_eq!(err, JwtValidationError::InvalidSignature);
    }

    #[test]
    fn test_verify_token_tampered_payload_is_invalid_signature() {
        let token = sign(&claims("PATIENT", NOW, NOW + 60));
        let parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(claims("ADMIN", NOW, NOW + 60).to_string());
        let tampered = format!("{}.{}.{}", parts[0], forged, parts[2]);

        let err = verify_token(&tampered, &public_key(), &expectations(), NOW).unwrap_err();
        assert_eq!(err, JwtValidationError::InvalidSignature);
    }

    // -------------------------------------------------------------------------
    // validate_iat Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_iat_at_boundary_exact() {
        assert!(validate_iat_at(NOW + 300, DEFAULT_CLOCK_SKEW, NOW).is_ok());
        assert_eq!(
            validate_iat_at(NOW + 301, DEFAULT_CLOCK_SKEW, NOW),
            Err(JwtValidationError::IatTooFarInFuture)
        );
    }

    #[test]
    fn test_validate_iat_past_time() {
        let past = chrono::Utc::now().timestamp() - 3600;
        assert!(validate_iat(past, DEFAULT_CLOCK_SKEW).is_ok());
    }

    // -------------------------------------------------------------------------
    // Misc
    // -------------------------------------------------------------------------

    #[test]
    fn test_classification_labels_are_bounded() {
        assert_eq!(JwtValidationError::TokenTooLarge.classification(), "malformed");
        assert_eq!(JwtValidationError::MissingKid.classification(), "malformed");
        assert_eq!(
            JwtValidationError::InvalidSignature.classification(),
            "invalid_signature"
        );
        assert_eq!(JwtValidationError::Expired.classification(), "expired");
        assert_eq!(JwtValidationError::UnknownRole.classification(), "invalid_claims");
    }

    #[test]
    fn test_encode_unsigned_be_strips_leading_zeros() {
        assert_eq!(encode_unsigned_be(&[0x00, 0x01, 0x00, 0x01]), "AQAB");
        assert_eq!(encode_unsigned_be(&[0x01, 0x00, 0x01]), "AQAB");
        assert_eq!(encode_unsigned_be(&[]), "AA");
    }
}
