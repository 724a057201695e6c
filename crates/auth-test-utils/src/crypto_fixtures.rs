//! Fixed RSA key material for reproducible tests
//!
//! Keys live under `fixtures/` in this crate and never change, so `kid`
//! thumbprints and discovery documents can be asserted byte for byte.

use jsonwebtoken::EncodingKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use std::path::{Path, PathBuf};

/// RFC 7638 thumbprint of the primary key pair.
pub const PRIMARY_KID: &str = "Iie9XEmZmJz8JrU_A6-klQFx0kCqf3IvnPL1nQgTdrk";

/// RFC 7638 thumbprint of the unrelated key pair.
pub const OTHER_KID: &str = "-jlh_NWCefGIzffDGbAmMcpDa05XaSlYHp15L65gmxA";

/// Primary key pair, PKCS#8 private key.
pub const PRIMARY_PRIVATE_PEM: &str = include_str!("../fixtures/primary_private.pem");

/// Primary private key in PKCS#1 form.
pub const PRIMARY_PRIVATE_PKCS1_PEM: &str = include_str!("../fixtures/primary_private_pkcs1.pem");

pub const PRIMARY_PUBLIC_PEM: &str = include_str!("../fixtures/primary_public.pem");

/// A second 2048-bit pair unrelated to the primary one.
pub const OTHER_PRIVATE_PEM: &str = include_str!("../fixtures/other_private.pem");

pub const OTHER_PUBLIC_PEM: &str = include_str!("../fixtures/other_public.pem");

/// Discovery document for the primary public key.
pub const PRIMARY_JWKS_JSON: &str = include_str!("../fixtures/primary_jwks.json");

/// Discovery document for the unrelated public key.
pub const OTHER_JWKS_JSON: &str = include_str!("../fixtures/other_jwks.json");

/// Directory holding the PEM fixtures.
pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Absolute path of a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

/// `(private, public)` paths of the primary key pair.
pub fn primary_key_paths() -> (PathBuf, PathBuf) {
    (
        fixture_path("primary_private.pem"),
        fixture_path("primary_public.pem"),
    )
}

/// `(private, public)` paths of the unrelated key pair.
pub fn other_key_paths() -> (PathBuf, PathBuf) {
    (
        fixture_path("other_private.pem"),
        fixture_path("other_public.pem"),
    )
}

/// Signing key for the primary pair.
pub fn primary_encoding_key() -> EncodingKey {
    EncodingKey::from_rsa_pem(PRIMARY_PRIVATE_PKCS1_PEM.as_bytes())
        .expect("primary fixture key should parse")
}

/// Signing key for the unrelated pair.
pub fn other_encoding_key() -> EncodingKey {
    pkcs8_encoding_key(OTHER_PRIVATE_PEM)
}

/// Signing key from any PKCS#8 RSA private key PEM.
pub fn pkcs8_encoding_key(pem: &str) -> EncodingKey {
    let key = RsaPrivateKey::from_pkcs8_pem(pem).expect("fixture should be a PKCS#8 RSA key");
    let der = key.to_pkcs1_der().expect("RSA key should encode as PKCS#1");
    EncodingKey::from_rsa_der(der.as_bytes())
}
