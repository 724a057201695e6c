//! RSA key material and password hashing.
//!
//! [`KeyProvider`] loads the token signing key pair from PEM files on first
//! use and keeps it for the lifetime of the provider. Each key sits in a
//! `OnceCell`, so concurrent first callers perform a single load and later
//! reads take no lock.
//!
//! Accepted encodings:
//! - `PRIVATE KEY` (PKCS#8) and `RSA PRIVATE KEY` (PKCS#1)
//! - `PUBLIC KEY` (SPKI) and `RSA PUBLIC KEY` (PKCS#1)
//!
//! Passphrase-protected keys (`ENCRYPTED PRIVATE KEY`) are refused. Keys with
//! a modulus under 2048 bits are rejected. Key material is never
//! printed by `Debug` and never logged.

use crate::config::{Config, MAX_BCRYPT_COST, MIN_BCRYPT_COST};
use common::jwks::{rsa_thumbprint, Jwk};
use common::jwt::encode_unsigned_be;
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{DecodingKey, EncodingKey};
use once_cell::sync::OnceCell;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{
    DecodePrivateKey, DecodePublicKey, Document, PrivateKeyInfo, SecretDocument,
    SubjectPublicKeyInfoRef,
};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::instrument;

/// Minimum RSA modulus size in bits.
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// Errors from loading the signing key pair.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyLoadError {
    #[error("Key file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("Key file could not be read: {}", .0.display())]
    Unreadable(PathBuf),

    #[error("Key file is not valid PEM: {}", .0.display())]
    InvalidPem(PathBuf),

    #[error("Key file is passphrase protected: {}", .0.display())]
    Encrypted(PathBuf),

    #[error("Key file does not hold an RSA key: {}", .0.display())]
    NotRsa(PathBuf),

    #[error("RSA key is {bits} bits, at least {} required: {}", MIN_RSA_KEY_BITS, .path.display())]
    KeyTooSmall { path: PathBuf, bits: usize },

    #[error("Private and public keys do not form a pair")]
    KeyPairMismatch,
}

/// Token signing key.
pub struct PrivateKey {
    encoding_key: EncodingKey,
    key_id: String,
    n: String,
    e: String,
}

impl PrivateKey {
    /// Key usable for RS256 signing.
    #[must_use]
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// `kid` placed in the header of every issued token.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key_id", &self.key_id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Token verification key.
#[derive(Clone)]
pub struct PublicKey {
    decoding_key: DecodingKey,
    key_id: String,
    n: String,
    e: String,
}

impl PublicKey {
    /// Key usable for RS256 verification.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// `kid` published for this key.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Public components as a discovery-document entry.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        Jwk::rsa_signing_key(self.key_id.clone(), self.n.clone(), self.e.clone())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Owner of the signing key pair.
pub struct KeyProvider {
    private_key_path: PathBuf,
    public_key_path: PathBuf,
    key_id: Option<String>,
    private_key: OnceCell<PrivateKey>,
    public_key: OnceCell<PublicKey>,
}

impl KeyProvider {
    /// Create a provider. No file is read until a key is first requested.
    pub fn new(
        private_key_path: impl Into<PathBuf>,
        public_key_path: impl Into<PathBuf>,
        key_id: Option<String>,
    ) -> Self {
        Self {
            private_key_path: private_key_path.into(),
            public_key_path: public_key_path.into(),
            key_id,
            private_key: OnceCell::new(),
            public_key: OnceCell::new(),
        }
    }

    /// Create a provider for the configured key files.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.private_key_path.clone(),
            config.public_key_path.clone(),
            config.key_id.clone(),
        )
    }

    /// Signing key, loaded on first call.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyLoadError`] describing why the file could not be used.
    /// A failed load is retried on the next call.
    pub fn load_private_key(&self) -> Result<&PrivateKey, KeyLoadError> {
        self.private_key
            .get_or_try_init(|| load_private_key(&self.private_key_path, self.key_id.as_deref()))
    }

    /// Verification key, loaded on first call.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyLoadError`] describing why the file could not be used.
    pub fn load_public_key(&self) -> Result<&PublicKey, KeyLoadError> {
        self.public_key
            .get_or_try_init(|| load_public_key(&self.public_key_path, self.key_id.as_deref()))
    }

    /// Load both keys and check they belong together.
    ///
    /// Called at startup so that a bad key stops the process before it
    /// accepts traffic.
    ///
    /// # Errors
    ///
    /// Any load error, or `KeyPairMismatch`.
    #[instrument(skip_all)]
    pub fn ensure_loaded(&self) -> Result<(), KeyLoadError> {
        let private = self.load_private_key()?;
        let public = self.load_public_key()?;

        if private.n != public.n || private.e != public.e {
            tracing::error!(target: "auth.crypto", "Configured private and public keys do not match");
            return Err(KeyLoadError::KeyPairMismatch);
        }

        tracing::info!(target: "auth.crypto", kid = %public.key_id, "Signing key pair loaded");
        Ok(())
    }

    /// Whether both keys have been loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.private_key.get().is_some() && self.public_key.get().is_some()
    }
}

impl fmt::Debug for KeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyProvider")
            .field("private_key_path", &self.private_key_path)
            .field("public_key_path", &self.public_key_path)
            .field("key_id", &self.key_id)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

// =============================================================================
// PEM loading
// =============================================================================

fn read_pem_file(path: &Path) -> Result<SecretString, KeyLoadError> {
    if !path.exists() {
        tracing::error!(target: "auth.crypto", path = %path.display(), "Key file not found");
        return Err(KeyLoadError::Missing(path.to_path_buf()));
    }
    std::fs::read_to_string(path)
        .map(SecretString::from)
        .map_err(|e| {
            tracing::error!(target: "auth.crypto", path = %path.display(), error = %e, "Key file unreadable");
            KeyLoadError::Unreadable(path.to_path_buf())
        })
}

fn invalid_pem(path: &Path) -> KeyLoadError {
    tracing::error!(target: "auth.crypto", path = %path.display(), "Key file is not a supported PEM key");
    KeyLoadError::InvalidPem(path.to_path_buf())
}

#[instrument(skip_all)]
fn load_private_key(path: &Path, key_id: Option<&str>) -> Result<PrivateKey, KeyLoadError> {
    let text = read_pem_file(path)?;
    let (label, document) =
        SecretDocument::from_pem(text.expose_secret()).map_err(|_| invalid_pem(path))?;
    let der = document.as_bytes();

    let key = match label {
        "PRIVATE KEY" => {
            let info = PrivateKeyInfo::try_from(der).map_err(|_| invalid_pem(path))?;
            if info.algorithm.oid != rsa::pkcs1::ALGORITHM_OID {
                return Err(not_rsa(path));
            }
            RsaPrivateKey::from_pkcs8_der(der).map_err(|_| invalid_pem(path))?
        }
        "RSA PRIVATE KEY" => RsaPrivateKey::from_pkcs1_der(der).map_err(|_| invalid_pem(path))?,
        "ENCRYPTED PRIVATE KEY" => {
            tracing::error!(target: "auth.crypto", path = %path.display(), "Private key is passphrase protected");
            return Err(KeyLoadError::Encrypted(path.to_path_buf()));
        }
        "EC PRIVATE KEY" | "DSA PRIVATE KEY" => return Err(not_rsa(path)),
        _ => return Err(invalid_pem(path)),
    };

    check_key_size(&key, path)?;
    let (n, e) = public_components(&key);
    let key_id = key_id.map_or_else(|| rsa_thumbprint(&n, &e), str::to_string);

    let pkcs1 = key.to_pkcs1_der().map_err(|_| invalid_pem(path))?;
    let encoding_key = EncodingKey::from_rsa_der(pkcs1.as_bytes());

    Ok(PrivateKey {
        encoding_key,
        key_id,
        n,
        e,
    })
}

#[instrument(skip_all)]
fn load_public_key(path: &Path, key_id: Option<&str>) -> Result<PublicKey, KeyLoadError> {
    let text = read_pem_file(path)?;
    let (label, document) =
        Document::from_pem(text.expose_secret()).map_err(|_| invalid_pem(path))?;
    let der = document.as_bytes();

    let key = match label {
        "PUBLIC KEY" => {
            let info = SubjectPublicKeyInfoRef::try_from(der).map_err(|_| invalid_pem(path))?;
            if info.algorithm.oid != rsa::pkcs1::ALGORITHM_OID {
                return Err(not_rsa(path));
            }
            RsaPublicKey::from_public_key_der(der).map_err(|_| invalid_pem(path))?
        }
        "RSA PUBLIC KEY" => RsaPublicKey::from_pkcs1_der(der).map_err(|_| invalid_pem(path))?,
        _ => return Err(invalid_pem(path)),
    };

    check_key_size(&key, path)?;
    let (n, e) = public_components(&key);
    let key_id = key_id.map_or_else(|| rsa_thumbprint(&n, &e), str::to_string);

    let decoding_key =
        DecodingKey::from_rsa_components(&n, &e).map_err(|_| invalid_pem(path))?;

    Ok(PublicKey {
        decoding_key,
        key_id,
        n,
        e,
    })
}

fn not_rsa(path: &Path) -> KeyLoadError {
    tracing::error!(target: "auth.crypto", path = %path.display(), "Key is not an RSA key");
    KeyLoadError::NotRsa(path.to_path_buf())
}

fn check_key_size(key: &impl PublicKeyParts, path: &Path) -> Result<(), KeyLoadError> {
    let bits = key.n().bits();
    if bits < MIN_RSA_KEY_BITS {
        tracing::error!(target: "auth.crypto", bits, "RSA key below minimum size");
        return Err(KeyLoadError::KeyTooSmall {
            path: path.to_path_buf(),
            bits,
        });
    }
    Ok(())
}

/// Base64url `(n, e)` as published in the discovery document.
fn public_components(key: &impl PublicKeyParts) -> (String, String) {
    (
        encode_unsigned_be(&key.n().to_bytes_be()),
        encode_unsigned_be(&key.e().to_bytes_be()),
    )
}

// =============================================================================
// Password hashing
// =============================================================================

/// Errors from password hashing.
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Invalid bcrypt cost: {0} (must be {}-{})", MIN_BCRYPT_COST, MAX_BCRYPT_COST)]
    InvalidCost(u32),

    #[error("Password hashing failed: {0}")]
    Hash(String),
}

/// Hash a password with bcrypt.
///
/// # Errors
///
/// `InvalidCost` if `cost` is outside the configured bounds.
#[instrument(skip_all)]
pub fn hash_password(password: &str, cost: u32) -> Result<String, PasswordError> {
    if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
        return Err(PasswordError::InvalidCost(cost));
    }
    bcrypt::hash(password, cost).map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Verify a password against a bcrypt hash.
///
/// # Errors
///
/// Returns an error if `hash` is not a bcrypt hash.
#[instrument(skip_all)]
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    bcrypt::verify(password, hash).map_err(|e| PasswordError::Hash(e.to_string()))
}
