//! Public key publication.
//!
//! Builds the discovery document remote verifiers fetch to check tokens
//! issued by this service.

use crate::crypto::{KeyLoadError, KeyProvider};
use common::jwks::Jwks;

/// Build the discovery document for the configured key pair.
///
/// Contains exactly one key: `kty=RSA`, `use=sig`, `alg=RS256`, the key's
/// `kid` and its base64url `n`/`e`. Output is identical on every call.
///
/// # Errors
///
/// Returns the public key's load error.
pub fn publish(keys: &KeyProvider) -> Result<Jwks, KeyLoadError> {
    let public = keys.load_public_key()?;
    Ok(Jwks {
        keys: vec![public.to_jwk()],
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::path::Path;

    fn keys(public: &str) -> KeyProvider {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../auth-test-utils/fixtures");
        KeyProvider::new(dir.join("primary_private.pem"), dir.join(public), None)
    }

    #[test]
    fn test_publish_matches_reference_document() {
        let expected: Jwks = serde_json::from_str(include_str!(
            "../../../auth-test-utils/fixtures/primary_jwks.json"
        ))
        .unwrap();

        assert_eq!(publish(&keys("primary_public.pem")).unwrap(), expected);
    }

    #[test]
    fn test_publish_is_deterministic() {
        let first = serde_json::to_string(&publish(&keys("primary_public.pem")).unwrap()).unwrap();
        let second = serde_json::to_string(&publish(&keys("primary_public.pem")).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_published_key_verifies() {
        let jwks = publish(&keys("primary_public.pem")).unwrap();
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].e, "AQAB");
        assert!(jwks.keys[0].decoding_key().is_ok());
    }

    #[test]
    fn test_publish_missing_key() {
        assert!(matches!(
            publish(&keys("missing.pem")),
            Err(KeyLoadError::Missing(_))
        ));
    }
}
