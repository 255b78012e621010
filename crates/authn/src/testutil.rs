//! Shared test utilities for the exchange.
//!
//! Fixture keys, assertion signing, raw token crafting for attack tests, and
//! ready-made key directories. Feature-gated behind `testutil` so none of it
//! reaches production builds.
//!
//! ```toml
//! [dev-dependencies]
//! keyrelay-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use keyrelay_authn::testutil::{ALICE_PRIVATE_KEY, sign_assertion};
//! ```

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::{
    SigningKey,
    pkcs8::{EncodePrivateKey, EncodePublicKey, spki::der::pem::LineEnding},
};
use jsonwebtoken::{EncodingKey, Header};
use keyrelay_keydir::{KeyAlgorithm, MemoryKeyDirectory};
use rand_core::OsRng;
use zeroize::Zeroizing;

use crate::{keypair::ServiceKeyPair, validation::SigningAlgorithm};

/// RSA-2048 private key of the client `alice` (PKCS#8).
pub const ALICE_PRIVATE_KEY: &str = include_str!("../../../testdata/keys/alice.key");
/// Public half of [`ALICE_PRIVATE_KEY`] (SPKI).
pub const ALICE_PUBLIC_KEY: &str = include_str!("../../../testdata/keys/alice.key.pub");
/// RSA-2048 key never registered anywhere; signs forgeries.
pub const MALLORY_PRIVATE_KEY: &str = include_str!("../../../testdata/keys/mallory.key");
/// Public half of [`MALLORY_PRIVATE_KEY`].
pub const MALLORY_PUBLIC_KEY: &str = include_str!("../../../testdata/keys/mallory.key.pub");
/// Ed25519 private key of the client `carol` (PKCS#8).
pub const CAROL_PRIVATE_KEY: &str = include_str!("../../../testdata/keys/carol.key");
/// Public half of [`CAROL_PRIVATE_KEY`].
pub const CAROL_PUBLIC_KEY: &str = include_str!("../../../testdata/keys/carol.key.pub");
/// RSA-2048 service signing key.
pub const SERVICE_PRIVATE_KEY: &str = include_str!("../../../testdata/keys/service.key");
/// Public half of [`SERVICE_PRIVATE_KEY`].
pub const SERVICE_PUBLIC_KEY: &str = include_str!("../../../testdata/keys/service.key.pub");

/// Signs `claims` with `private_key_pem` using `algorithm`.
///
/// # Panics
///
/// Panics if the key does not parse for the algorithm's family.
pub fn sign_assertion(
    private_key_pem: &str,
    algorithm: SigningAlgorithm,
    claims: &serde_json::Value,
) -> String {
    let key = match algorithm.key_algorithm() {
        KeyAlgorithm::Rsa => EncodingKey::from_rsa_pem(private_key_pem.as_bytes()),
        KeyAlgorithm::Ed25519 => EncodingKey::from_ed_pem(private_key_pem.as_bytes()),
    }
    .expect("fixture private key");
    jsonwebtoken::encode(&Header::new(algorithm.to_jwt()), claims, &key).expect("encode assertion")
}

/// Builds `{header_b64}.{payload_b64}.{signature}` from arbitrary JSON.
///
/// Useful for `alg: "none"` and algorithm-confusion attempts. Pass an empty
/// `signature` for unsigned tokens.
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_jwt(
    header_json: &serde_json::Value,
    payload_json: &serde_json::Value,
    signature: &[u8],
) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.{}", URL_SAFE_NO_PAD.encode(signature))
}

/// Generates a fresh Ed25519 key pair as `(private_pkcs8_pem, public_spki_pem)`.
///
/// # Panics
///
/// Panics if PEM encoding fails.
pub fn generate_ed25519_keypair() -> (Zeroizing<String>, String) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let private_pem = signing_key.to_pkcs8_pem(LineEnding::LF).expect("pkcs8 pem");
    let public_pem =
        signing_key.verifying_key().to_public_key_pem(LineEnding::LF).expect("spki pem");
    (private_pem, public_pem)
}

/// The RSA service key pair.
///
/// # Panics
///
/// Panics if the fixture keys do not load.
pub fn service_key_pair() -> Arc<ServiceKeyPair> {
    Arc::new(ServiceKeyPair::from_pem(SERVICE_PRIVATE_KEY, SERVICE_PUBLIC_KEY).expect("service keys"))
}

/// A directory with `alice` (RSA) and `carol` (Ed25519) registered.
///
/// # Panics
///
/// Panics if a fixture key is rejected.
pub fn fixture_directory() -> MemoryKeyDirectory {
    let directory = MemoryKeyDirectory::new();
    directory.register("alice", ALICE_PUBLIC_KEY).expect("alice");
    directory.register("carol", CAROL_PUBLIC_KEY).expect("carol");
    directory
}

/// Asserts that a `Result<T, AuthError>` is an `Err` of the given variant.
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use keyrelay_authn::{AuthError, assert_auth_error};
///
/// let result: Result<(), AuthError> = Err(AuthError::token_expired());
/// assert_auth_error!(result, TokenExpired);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "{}: expected AuthError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use keyrelay_keydir::{Identity, KeyDirectory};
    use serde_json::json;

    use super::*;
    use crate::{assertion::AssertionVerifier, error::AuthError};

    #[test]
    fn test_generated_ed25519_pair_loads_as_service_keys() {
        let (private_pem, public_pem) = generate_ed25519_keypair();
        let pair = ServiceKeyPair::from_pem(&private_pem, &public_pem).unwrap();
        assert_eq!(pair.algorithm(), SigningAlgorithm::EdDsa);
    }

    #[test]
    fn test_generated_pairs_are_unique() {
        let (_, a) = generate_ed25519_keypair();
        let (_, b) = generate_ed25519_keypair();
        assert_ne!(a, b);
    }

    #[test]
    fn test_craft_raw_jwt_format() {
        let jwt = craft_raw_jwt(&json!({"alg": "none"}), &json!({"iss": "alice"}), &[]);
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[2].is_empty());
    }

    #[tokio::test]
    async fn test_fixture_directory_verifies_signed_assertions() {
        let directory = fixture_directory();
        let record = directory.lookup(&Identity::parse("carol").unwrap()).await.unwrap();
        let token = sign_assertion(CAROL_PRIVATE_KEY, SigningAlgorithm::EdDsa, &json!({"iss": "carol"}));

        let claims = AssertionVerifier::new(SigningAlgorithm::EdDsa).verify(&token, &record).unwrap();
        assert_eq!(claims.iss, "carol");
    }

    #[test]
    fn test_assert_auth_error_macro() {
        let result: Result<(), AuthError> = Err(AuthError::token_expired());
        assert_auth_error!(result, TokenExpired);
        assert_auth_error!(result, TokenExpired, "token should be expired");
    }
}
