//! Security-focused exchange tests.
//!
//! These tests drive the full exchange against common assertion attacks:
//! algorithm substitution, algorithm confusion, issuer spoofing, payload
//! tampering, token cross-use and malformed structures. For every attack
//! rejected on the token alone, the key directory must never be consulted.
//!
//! Requires the `testutil` feature:
//!
//! ```bash
//! cargo test -p keyrelay-authn --features testutil --test security
//! ```
#![allow(clippy::expect_used, clippy::panic)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use keyrelay_authn::{
    AuthError, ErrorKind, ExchangeStage, SessionPolicy, SessionValidator, SigningAlgorithm,
    TokenExchanger, assert_auth_error,
    testutil::{
        ALICE_PRIVATE_KEY, ALICE_PUBLIC_KEY, CAROL_PRIVATE_KEY, MALLORY_PRIVATE_KEY,
        MALLORY_PUBLIC_KEY, craft_raw_jwt, fixture_directory, generate_ed25519_keypair,
        service_key_pair, sign_assertion,
    },
    validation::validate_algorithm,
};
use keyrelay_keydir::{DirectoryResult, Identity, KeyDirectory, KeyRecord, MemoryKeyDirectory};
use rstest::rstest;
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Memory directory that counts lookups.
#[derive(Debug)]
struct CountingDirectory {
    inner: MemoryKeyDirectory,
    lookups: AtomicUsize,
}

impl CountingDirectory {
    /// alice (RSA) and carol (Ed25519).
    fn with_fixtures() -> Arc<Self> {
        Arc::new(Self { inner: fixture_directory(), lookups: AtomicUsize::new(0) })
    }

    fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyDirectory for CountingDirectory {
    async fn lookup(&self, identity: &Identity) -> DirectoryResult<KeyRecord> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup(identity).await
    }
}

fn exchanger(directory: Arc<CountingDirectory>, algorithm: SigningAlgorithm) -> TokenExchanger {
    let policy = SessionPolicy::builder().assertion_algorithm(algorithm).build().expect("policy");
    TokenExchanger::builder().directory(directory).keys(service_key_pair()).policy(policy).build()
}

fn sign_rs256(private_pem: &str, claims: &serde_json::Value) -> String {
    sign_assertion(private_pem, SigningAlgorithm::Rs256, claims)
}

fn sign_eddsa(private_pem: &str, claims: &serde_json::Value) -> String {
    sign_assertion(private_pem, SigningAlgorithm::EdDsa, claims)
}

// ===========================================================================
// 1. Algorithm substitution: `alg: "none"` never reaches the directory
// ===========================================================================

#[rstest]
#[case::lowercase("none")]
#[case::mixed_case("NoNe")]
#[tokio::test]
async fn test_alg_none_rejected_before_lookup(#[case] alg: &str) {
    let directory = CountingDirectory::with_fixtures();
    let exchanger = exchanger(Arc::clone(&directory), SigningAlgorithm::Rs256);

    let token = craft_raw_jwt(&json!({"typ": "JWT", "alg": alg}), &json!({"iss": "alice"}), &[]);
    let err = exchanger.exchange(&token).await.expect_err("alg none must be rejected");

    assert!(matches!(err.error, AuthError::UnsupportedAlgorithm { .. }), "got {err:?}");
    assert_eq!(err.stage, ExchangeStage::ReceivedAssertion);
    assert_eq!(directory.lookups(), 0, "Security: no lookup for unsigned tokens");
}

// ===========================================================================
// 2. Algorithm confusion: HMAC keyed with the client's public key
// ===========================================================================

#[tokio::test]
async fn test_hs256_with_public_key_secret_rejected() {
    let directory = CountingDirectory::with_fixtures();
    let exchanger = exchanger(Arc::clone(&directory), SigningAlgorithm::Rs256);

    // Classic confusion: the attacker knows alice's public key and uses it as an HMAC secret.
    let key = EncodingKey::from_secret(ALICE_PUBLIC_KEY.as_bytes());
    let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &json!({"iss": "alice"}), &key)
        .expect("encode");

    let err = exchanger.exchange(&token).await.expect_err("HS256 must be rejected");
    assert!(matches!(err.error, AuthError::UnsupportedAlgorithm { .. }), "got {err:?}");
    assert_eq!(directory.lookups(), 0);
}

#[rstest]
#[case("HS256")]
#[case("HS384")]
#[case("HS512")]
#[case("none")]
fn test_forbidden_algorithms_carry_security_message(#[case] alg: &str) {
    let result = validate_algorithm(alg);
    assert!(
        matches!(&result, Err(AuthError::UnsupportedAlgorithm { message }) if message.contains("not allowed for security reasons")),
        "Security: {alg} must be rejected as forbidden, got: {result:?}"
    );
}

#[tokio::test]
async fn test_unpinned_algorithm_rejected_before_lookup() {
    let directory = CountingDirectory::with_fixtures();
    let exchanger = exchanger(Arc::clone(&directory), SigningAlgorithm::Rs256);

    // Validly signed by a registered client, but with an algorithm the service does not accept.
    let token = sign_eddsa(CAROL_PRIVATE_KEY, &json!({"iss": "carol"}));
    let err = exchanger.exchange(&token).await.expect_err("EdDSA is not pinned");

    assert!(matches!(err.error, AuthError::AlgorithmMismatch { .. }), "got {err:?}");
    assert_eq!(directory.lookups(), 0);
}

#[tokio::test]
async fn test_key_family_must_match_pinned_algorithm() {
    let directory = CountingDirectory::with_fixtures();
    let exchanger = exchanger(Arc::clone(&directory), SigningAlgorithm::EdDsa);

    // alice holds an RSA key; an EdDSA-pinned service must refuse to use it.
    let token = craft_raw_jwt(&json!({"alg": "EdDSA"}), &json!({"iss": "alice"}), &[]);
    let err = exchanger.exchange(&token).await.expect_err("family mismatch");

    assert!(matches!(err.error, AuthError::AlgorithmMismatch { .. }), "got {err:?}");
    assert_eq!(err.stage, ExchangeStage::KeyResolved);
}

// ===========================================================================
// 3. Issuer spoofing and tampering
// ===========================================================================

#[tokio::test]
async fn test_spoofed_issuer_fails_signature() {
    let exchanger = exchanger(CountingDirectory::with_fixtures(), SigningAlgorithm::Rs256);

    let token = sign_rs256(MALLORY_PRIVATE_KEY, &json!({"iss": "alice"}));
    let err = exchanger.exchange(&token).await.expect_err("forged assertion");

    assert_eq!(err.kind(), ErrorKind::SignatureError);
    assert_eq!(err.stage, ExchangeStage::KeyResolved);
}

#[tokio::test]
async fn test_tampered_payload_fails_signature() {
    let exchanger = exchanger(CountingDirectory::with_fixtures(), SigningAlgorithm::Rs256);

    let token = sign_rs256(ALICE_PRIVATE_KEY, &json!({"iss": "alice", "role": "user"}));
    let parts: Vec<&str> = token.split('.').collect();
    let forged_payload =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&json!({"iss": "alice", "role": "admin"})).expect("json"));
    let forged = format!("{}.{forged_payload}.{}", parts[0], parts[2]);

    let err = exchanger.exchange(&forged).await.expect_err("tampered assertion");
    assert_eq!(err.kind(), ErrorKind::SignatureError);
}

#[tokio::test]
async fn test_stripped_signature_rejected() {
    let exchanger = exchanger(CountingDirectory::with_fixtures(), SigningAlgorithm::Rs256);

    let token = sign_rs256(ALICE_PRIVATE_KEY, &json!({"iss": "alice"}));
    let stripped = format!("{}.", token.rsplit_once('.').expect("three parts").0);

    let err = exchanger.exchange(&stripped).await.expect_err("unsigned");
    assert_eq!(err.kind(), ErrorKind::SignatureError);
}

#[tokio::test]
async fn test_garbled_signature_looks_like_any_forgery() {
    let directory = CountingDirectory::with_fixtures();
    let exchanger = exchanger(Arc::clone(&directory), SigningAlgorithm::Rs256);

    // A registered and an unknown issuer, both with an undecodable signature segment.
    let mut kinds = Vec::new();
    for iss in ["alice", "nobody"] {
        let token = sign_rs256(ALICE_PRIVATE_KEY, &json!({"iss": iss}));
        let garbled = format!("{}.!!!", token.rsplit_once('.').expect("three parts").0);
        let err = exchanger.exchange(&garbled).await.expect_err("garbled signature");
        assert!(!err.kind().is_operational(), "{iss}: {err:?}");
        kinds.push(err.kind());
    }

    assert_eq!(kinds, [ErrorKind::SignatureError, ErrorKind::NotFound]);
    assert_eq!(directory.lookups(), 2);
}

#[tokio::test]
async fn test_fresh_key_cannot_impersonate_registered_client() {
    let exchanger = exchanger(CountingDirectory::with_fixtures(), SigningAlgorithm::EdDsa);

    let (impostor_key, _) = generate_ed25519_keypair();
    let token = sign_eddsa(&impostor_key, &json!({"iss": "carol"}));
    let err = exchanger.exchange(&token).await.expect_err("unregistered key");

    assert_eq!(err.kind(), ErrorKind::SignatureError);
    assert_eq!(err.stage, ExchangeStage::KeyResolved);

    let genuine = sign_eddsa(CAROL_PRIVATE_KEY, &json!({"iss": "carol"}));
    assert!(exchanger.exchange(&genuine).await.is_ok());
}

#[tokio::test]
async fn test_registered_client_cannot_speak_for_another() {
    let directory = CountingDirectory::with_fixtures();
    directory.inner.register("mallory", MALLORY_PUBLIC_KEY).expect("mallory");
    let exchanger = exchanger(Arc::clone(&directory), SigningAlgorithm::Rs256);

    let own = sign_rs256(MALLORY_PRIVATE_KEY, &json!({"iss": "mallory"}));
    assert!(exchanger.exchange(&own).await.is_ok(), "mallory may log in as herself");

    let spoofed = sign_rs256(MALLORY_PRIVATE_KEY, &json!({"iss": "alice"}));
    let err = exchanger.exchange(&spoofed).await.expect_err("mallory posing as alice");
    assert_eq!(err.kind(), ErrorKind::SignatureError);
}

// ===========================================================================
// 4. Token cross-use
// ===========================================================================

#[tokio::test]
async fn test_session_token_cannot_be_exchanged_again() {
    let directory = CountingDirectory::with_fixtures();
    let exchanger = exchanger(Arc::clone(&directory), SigningAlgorithm::Rs256);

    let session = exchanger
        .exchange(&sign_rs256(ALICE_PRIVATE_KEY, &json!({"iss": "alice"})))
        .await
        .expect("first exchange");
    let err = exchanger.exchange(&session.token).await.expect_err("session token has no issuer");

    assert_eq!(err.kind(), ErrorKind::MissingParameter);
    assert_eq!(directory.lookups(), 1);
}

#[test]
fn test_assertion_is_not_a_session_token() {
    let validator = SessionValidator::new(service_key_pair(), &SessionPolicy::default());
    let assertion = sign_rs256(ALICE_PRIVATE_KEY, &json!({"iss": "alice", "nbf": 0, "exp": i64::MAX}));

    let result = validator.validate_at(&assertion, 1_000);
    assert_auth_error!(result, InvalidSignature, "an assertion must never open a session");
}

// ===========================================================================
// 5. Malformed structures
// ===========================================================================

#[rstest]
#[case::empty("")]
#[case::one_part("abc")]
#[case::two_parts("abc.def")]
#[case::four_parts("a.b.c.d")]
#[case::bad_base64("!!!.@@@.###")]
#[case::payload_not_json("eyJhbGciOiJSUzI1NiJ9.bm90IGpzb24.")]
#[case::payload_array("eyJhbGciOiJSUzI1NiJ9.WzFd.")]
#[tokio::test]
async fn test_malformed_assertions_rejected_before_lookup(#[case] token: &str) {
    let directory = CountingDirectory::with_fixtures();
    let exchanger = exchanger(Arc::clone(&directory), SigningAlgorithm::Rs256);

    let err = exchanger.exchange(token).await.expect_err("malformed");
    assert_eq!(err.kind(), ErrorKind::Malformed, "got {err:?}");
    assert_eq!(err.stage, ExchangeStage::ReceivedAssertion);
    assert_eq!(directory.lookups(), 0);
}

#[rstest]
#[case::missing(json!({"sub": "alice"}))]
#[case::empty(json!({"iss": ""}))]
#[case::null(json!({"iss": null}))]
#[tokio::test]
async fn test_missing_issuer_is_missing_parameter(#[case] claims: serde_json::Value) {
    let directory = CountingDirectory::with_fixtures();
    let exchanger = exchanger(Arc::clone(&directory), SigningAlgorithm::Rs256);

    let err = exchanger.exchange(&sign_rs256(ALICE_PRIVATE_KEY, &claims)).await.expect_err("no issuer");
    assert_eq!(err.kind(), ErrorKind::MissingParameter);
    assert_eq!(directory.lookups(), 0);
}
