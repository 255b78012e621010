//! Structured fuzz target for assertion verification.
//!
//! Builds JWT-shaped inputs with plausible headers and claims, then runs them
//! through unverified decoding and full verification against a fixed RSA key.
//! Nothing may verify: the signature segment is fuzzer-chosen bytes.

#![no_main]

use arbitrary::Arbitrary;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use keyrelay_authn::{AssertionVerifier, SigningAlgorithm, decode_unverified};
use keyrelay_keydir::{Identity, KeyRecord};
use libfuzzer_sys::fuzz_target;

const ALICE_PUB: &str = include_str!("../../../../testdata/keys/alice.key.pub");

#[derive(Debug, Arbitrary)]
struct FuzzedAssertion {
    alg: FuzzedAlg,
    iss: Option<String>,
    exp: Option<i64>,
    nbf: Option<i64>,
    extra: Option<(String, String)>,
    signature_bytes: Vec<u8>,
    include_typ: bool,
}

/// Algorithm values covering known attack vectors.
#[derive(Debug, Arbitrary)]
enum FuzzedAlg {
    RS256,
    EdDSA,
    None,
    HS256,
    HS512,
    ES256,
    Other(String),
}

impl FuzzedAlg {
    fn as_str(&self) -> &str {
        match self {
            Self::RS256 => "RS256",
            Self::EdDSA => "EdDSA",
            Self::None => "none",
            Self::HS256 => "HS256",
            Self::HS512 => "HS512",
            Self::ES256 => "ES256",
            Self::Other(s) => s,
        }
    }
}

fn build_jwt(input: &FuzzedAssertion) -> String {
    let mut header = serde_json::Map::new();
    header.insert("alg".into(), input.alg.as_str().into());
    if input.include_typ {
        header.insert("typ".into(), "JWT".into());
    }

    let mut payload = serde_json::Map::new();
    if let Some(ref iss) = input.iss {
        payload.insert("iss".into(), iss.clone().into());
    }
    if let Some(exp) = input.exp {
        payload.insert("exp".into(), exp.into());
    }
    if let Some(nbf) = input.nbf {
        payload.insert("nbf".into(), nbf.into());
    }
    if let Some((ref key, ref value)) = input.extra {
        payload.insert(key.clone(), value.clone().into());
    }

    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap_or_default());
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap_or_default());
    let sig_b64 = URL_SAFE_NO_PAD.encode(&input.signature_bytes);
    format!("{header_b64}.{payload_b64}.{sig_b64}")
}

fuzz_target!(|input: FuzzedAssertion| {
    let token = build_jwt(&input);
    let _ = decode_unverified(&token);

    let Ok(identity) = Identity::parse("alice") else {
        return;
    };
    let Ok(record) = KeyRecord::from_pem(identity, ALICE_PUB) else {
        return;
    };
    let result = AssertionVerifier::new(SigningAlgorithm::Rs256).verify(&token, &record);
    assert!(result.is_err(), "fuzzed signature verified: {token}");
});
