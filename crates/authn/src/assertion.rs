//! Signed assertions presented by clients.
//!
//! An assertion is a compact JWS whose payload names its signer in `iss`.
//! The issuer has to be read before the signature can be checked, because it
//! selects the verification key:
//!
//! ```text
//! assertion → decode_unverified  (structure, alg, iss; trusts nothing)
//!           → KeyDirectory::lookup(iss)
//!           → AssertionVerifier::verify(assertion, record)
//!                 alg pinned, key family matches, signature, exp/nbf,
//!                 verified iss == record identity
//! ```
//!
//! Nothing returned by [`decode_unverified`] may be used for anything except
//! choosing which key to look up.

use std::{collections::HashSet, sync::Arc, time::Duration};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{DecodingKey, Validation, decode};
use keyrelay_keydir::{KeyAlgorithm, KeyRecord};
use serde::{Deserialize, Serialize};

use crate::{
    clock::{Clock, SystemClock, duration_secs},
    error::{AuthError, Result},
    validation::{SigningAlgorithm, peek_algorithm},
};

/// Header and issuer of an assertion whose signature has not been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedAssertion {
    algorithm: String,
    issuer: String,
}

impl UnverifiedAssertion {
    /// The raw `alg` header value.
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// The claimed issuer. Untrusted.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

/// Parses an assertion's header and payload without verifying the signature.
///
/// # Errors
///
/// - [`AuthError::InvalidTokenFormat`] if the token is not three base64url
///   segments with a JSON object payload, or `iss` is not a string
/// - [`AuthError::MissingClaim`] if `alg` or `iss` is absent, or `iss` is empty
pub fn decode_unverified(token: &str) -> Result<UnverifiedAssertion> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::invalid_token_format("JWT must have 3 parts separated by dots"));
    }

    let algorithm = peek_algorithm(token)?;

    let payload_bytes = URL_SAFE_NO_PAD.decode(parts[1]).map_err(|e| {
        AuthError::invalid_token_format(format!("failed to decode JWT payload: {e}"))
    })?;
    let payload: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(&payload_bytes).map_err(|e| {
            AuthError::invalid_token_format(format!("failed to parse JWT claims: {e}"))
        })?;

    let issuer = match payload.get("iss") {
        None | Some(serde_json::Value::Null) => return Err(AuthError::missing_claim("iss")),
        Some(serde_json::Value::String(iss)) if iss.is_empty() => {
            return Err(AuthError::missing_claim("iss"));
        },
        Some(serde_json::Value::String(iss)) => iss.clone(),
        Some(_) => return Err(AuthError::invalid_token_format("iss claim must be a string")),
    };

    Ok(UnverifiedAssertion { algorithm, issuer })
}

/// Claims of an assertion whose signature and issuer binding have been verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedClaims {
    /// The signer. Equal to the identity of the key that verified it.
    pub iss: String,
    /// Expiry (seconds since epoch), if the signer set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Not-before (seconds since epoch), if the signer set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Issued-at (seconds since epoch), if the signer set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Every other claim, uninterpreted.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Verifies assertions against a resolved [`KeyRecord`].
#[derive(Debug, Clone)]
pub struct AssertionVerifier {
    algorithm: SigningAlgorithm,
    clock_skew: Duration,
    clock: Arc<dyn Clock>,
}

impl AssertionVerifier {
    /// Creates a verifier pinned to `algorithm`, reading time from the system clock.
    #[must_use]
    pub fn new(algorithm: SigningAlgorithm) -> Self {
        Self { algorithm, clock_skew: Duration::ZERO, clock: Arc::new(SystemClock) }
    }

    /// Sets the tolerance for `exp` / `nbf` checks.
    #[must_use]
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The pinned algorithm.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Verifies `token` with `record`'s key.
    ///
    /// # Errors
    ///
    /// - [`AuthError::UnsupportedAlgorithm`] / [`AuthError::AlgorithmMismatch`] if the
    ///   header algorithm is not the pinned one, or the key family cannot produce it
    /// - [`AuthError::InvalidSignature`] if the signature does not verify
    /// - [`AuthError::MissingClaim`] if `iss` is missing or empty
    /// - [`AuthError::TokenExpired`] / [`AuthError::TokenNotYetValid`] for
    ///   `exp` / `nbf` outside the skew-adjusted window
    /// - [`AuthError::IssuerMismatch`] if `iss` is not the record's identity
    /// - [`AuthError::InvalidKey`] if the record's key cannot be loaded
    ///
    /// A token that fails to decode against the key (bad signature encoding,
    /// claims of the wrong type) is reported as [`AuthError::InvalidSignature`].
    #[tracing::instrument(skip(self, token, record), fields(identity = %record.identity()))]
    pub fn verify(&self, token: &str, record: &KeyRecord) -> Result<VerifiedClaims> {
        let alg = peek_algorithm(token)?;
        self.algorithm.ensure_header(&alg)?;

        if record.algorithm() != self.algorithm.key_algorithm() {
            return Err(AuthError::algorithm_mismatch(
                self.algorithm.as_str(),
                format!("{} key", record.algorithm()),
            ));
        }

        let key = decoding_key(record)?;

        let mut validation = Validation::new(self.algorithm.to_jwt());
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        // Past the lookup, undecodable tokens are reported as bad signatures.
        let claims = decode::<VerifiedClaims>(token, &key, &validation)
            .map_err(|e| match AuthError::from(e) {
                AuthError::InvalidTokenFormat { .. } | AuthError::MissingClaim { .. } => {
                    AuthError::invalid_signature()
                },
                other => other,
            })?
            .claims;

        if claims.iss.is_empty() {
            return Err(AuthError::missing_claim("iss"));
        }

        let now = self.clock.now();
        let skew = duration_secs(self.clock_skew);
        if let Some(exp) = claims.exp
            && now > exp.saturating_add(skew)
        {
            return Err(AuthError::token_expired());
        }
        if let Some(nbf) = claims.nbf
            && now < nbf.saturating_sub(skew)
        {
            return Err(AuthError::token_not_yet_valid());
        }

        if claims.iss != record.identity().as_str() {
            return Err(AuthError::issuer_mismatch(claims.iss, record.identity().as_str()));
        }

        tracing::debug!("assertion verified");
        Ok(claims)
    }
}

fn decoding_key(record: &KeyRecord) -> Result<DecodingKey> {
    let pem = record.public_key_pem().as_bytes();
    let key = match record.algorithm() {
        KeyAlgorithm::Rsa => DecodingKey::from_rsa_pem(pem),
        KeyAlgorithm::Ed25519 => DecodingKey::from_ed_pem(pem),
    };
    key.map_err(|e| AuthError::invalid_key(format!("key for {}: {e}", record.identity())))
}
