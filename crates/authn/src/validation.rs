//! JWT algorithm validation and pinning.
//!
//! Both token kinds handled by this crate are pinned to one asymmetric
//! algorithm: assertions to the configured [`SigningAlgorithm`], session
//! tokens to the family of the service key. A token naming any other
//! algorithm is rejected before its signature is looked at.

use std::{fmt, str::FromStr};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::Algorithm;
use keyrelay_keydir::KeyAlgorithm;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// JWT algorithms that are never accepted.
///
/// - `none`: no signature at all
/// - `HS256`, `HS384`, `HS512`: symmetric, the verifier would need the signer's secret
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// JWT algorithms with a complete verification path.
pub const ACCEPTED_ALGORITHMS: &[&str] = &["RS256", "EdDSA"];

/// Validates a raw `alg` header value against the forbidden and accepted lists.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] if the algorithm is forbidden
/// or not in [`ACCEPTED_ALGORITHMS`].
///
/// # Examples
///
/// ```
/// use keyrelay_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("RS256").is_ok());
/// assert!(validate_algorithm("EdDSA").is_ok());
/// assert!(validate_algorithm("none").is_err());
/// assert!(validate_algorithm("HS256").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), AuthError> {
    if FORBIDDEN_ALGORITHMS.iter().any(|f| f.eq_ignore_ascii_case(alg)) {
        return Err(AuthError::unsupported_algorithm(format!(
            "algorithm '{alg}' is not allowed for security reasons"
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "algorithm '{alg}' is not in the accepted list"
        )));
    }

    Ok(())
}

/// Reads the raw `alg` value from a compact JWS header without verifying anything.
///
/// Unlike [`jsonwebtoken::decode_header`], this succeeds for algorithm names
/// the library cannot represent (such as `none`), so they can be rejected by
/// name.
///
/// # Errors
///
/// Returns [`AuthError::InvalidTokenFormat`] if the header segment is not
/// base64url JSON, or [`AuthError::MissingClaim`] if it has no string `alg`.
pub fn peek_algorithm(token: &str) -> Result<String, AuthError> {
    let header_b64 = token
        .split('.')
        .next()
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| AuthError::invalid_token_format("missing JWT header"))?;

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|e| AuthError::invalid_token_format(format!("failed to decode JWT header: {e}")))?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes)
        .map_err(|e| AuthError::invalid_token_format(format!("failed to parse JWT header: {e}")))?;

    header
        .get("alg")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| AuthError::missing_claim("alg"))
}

/// An asymmetric signature algorithm this crate can verify and sign with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    #[default]
    #[serde(rename = "RS256")]
    Rs256,
    /// Ed25519.
    #[serde(rename = "EdDSA")]
    EdDsa,
}

impl SigningAlgorithm {
    /// The algorithm that keys of `family` sign with.
    #[must_use]
    pub fn for_key(family: KeyAlgorithm) -> Self {
        match family {
            KeyAlgorithm::Rsa => Self::Rs256,
            KeyAlgorithm::Ed25519 => Self::EdDsa,
        }
    }

    /// The key family this algorithm requires.
    #[must_use]
    pub fn key_algorithm(self) -> KeyAlgorithm {
        match self {
            Self::Rs256 => KeyAlgorithm::Rsa,
            Self::EdDsa => KeyAlgorithm::Ed25519,
        }
    }

    /// The `jsonwebtoken` representation.
    #[must_use]
    pub fn to_jwt(self) -> Algorithm {
        match self {
            Self::Rs256 => Algorithm::RS256,
            Self::EdDsa => Algorithm::EdDSA,
        }
    }

    /// The JOSE `alg` header value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rs256 => "RS256",
            Self::EdDsa => "EdDSA",
        }
    }

    /// Checks that a raw header `alg` is acceptable and equals this algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnsupportedAlgorithm`] for forbidden or unknown
    /// algorithms and [`AuthError::AlgorithmMismatch`] for an accepted
    /// algorithm other than this one.
    pub fn ensure_header(self, alg: &str) -> Result<(), AuthError> {
        validate_algorithm(alg)?;
        if alg != self.as_str() {
            return Err(AuthError::algorithm_mismatch(self.as_str(), alg));
        }
        Ok(())
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_algorithm(s)?;
        match s {
            "RS256" => Ok(Self::Rs256),
            "EdDSA" => Ok(Self::EdDsa),
            other => Err(AuthError::unsupported_algorithm(format!("unknown algorithm '{other}'"))),
        }
    }
}
