//! Public key records served by the directory.

use std::fmt;

use ed25519_dalek::{VerifyingKey, pkcs8::DecodePublicKey as _};
use rsa::{
    RsaPublicKey,
    pkcs1::DecodeRsaPublicKey,
    pkcs8::DecodePublicKey,
    traits::PublicKeyParts,
};

use crate::{error::DirectoryError, identity::Identity};

/// Smallest RSA modulus accepted for verification keys.
pub const MIN_RSA_MODULUS_BITS: usize = 2048;

const PKCS1_RSA_LABEL: &str = "-----BEGIN RSA PUBLIC KEY-----";
const SPKI_LABEL: &str = "-----BEGIN PUBLIC KEY-----";

/// Asymmetric key family of a verification key.
///
/// Signature algorithms are pinned per family, so a key of one family can
/// never verify a token that claims another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// RSA public key (PKCS#1 or SubjectPublicKeyInfo PEM).
    Rsa,
    /// Ed25519 public key (SubjectPublicKeyInfo PEM).
    Ed25519,
}

impl KeyAlgorithm {
    /// Detects the family of a PEM public key, or `None` if it is not a
    /// supported public key.
    #[must_use]
    pub fn of_public_pem(pem: &str) -> Option<Self> {
        detect_algorithm(pem.trim()).ok()
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa => f.write_str("RSA"),
            Self::Ed25519 => f.write_str("Ed25519"),
        }
    }
}

/// An identity's public verification key.
///
/// Construction parses the PEM text, so a `KeyRecord` always holds key
/// material of a known [`KeyAlgorithm`]. Records are immutable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRecord {
    identity: Identity,
    algorithm: KeyAlgorithm,
    public_key_pem: String,
}

impl KeyRecord {
    /// Parses PEM-encoded public key material for `identity`.
    ///
    /// Accepts `PUBLIC KEY` (SPKI, RSA or Ed25519) and `RSA PUBLIC KEY`
    /// (PKCS#1) documents.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Malformed`] if the text is not a PEM public key
    /// of a supported family, or if an RSA modulus is shorter than
    /// [`MIN_RSA_MODULUS_BITS`].
    pub fn from_pem(identity: Identity, pem: &str) -> Result<Self, DirectoryError> {
        let pem = pem.trim();
        let algorithm = detect_algorithm(pem)
            .map_err(|message| DirectoryError::malformed(identity.as_str(), message))?;

        Ok(Self { identity, algorithm, public_key_pem: format!("{pem}\n") })
    }

    /// The identity this key belongs to.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The key family.
    #[must_use]
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// The PEM text exactly as it will be handed to a verifier.
    #[must_use]
    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }
}

fn detect_algorithm(pem: &str) -> Result<KeyAlgorithm, String> {
    if pem.starts_with(PKCS1_RSA_LABEL) {
        let key = RsaPublicKey::from_pkcs1_pem(pem).map_err(|e| format!("PKCS#1 RSA: {e}"))?;
        return check_rsa_size(&key);
    }

    if !pem.starts_with(SPKI_LABEL) {
        return Err("expected a PEM encoded public key".to_owned());
    }

    if VerifyingKey::from_public_key_pem(pem).is_ok() {
        return Ok(KeyAlgorithm::Ed25519);
    }

    match RsaPublicKey::from_public_key_pem(pem) {
        Ok(key) => check_rsa_size(&key),
        Err(e) => Err(format!("unsupported public key: {e}")),
    }
}

fn check_rsa_size(key: &RsaPublicKey) -> Result<KeyAlgorithm, String> {
    let bits = key.size() * 8;
    if bits < MIN_RSA_MODULUS_BITS {
        return Err(format!("RSA modulus of {bits} bits is below {MIN_RSA_MODULUS_BITS}"));
    }
    Ok(KeyAlgorithm::Rsa)
}
