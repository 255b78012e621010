//! The service's own signing key pair.
//!
//! Loaded once at startup and shared by [`Arc`](std::sync::Arc) between the
//! session issuer and validator. Nothing mutates it afterwards.

use std::{fmt, path::Path};

use jsonwebtoken::{DecodingKey, EncodingKey, crypto};
use keyrelay_keydir::KeyAlgorithm;
use zeroize::Zeroizing;

use crate::{
    error::{AuthError, Result},
    validation::SigningAlgorithm,
};

const PROBE_MESSAGE: &[u8] = b"keyrelay service key pair probe";

/// Private and public halves of the key that signs session tokens.
pub struct ServiceKeyPair {
    algorithm: SigningAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_key_pem: String,
}

impl ServiceKeyPair {
    /// Builds a key pair from PEM text.
    ///
    /// The private key must be PKCS#8 (`PRIVATE KEY`) or, for RSA, PKCS#1
    /// (`RSA PRIVATE KEY`). The public key must be SPKI or PKCS#1. The family
    /// is taken from the public key; a test signature proves the two halves
    /// belong together.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidKey`] if either half fails to parse, the
    /// public key is not a supported family, or the halves do not match.
    pub fn from_pem(private_key_pem: &str, public_key_pem: &str) -> Result<Self> {
        let family = KeyAlgorithm::of_public_pem(public_key_pem).ok_or_else(|| {
            AuthError::invalid_key("public key is not an RSA (>= 2048 bits) or Ed25519 PEM key")
        })?;
        let algorithm = SigningAlgorithm::for_key(family);

        let (encoding_key, decoding_key) = match family {
            KeyAlgorithm::Rsa => (
                EncodingKey::from_rsa_pem(private_key_pem.as_bytes()),
                DecodingKey::from_rsa_pem(public_key_pem.as_bytes()),
            ),
            KeyAlgorithm::Ed25519 => (
                EncodingKey::from_ed_pem(private_key_pem.as_bytes()),
                DecodingKey::from_ed_pem(public_key_pem.as_bytes()),
            ),
        };
        let encoding_key = encoding_key
            .map_err(|e| AuthError::invalid_key(format!("{family} private key: {e}")))?;
        let decoding_key = decoding_key
            .map_err(|e| AuthError::invalid_key(format!("{family} public key: {e}")))?;

        probe(&encoding_key, &decoding_key, algorithm)?;

        Ok(Self {
            algorithm,
            encoding_key,
            decoding_key,
            public_key_pem: format!("{}\n", public_key_pem.trim()),
        })
    }

    /// Reads and parses the two PEM files.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidKey`] if a file cannot be read, plus every
    /// error of [`from_pem`](Self::from_pem).
    pub fn load(private_key_path: &Path, public_key_path: &Path) -> Result<Self> {
        let private_pem = Zeroizing::new(std::fs::read_to_string(private_key_path).map_err(
            |e| AuthError::invalid_key(format!("read {}: {e}", private_key_path.display())),
        )?);
        let public_pem = std::fs::read_to_string(public_key_path).map_err(|e| {
            AuthError::invalid_key(format!("read {}: {e}", public_key_path.display()))
        })?;

        let pair = Self::from_pem(&private_pem, &public_pem)?;
        tracing::info!(
            algorithm = %pair.algorithm,
            public_key = %public_key_path.display(),
            "loaded service key pair"
        );
        Ok(pair)
    }

    /// The algorithm session tokens are signed with.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// The public half as PEM text.
    #[must_use]
    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for ServiceKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceKeyPair")
            .field("algorithm", &self.algorithm)
            .field("public_key_pem", &self.public_key_pem)
            .finish_non_exhaustive()
    }
}

fn probe(encoding: &EncodingKey, decoding: &DecodingKey, algorithm: SigningAlgorithm) -> Result<()> {
    let signature = crypto::sign(PROBE_MESSAGE, encoding, algorithm.to_jwt())
        .map_err(|e| AuthError::invalid_key(format!("private key cannot sign: {e}")))?;
    let verified = crypto::verify(&signature, PROBE_MESSAGE, decoding, algorithm.to_jwt())
        .map_err(|e| AuthError::invalid_key(format!("public key cannot verify: {e}")))?;
    if !verified {
        return Err(AuthError::invalid_key("private and public keys do not match"));
    }
    Ok(())
}
