//! Authentication error types.
//!
//! [`AuthError`] carries the specific failure for logs; [`ErrorKind`] is the
//! coarse classification the HTTP boundary turns into a status code.

use keyrelay_keydir::DirectoryError;
use thiserror::Error;

/// Coarse classification of an authentication failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A required input or claim was absent or empty.
    MissingParameter,
    /// The claimed identity has no registered key.
    NotFound,
    /// A dependency (key directory) could not answer.
    Unavailable,
    /// Input or stored key material could not be parsed.
    Malformed,
    /// Signature, algorithm or issuer binding did not verify.
    SignatureError,
    /// The token's expiry has passed.
    Expired,
    /// The token's not-before time has not arrived.
    NotYetValid,
    /// Local misconfiguration or signing failure.
    Internal,
}

impl ErrorKind {
    /// Returns `true` for kinds that say nothing about the caller's credentials.
    #[must_use]
    pub fn is_operational(self) -> bool {
        matches!(self, Self::Unavailable | Self::Internal)
    }

    /// Stable lowercase label for structured logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingParameter => "missing_parameter",
            Self::NotFound => "not_found",
            Self::Unavailable => "unavailable",
            Self::Malformed => "malformed",
            Self::SignatureError => "signature_error",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`; downstream match expressions must
/// include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The token is not a structurally valid compact JWS.
    #[error("Invalid token format: {message}")]
    InvalidTokenFormat {
        /// What failed to parse.
        message: String,
    },

    /// A required claim is missing or empty.
    #[error("Missing claim: {claim}")]
    MissingClaim {
        /// Name of the claim.
        claim: String,
    },

    /// The header algorithm is forbidden or not accepted.
    #[error("Unsupported algorithm: {message}")]
    UnsupportedAlgorithm {
        /// Description of the rejection.
        message: String,
    },

    /// The header algorithm differs from the pinned one.
    #[error("Algorithm mismatch: expected {expected}, got {actual}")]
    AlgorithmMismatch {
        /// The pinned algorithm.
        expected: String,
        /// The algorithm named in the token header.
        actual: String,
    },

    /// The signature does not verify.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The verified issuer differs from the identity whose key verified it.
    #[error("Issuer mismatch: token claims {claimed}, key belongs to {expected}")]
    IssuerMismatch {
        /// The `iss` claim in the token.
        claimed: String,
        /// The identity of the key record.
        expected: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The token is not yet valid.
    #[error("Token not yet valid")]
    TokenNotYetValid,

    /// Key directory failure during issuer key resolution.
    #[error("Key directory error: {0}")]
    Directory(#[source] DirectoryError),

    /// Key material could not be loaded or used.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of the problem.
        message: String,
    },

    /// Signing a session token failed.
    #[error("Signing failed: {message}")]
    SigningFailed {
        /// Description of the failure.
        message: String,
    },

    /// Configuration values violate a constraint.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// The violated constraint.
        message: String,
    },
}

impl AuthError {
    /// Creates an `InvalidTokenFormat` error.
    #[must_use]
    pub fn invalid_token_format(message: impl Into<String>) -> Self {
        Self::InvalidTokenFormat { message: message.into() }
    }

    /// Creates a `MissingClaim` error.
    #[must_use]
    pub fn missing_claim(claim: impl Into<String>) -> Self {
        Self::MissingClaim { claim: claim.into() }
    }

    /// Creates an `UnsupportedAlgorithm` error.
    #[must_use]
    pub fn unsupported_algorithm(message: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm { message: message.into() }
    }

    /// Creates an `AlgorithmMismatch` error.
    #[must_use]
    pub fn algorithm_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::AlgorithmMismatch { expected: expected.into(), actual: actual.into() }
    }

    /// Creates an `InvalidSignature` error.
    #[must_use]
    pub fn invalid_signature() -> Self {
        Self::InvalidSignature
    }

    /// Creates an `IssuerMismatch` error.
    #[must_use]
    pub fn issuer_mismatch(claimed: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::IssuerMismatch { claimed: claimed.into(), expected: expected.into() }
    }

    /// Creates a `TokenExpired` error.
    #[must_use]
    pub fn token_expired() -> Self {
        Self::TokenExpired
    }

    /// Creates a `TokenNotYetValid` error.
    #[must_use]
    pub fn token_not_yet_valid() -> Self {
        Self::TokenNotYetValid
    }

    /// Creates an `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey { message: message.into() }
    }

    /// Creates a `SigningFailed` error.
    #[must_use]
    pub fn signing_failed(message: impl Into<String>) -> Self {
        Self::SigningFailed { message: message.into() }
    }

    /// Creates an `InvalidConfiguration` error.
    #[must_use]
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration { message: message.into() }
    }

    /// Classifies this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTokenFormat { .. } => ErrorKind::Malformed,
            Self::MissingClaim { .. } => ErrorKind::MissingParameter,
            Self::UnsupportedAlgorithm { .. }
            | Self::AlgorithmMismatch { .. }
            | Self::InvalidSignature
            | Self::IssuerMismatch { .. } => ErrorKind::SignatureError,
            Self::TokenExpired => ErrorKind::Expired,
            Self::TokenNotYetValid => ErrorKind::NotYetValid,
            Self::Directory(err) => match err {
                DirectoryError::NotFound { .. } | DirectoryError::InvalidIdentity { .. } => {
                    ErrorKind::NotFound
                },
                DirectoryError::Malformed { .. } => ErrorKind::Malformed,
                _ => ErrorKind::Unavailable,
            },
            Self::InvalidKey { .. } => ErrorKind::Malformed,
            Self::SigningFailed { .. } | Self::InvalidConfiguration { .. } => ErrorKind::Internal,
        }
    }
}

impl From<DirectoryError> for AuthError {
    fn from(err: DirectoryError) -> Self {
        AuthError::Directory(err)
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => AuthError::invalid_signature(),
            ErrorKind::ExpiredSignature => AuthError::token_expired(),
            ErrorKind::ImmatureSignature => AuthError::token_not_yet_valid(),
            ErrorKind::InvalidAlgorithm => {
                AuthError::unsupported_algorithm("algorithm does not match the key")
            },
            ErrorKind::MissingRequiredClaim(claim) => AuthError::missing_claim(claim.clone()),
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::RsaFailedSigning => AuthError::invalid_key(err.to_string()),
            ErrorKind::InvalidToken => AuthError::invalid_token_format("invalid JWT structure"),
            _ => AuthError::invalid_token_format(format!("JWT error: {err}")),
        }
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
