//! Key directory error types and result alias.
//!
//! Every directory backend maps its internal failures onto [`DirectoryError`].
//! Callers rely on the distinction between the variants:
//!
//! - [`DirectoryError::NotFound`] and [`DirectoryError::InvalidIdentity`] mean "no such principal". The
//!   caller presenting that identity is untrusted.
//! - [`DirectoryError::Unavailable`] and [`DirectoryError::Malformed`] are operational problems
//!   unrelated to the caller's trustworthiness.
//!
//! # Example
//!
//! ```
//! use keyrelay_keydir::{DirectoryError, DirectoryResult};
//!
//! fn lookup(identity: &str) -> DirectoryResult<String> {
//!     Err(DirectoryError::not_found(identity))
//! }
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A shareable boxed error for source chain tracking.
///
/// `Arc` rather than `Box` so that [`DirectoryError`] stays `Clone`; the
/// single-flight cache hands the same error to every waiting caller.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors that can occur while resolving an identity to its key.
///
/// # Non-exhaustive
///
/// New variants may be added in minor releases. Downstream match expressions
/// must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum DirectoryError {
    /// The identity string failed validation and was never mapped to storage.
    #[error("Invalid identity: {reason}")]
    InvalidIdentity {
        /// Why the identity was rejected.
        reason: String,
    },

    /// No key is registered for this identity.
    #[error("No key registered for identity: {identity}")]
    NotFound {
        /// The identity that was looked up.
        identity: String,
    },

    /// The backing store or remote service could not be reached or failed.
    ///
    /// Covers I/O errors, transport errors, timeouts and unexpected upstream
    /// responses.
    #[error("Key directory unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
        /// The underlying error, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// Key material exists but is not a supported public key.
    #[error("Malformed key material for {identity}: {message}")]
    Malformed {
        /// The identity whose key failed to parse.
        identity: String,
        /// Description of the parse failure.
        message: String,
    },
}

impl DirectoryError {
    /// Creates an `InvalidIdentity` error.
    #[must_use]
    pub fn invalid_identity(reason: impl Into<String>) -> Self {
        Self::InvalidIdentity { reason: reason.into() }
    }

    /// Creates a `NotFound` error for the given identity.
    #[must_use]
    pub fn not_found(identity: impl Into<String>) -> Self {
        Self::NotFound { identity: identity.into() }
    }

    /// Creates an `Unavailable` error with the given message.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into(), source: None }
    }

    /// Creates an `Unavailable` error with a message and source error.
    #[must_use]
    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Unavailable { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates an `Unavailable` error describing an elapsed lookup timeout.
    #[must_use]
    pub fn timeout() -> Self {
        Self::unavailable("lookup timed out")
    }

    /// Creates a `Malformed` error.
    #[must_use]
    pub fn malformed(identity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed { identity: identity.into(), message: message.into() }
    }

    /// Returns `true` when the identity has no usable key record.
    ///
    /// This is an authentication outcome, not an operational one.
    #[must_use]
    pub fn is_unknown_identity(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::InvalidIdentity { .. })
    }
}
