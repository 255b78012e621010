//! Validated principal identities.
//!
//! An [`Identity`] is the only form in which an identity string reaches a
//! storage backend. Parsing rejects anything that could be used to escape the
//! `<identity>.key.pub` file layout or to smuggle extra URL components.

use std::{fmt, str::FromStr};

use crate::error::DirectoryError;

/// Maximum accepted identity length in bytes.
pub const MAX_IDENTITY_LEN: usize = 128;

/// A non-empty principal name safe to use as a storage key.
///
/// Accepted characters are ASCII letters, digits and `.`, `_`, `@`, `-`.
/// A leading `.` and any `..` sequence are rejected.
///
/// # Examples
///
/// ```
/// use keyrelay_keydir::Identity;
///
/// let alice = Identity::parse("alice").unwrap();
/// assert_eq!(alice.as_str(), "alice");
///
/// assert!(Identity::parse("").is_err());
/// assert!(Identity::parse("../etc/passwd").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    /// Validates and wraps an identity string.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::InvalidIdentity`] if the string is empty, too
    /// long, starts with `.`, contains `..`, or contains a character outside
    /// the accepted set.
    pub fn parse(raw: &str) -> Result<Self, DirectoryError> {
        if raw.is_empty() {
            return Err(DirectoryError::invalid_identity("identity must not be empty"));
        }
        if raw.len() > MAX_IDENTITY_LEN {
            return Err(DirectoryError::invalid_identity(format!(
                "identity exceeds {MAX_IDENTITY_LEN} bytes"
            )));
        }
        if raw.starts_with('.') || raw.contains("..") {
            return Err(DirectoryError::invalid_identity("identity contains a path traversal"));
        }
        if let Some(bad) = raw.chars().find(|c| !is_identity_char(*c)) {
            return Err(DirectoryError::invalid_identity(format!(
                "identity contains forbidden character {bad:?}"
            )));
        }
        Ok(Self(raw.to_owned()))
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_identity_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '-')
}

impl FromStr for Identity {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
