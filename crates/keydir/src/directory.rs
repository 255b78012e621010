//! The key lookup contract and its in-memory implementation.
//!
//! [`KeyDirectory`] is the seam between the exchanger and wherever public keys
//! actually live. Production deployments talk to the directory service over
//! HTTP ([`HttpKeyDirectory`](crate::HttpKeyDirectory)); the service itself
//! reads from disk ([`FileKeyDirectory`](crate::FileKeyDirectory)); tests use
//! [`MemoryKeyDirectory`].
//!
//! # Example
//!
//! ```
//! use keyrelay_keydir::{Identity, KeyDirectory, MemoryKeyDirectory};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let directory = MemoryKeyDirectory::new();
//! let bob = Identity::parse("bob").unwrap();
//!
//! assert!(directory.lookup(&bob).await.is_err());
//! # });
//! ```

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    error::{DirectoryError, DirectoryResult},
    identity::Identity,
    record::KeyRecord,
};

/// Resolves an identity to its public verification key.
///
/// Lookups are read-only and carry no side effects. Every call is a live
/// resolution unless the implementation is explicitly a cache
/// ([`CachedKeyDirectory`](crate::CachedKeyDirectory)).
///
/// # Errors
///
/// Implementations must distinguish an unknown identity
/// ([`DirectoryError::NotFound`]) from operational failures
/// ([`DirectoryError::Unavailable`], [`DirectoryError::Malformed`]).
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Returns the key registered for `identity`.
    async fn lookup(&self, identity: &Identity) -> DirectoryResult<KeyRecord>;
}

#[async_trait]
impl<T: KeyDirectory + ?Sized> KeyDirectory for Arc<T> {
    async fn lookup(&self, identity: &Identity) -> DirectoryResult<KeyRecord> {
        (**self).lookup(identity).await
    }
}

/// In-memory [`KeyDirectory`] for tests and embedded use.
///
/// Cloning shares the underlying map.
#[derive(Debug, Default, Clone)]
pub struct MemoryKeyDirectory {
    keys: Arc<RwLock<HashMap<Identity, KeyRecord>>>,
}

impl MemoryKeyDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `record` under its identity, replacing any previous key.
    pub fn insert(&self, record: KeyRecord) {
        self.keys.write().insert(record.identity().clone(), record);
    }

    /// Parses `pem` and registers it for `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::InvalidIdentity`] or [`DirectoryError::Malformed`]
    /// if either input fails validation.
    pub fn register(&self, identity: &str, pem: &str) -> DirectoryResult<()> {
        let record = KeyRecord::from_pem(Identity::parse(identity)?, pem)?;
        self.insert(record);
        Ok(())
    }

    /// Removes the key for `identity`, returning it if present.
    pub fn remove(&self, identity: &Identity) -> Option<KeyRecord> {
        self.keys.write().remove(identity)
    }

    /// Number of registered identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    /// Returns `true` if no identity is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

#[async_trait]
impl KeyDirectory for MemoryKeyDirectory {
    #[tracing::instrument(skip(self), fields(identity = %identity))]
    async fn lookup(&self, identity: &Identity) -> DirectoryResult<KeyRecord> {
        self.keys
            .read()
            .get(identity)
            .cloned()
            .ok_or_else(|| DirectoryError::not_found(identity.as_str()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    const ALICE_RSA: &str = include_str!("../../../testdata/keys/alice.key.pub");
    const CAROL_ED25519: &str = include_str!("../../../testdata/keys/carol.key.pub");

    #[tokio::test]
    async fn test_registered_identity_returns_exact_key() {
        let directory = MemoryKeyDirectory::new();
        directory.register("alice", ALICE_RSA).unwrap();
        directory.register("carol", CAROL_ED25519).unwrap();

        let alice = Identity::parse("alice").unwrap();
        let record = directory.lookup(&alice).await.unwrap();

        assert_eq!(record.identity(), &alice);
        assert_eq!(record.public_key_pem().trim(), ALICE_RSA.trim());
        assert_eq!(directory.len(), 2);
    }

    #[tokio::test]
    async fn test_unregistered_identity_not_found() {
        let directory = MemoryKeyDirectory::new();
        directory.register("alice", ALICE_RSA).unwrap();

        let result = directory.lookup(&Identity::parse("bob").unwrap()).await;

        assert!(matches!(result, Err(DirectoryError::NotFound { identity }) if identity == "bob"));
    }

    #[tokio::test]
    async fn test_remove() {
        let directory = MemoryKeyDirectory::new();
        directory.register("carol", CAROL_ED25519).unwrap();
        let carol = Identity::parse("carol").unwrap();

        assert!(directory.remove(&carol).is_some());
        assert!(directory.is_empty());
        assert!(directory.lookup(&carol).await.is_err());
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let directory = MemoryKeyDirectory::new();

        assert!(matches!(
            directory.register("../alice", ALICE_RSA),
            Err(DirectoryError::InvalidIdentity { .. })
        ));
        assert!(matches!(
            directory.register("alice", "garbage"),
            Err(DirectoryError::Malformed { .. })
        ));
        assert!(directory.is_empty());
    }

    #[tokio::test]
    async fn test_arc_delegation() {
        let directory = Arc::new(MemoryKeyDirectory::new());
        directory.register("alice", ALICE_RSA).unwrap();
        let shared: Arc<dyn KeyDirectory> = directory;

        assert!(shared.lookup(&Identity::parse("alice").unwrap()).await.is_ok());
    }
}
