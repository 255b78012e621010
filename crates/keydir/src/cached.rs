//! TTL cache in front of any [`KeyDirectory`].
//!
//! ```text
//! lookup(identity)
//!   → cache hit?  return record
//!   → miss        single-flight fetch from the inner directory
//!                 → Ok   cache for `ttl`, return
//!                 → Err  return to every waiter, cache nothing
//! ```
//!
//! Concurrent misses for the same identity coalesce into one inner lookup.
//! Failures are never cached, so an identity registered after a `NotFound`
//! becomes visible on the next lookup.
//!
//! A cached key stays trusted for up to `ttl` after it is removed from the
//! inner directory. Call [`CachedKeyDirectory::invalidate`] on revocation.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use moka::future::Cache;

use crate::{
    directory::KeyDirectory,
    error::{DirectoryError, DirectoryResult},
    identity::Identity,
    record::KeyRecord,
};

/// Default time-to-live for cached records (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default maximum number of cached identities.
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Caching decorator over a [`KeyDirectory`].
pub struct CachedKeyDirectory {
    cache: Cache<Identity, KeyRecord>,
    inner: Arc<dyn KeyDirectory>,
}

impl CachedKeyDirectory {
    /// Wraps `inner` with the given TTL and [`DEFAULT_CACHE_CAPACITY`].
    #[must_use]
    pub fn new(inner: Arc<dyn KeyDirectory>, ttl: Duration) -> Self {
        Self::with_capacity(inner, ttl, DEFAULT_CACHE_CAPACITY)
    }

    /// Wraps `inner` with a custom TTL and capacity.
    #[must_use]
    pub fn with_capacity(inner: Arc<dyn KeyDirectory>, ttl: Duration, max_capacity: u64) -> Self {
        Self {
            cache: Cache::builder().time_to_live(ttl).max_capacity(max_capacity).build(),
            inner,
        }
    }

    /// Drops the cached record for `identity`.
    #[tracing::instrument(skip(self), fields(identity = %identity))]
    pub async fn invalidate(&self, identity: &Identity) {
        self.cache.invalidate(identity).await;
        tracing::info!(
            audit.action = "invalidate_key_cache",
            audit.resource = %identity,
            audit.result = "success",
            "audit_event"
        );
    }

    /// Drops every cached record.
    pub fn invalidate_all(&self) {
        let evicted = self.cache.entry_count();
        self.cache.invalidate_all();
        tracing::info!(
            audit.action = "clear_key_cache",
            audit.resource = "all_identities",
            audit.result = "success",
            audit.evicted = evicted,
            "audit_event"
        );
    }

    /// Approximate number of cached records.
    ///
    /// Eventually consistent; pending inserts may not be counted yet.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    #[cfg(test)]
    async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl std::fmt::Debug for CachedKeyDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedKeyDirectory")
            .field("entry_count", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyDirectory for CachedKeyDirectory {
    #[tracing::instrument(skip(self), fields(identity = %identity))]
    async fn lookup(&self, identity: &Identity) -> DirectoryResult<KeyRecord> {
        if let Some(record) = self.cache.get(identity).await {
            tracing::debug!(cache = "hit", "key cache hit");
            return Ok(record);
        }
        tracing::debug!(cache = "miss", "key cache miss");

        self.cache
            .try_get_with(identity.clone(), self.inner.lookup(identity))
            .await
            .map_err(|shared: Arc<DirectoryError>| DirectoryError::clone(&shared))
    }
}
