//! Counters for exchange outcomes and key lookup latency.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use keyrelay_authn::{ErrorKind, metrics::ExchangeMetrics};
//!
//! let metrics = ExchangeMetrics::new();
//! metrics.record_lookup(Duration::from_micros(400));
//! metrics.record_issued();
//! metrics.record_rejected(ErrorKind::SignatureError);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.total_exchanges(), 2);
//! assert_eq!(snapshot.rejected_signature, 1);
//! assert_eq!(snapshot.avg_lookup_latency_us(), 400.0);
//! ```

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::error::ErrorKind;

/// Point-in-time copy of [`ExchangeMetrics`].
#[derive(Debug, Clone, Default, PartialEq, bon::Builder)]
pub struct ExchangeMetricsSnapshot {
    /// Session tokens issued.
    #[builder(default)]
    pub issued: u64,

    // Rejections by kind
    /// Assertions without an issuer.
    #[builder(default)]
    pub rejected_missing_parameter: u64,
    /// Unknown or invalid identities.
    #[builder(default)]
    pub rejected_not_found: u64,
    /// Unparseable assertions or key material.
    #[builder(default)]
    pub rejected_malformed: u64,
    /// Signature, algorithm or issuer binding failures.
    #[builder(default)]
    pub rejected_signature: u64,
    /// Expired or not-yet-valid assertions.
    #[builder(default)]
    pub rejected_time: u64,
    /// Directory outages and timeouts.
    #[builder(default)]
    pub rejected_unavailable: u64,
    /// Failures on our side.
    #[builder(default)]
    pub rejected_internal: u64,

    /// Completed key lookups, successful or not.
    #[builder(default)]
    pub lookup_count: u64,
    /// Cumulative key lookup latency in microseconds.
    #[builder(default)]
    pub lookup_latency_us: u64,
}

impl ExchangeMetricsSnapshot {
    /// Total rejections.
    #[must_use]
    pub fn total_rejected(&self) -> u64 {
        self.rejected_missing_parameter
            + self.rejected_not_found
            + self.rejected_malformed
            + self.rejected_signature
            + self.rejected_time
            + self.rejected_unavailable
            + self.rejected_internal
    }

    /// Issued plus rejected.
    #[must_use]
    pub fn total_exchanges(&self) -> u64 {
        self.issued + self.total_rejected()
    }

    /// Fraction of exchanges rejected (0.0 to 1.0).
    #[must_use]
    pub fn rejection_rate(&self) -> f64 {
        let total = self.total_exchanges();
        if total == 0 { 0.0 } else { self.total_rejected() as f64 / total as f64 }
    }

    /// Average key lookup latency in microseconds.
    #[must_use]
    pub fn avg_lookup_latency_us(&self) -> f64 {
        if self.lookup_count == 0 {
            0.0
        } else {
            self.lookup_latency_us as f64 / self.lookup_count as f64
        }
    }
}

#[derive(Default)]
struct Inner {
    issued: AtomicU64,
    rejected_missing_parameter: AtomicU64,
    rejected_not_found: AtomicU64,
    rejected_malformed: AtomicU64,
    rejected_signature: AtomicU64,
    rejected_time: AtomicU64,
    rejected_unavailable: AtomicU64,
    rejected_internal: AtomicU64,
    lookup_count: AtomicU64,
    lookup_latency_us: AtomicU64,
}

/// Lock-free exchange counters. Clones share the same counters.
#[derive(Clone, Default)]
pub struct ExchangeMetrics {
    inner: Arc<Inner>,
}

impl ExchangeMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts an issued session token.
    pub fn record_issued(&self) {
        self.inner.issued.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a rejection of the given kind.
    pub fn record_rejected(&self, kind: ErrorKind) {
        let counter = match kind {
            ErrorKind::MissingParameter => &self.inner.rejected_missing_parameter,
            ErrorKind::NotFound => &self.inner.rejected_not_found,
            ErrorKind::Malformed => &self.inner.rejected_malformed,
            ErrorKind::SignatureError => &self.inner.rejected_signature,
            ErrorKind::Expired | ErrorKind::NotYetValid => &self.inner.rejected_time,
            ErrorKind::Unavailable => &self.inner.rejected_unavailable,
            ErrorKind::Internal => &self.inner.rejected_internal,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one key lookup's wall time.
    pub fn record_lookup(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.inner.lookup_count.fetch_add(1, Ordering::Relaxed);
        self.inner.lookup_latency_us.fetch_add(micros, Ordering::Relaxed);
    }

    /// Reads all counters.
    #[must_use]
    pub fn snapshot(&self) -> ExchangeMetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        ExchangeMetricsSnapshot::builder()
            .issued(load(&self.inner.issued))
            .rejected_missing_parameter(load(&self.inner.rejected_missing_parameter))
            .rejected_not_found(load(&self.inner.rejected_not_found))
            .rejected_malformed(load(&self.inner.rejected_malformed))
            .rejected_signature(load(&self.inner.rejected_signature))
            .rejected_time(load(&self.inner.rejected_time))
            .rejected_unavailable(load(&self.inner.rejected_unavailable))
            .rejected_internal(load(&self.inner.rejected_internal))
            .lookup_count(load(&self.inner.lookup_count))
            .lookup_latency_us(load(&self.inner.lookup_latency_us))
            .build()
    }
}

impl fmt::Debug for ExchangeMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExchangeMetrics").field(&self.snapshot()).finish()
    }
}
