//! Atomic request counters.
//!
//! All atomics use `Relaxed` ordering: these are monotonic display counters
//! with no synchronization requirements.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::router::RoutedOutcome;

#[derive(Default)]
struct StatsInner {
    total_requests: AtomicU64,
    proxied: AtomicU64,
    not_proxied: AtomicU64,
    upstream_errors: AtomicU64,
}

/// Thread-safe request counters. Cheap to clone (Arc).
#[derive(Clone, Default)]
pub struct ProxyStats {
    inner: Arc<StatsInner>,
}

/// Snapshot of current counter values, serializable to JSON.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub proxied: u64,
    pub not_proxied: u64,
    pub upstream_errors: u64,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one routed request by its outcome.
    pub fn record(&self, outcome: &RoutedOutcome) {
        self.inner.total_requests.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            RoutedOutcome::NotProxied(_) => &self.inner.not_proxied,
            RoutedOutcome::Proxied(_) => &self.inner.proxied,
            RoutedOutcome::UpstreamError(_) => &self.inner.upstream_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.inner.total_requests.load(Ordering::Relaxed),
            proxied: self.inner.proxied.load(Ordering::Relaxed),
            not_proxied: self.inner.not_proxied.load(Ordering::Relaxed),
            upstream_errors: self.inner.upstream_errors.load(Ordering::Relaxed),
        }
    }
}
