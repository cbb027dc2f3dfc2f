//! Abstract atomic-counter capability and the in-process backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

/// Failure talking to the counter store.
///
/// Both variants mean the same thing to enforcement: the ledger's state
/// could not be confirmed, so the caller must treat the request as denied.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    #[error("counter store operation timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(feature = "redis-backend")]
pub(crate) trait StoreResultExt<T> {
    fn store_err(self) -> StoreResult<T>;
    fn store_err_ctx(self, context: &str) -> StoreResult<T>;
}

#[cfg(feature = "redis-backend")]
impl<T, E: std::fmt::Display> StoreResultExt<T> for std::result::Result<T, E> {
    fn store_err(self) -> StoreResult<T> {
        self.map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn store_err_ctx(self, context: &str) -> StoreResult<T> {
        self.map_err(|e| StoreError::Unavailable(format!("{}: {}", context, e)))
    }
}

/// Atomic daily-counter backend, the only source of truth for spend
/// totals.
///
/// One key holds one integer counter (nanodollars). `incr_by` must be
/// indivisible with respect to every other concurrent caller of the same
/// key; that per-key total order is what rules out lost updates. No
/// implementation retries on its own.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Backend label for logs and health reporting.
    fn name(&self) -> &str;

    /// Atomically add `delta` to `key` and return the post-increment total.
    ///
    /// Creates the counter at zero if absent, and (re)applies `ttl` on
    /// every call so a burst of late-day traffic keeps refreshing the
    /// expiry while the key itself still rotates at the UTC day boundary.
    async fn incr_by(&self, key: &str, delta: i64, ttl: Duration) -> StoreResult<i64>;

    /// Current total for `key`; zero when the key is missing or expired.
    async fn fetch(&self, key: &str) -> StoreResult<i64>;

    /// Lightweight reachability probe.
    async fn ping(&self) -> StoreResult<()>;
}

#[derive(Debug, Clone, Copy)]
struct CounterCell {
    total: i64,
    expires_at: SystemTime,
}

impl CounterCell {
    fn expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

/// In-process counter store backed by a concurrent map.
///
/// The test substrate, also usable for single-process deployments.
/// Entries honor their TTL lazily, on the next access after expiry; a
/// shard lock makes each increment atomic per key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: DashMap<String, CounterCell>,
    ops: AtomicU64,
}

/// Increments between sweeps of expired cells.
const SWEEP_INTERVAL: u64 = 64;

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rotated day keys are never read again after the UTC boundary, so
    /// lazy eviction alone would let dead cells pile up; sweep them out
    /// every [`SWEEP_INTERVAL`]th increment instead.
    fn maybe_sweep(&self, now: SystemTime) {
        if self.ops.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == 0 {
            self.counters.retain(|_, cell| !cell.expired(now));
        }
    }

    #[cfg(test)]
    fn raw_len(&self) -> usize {
        self.counters.len()
    }

    /// Number of live (unexpired) counters.
    pub fn len(&self) -> usize {
        let now = SystemTime::now();
        self.counters
            .iter()
            .filter(|entry| !entry.value().expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn incr_by(&self, key: &str, delta: i64, ttl: Duration) -> StoreResult<i64> {
        let now = SystemTime::now();
        self.maybe_sweep(now);
        let mut entry = self.counters.entry(key.to_string()).or_insert(CounterCell {
            total: 0,
            expires_at: now + ttl,
        });
        if entry.expired(now) {
            entry.total = 0;
        }
        entry.total = entry.total.saturating_add(delta);
        entry.expires_at = now + ttl;
        Ok(entry.total)
    }

    async fn fetch(&self, key: &str) -> StoreResult<i64> {
        let now = SystemTime::now();
        match self.counters.get(key) {
            None => return Ok(0),
            Some(entry) if !entry.expired(now) => return Ok(entry.total),
            Some(_) => {}
        }
        // Guard dropped above; re-check under the shard lock so a
        // concurrent refresh is not clobbered.
        self.counters.remove_if(key, |_, cell| cell.expired(now));
        Ok(0)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
