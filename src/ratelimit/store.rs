//! Counter stores backing the rate limiter.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

use super::counter::{CounterSnapshot, WindowCounter};
use crate::clock::{Clock, SystemClock};

/// Errors raised by a counter store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or did not answer.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Trait for window counter stores.
///
/// An increment is a single atomic unit per key: reading the counter,
/// resetting an expired window and adding the call happen together, so no
/// intermediate state is visible to concurrent callers.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count one call against `key` in a window of length `window`.
    async fn increment(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<CounterSnapshot, StoreError>;
}

/// In-process counter store sharded with DashMap.
///
/// Counters are created on first access and dropped by `purge_expired`
/// once their window has ended.
#[derive(Debug)]
pub struct LocalCounterStore {
    counters: DashMap<String, WindowCounter>,
    clock: Arc<dyn Clock>,
}

impl LocalCounterStore {
    /// Create a store reading time from the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create a store reading time from the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            clock,
        }
    }

    /// Count for `key` in its current window, if the window is still open.
    pub fn current_count(&self, key: &str) -> Option<u64> {
        let now = self.clock.now();
        self.counters
            .get(key)
            .filter(|counter| !counter.is_expired(now))
            .map(|counter| counter.count())
    }

    /// Drop every counter whose window has ended. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.counters.len();
        self.counters.retain(|_, counter| !counter.is_expired(now));
        let removed = before.saturating_sub(self.counters.len());
        if removed > 0 {
            debug!(removed, "Purged expired rate limit counters");
        }
        removed
    }

    /// Get the number of live counters.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Check whether the store holds no counters.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Clear all counters.
    pub fn clear(&self) {
        self.counters.clear();
    }
}

impl Default for LocalCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for LocalCounterStore {
    async fn increment(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<CounterSnapshot, StoreError> {
        let now = self.clock.now();

        // The entry guard holds the shard lock for the whole read-reset-increment.
        let mut counter = self.counters.entry(key.to_string()).or_insert_with(|| {
            debug!(key = %key, window_secs = window.as_secs(), "Creating new rate limit counter");
            WindowCounter::new(now, window)
        });
        let snapshot = counter.increment(now, window);

        trace!(key = %key, count = snapshot.count, "Counter incremented");
        Ok(snapshot)
    }
}
