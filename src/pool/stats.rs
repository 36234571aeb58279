// src/pool/stats.rs

//! Point-in-time pool statistics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot returned by `ConnectionPool::stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Connections currently held by callers (including ones being created)
    pub lent: usize,
    /// Connections resting in the idle set
    pub idle: usize,
    /// `lent + idle`
    pub total: usize,
    /// Tasks waiting for an admission permit
    pub waiting: usize,
    pub max_total: usize,
    pub min_idle: usize,
    /// Connections opened by the factory since construction
    pub created: u64,
    /// Connections handed to the factory for destruction
    pub destroyed: u64,
    /// Successful acquires
    pub acquired: u64,
    /// Connections handed back through release
    pub released: u64,
    /// Connections reported broken through invalidate
    pub invalidated: u64,
    /// Acquires that timed out waiting for a permit
    pub exhausted: u64,
    /// Factory failures, on the acquire path or during refill
    pub creation_failures: u64,
}

/// Cumulative counters, updated without the core lock.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    created: AtomicU64,
    destroyed: AtomicU64,
    acquired: AtomicU64,
    released: AtomicU64,
    invalidated: AtomicU64,
    exhausted: AtomicU64,
    creation_failures: AtomicU64,
}

impl PoolCounters {
    pub fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_destroyed(&self) {
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acquired(&self) {
        self.acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_released(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidated(&self) {
        self.invalidated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_creation_failure(&self) {
        self.creation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Fill the cumulative half of a snapshot.
    pub fn fill(&self, stats: &mut PoolStats) {
        stats.created = self.created.load(Ordering::Relaxed);
        stats.destroyed = self.destroyed.load(Ordering::Relaxed);
        stats.acquired = self.acquired.load(Ordering::Relaxed);
        stats.released = self.released.load(Ordering::Relaxed);
        stats.invalidated = self.invalidated.load(Ordering::Relaxed);
        stats.exhausted = self.exhausted.load(Ordering::Relaxed);
        stats.creation_failures = self.creation_failures.load(Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = PoolCounters::default();
        counters.record_created();
        counters.record_created();
        counters.record_acquired();
        counters.record_released();
        counters.record_exhausted();
        counters.record_creation_failure();

        let mut stats = PoolStats::default();
        counters.fill(&mut stats);
        assert_eq!(stats.created, 2);
        assert_eq!(stats.acquired, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.invalidated, 0);
        assert_eq!(stats.exhausted, 1);
        assert_eq!(stats.creation_failures, 1);
    }

    #[test]
    fn test_stats_serialize_as_json() {
        let stats = PoolStats { lent: 2, idle: 1, total: 3, ..PoolStats::default() };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["lent"], 2);
        assert_eq!(json["total"], 3);
    }
}
