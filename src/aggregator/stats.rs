//! Lock-free counters describing aggregator traffic.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters shared by an aggregator and its callers
#[derive(Debug, Default)]
pub struct AggregatorStats {
    check_hits: AtomicU64,
    check_misses: AtomicU64,
    check_refreshes: AtomicU64,
    reports_cached: AtomicU64,
    reports_sent_direct: AtomicU64,
    operations_flushed: AtomicU64,
}

/// Point-in-time copy of [`AggregatorStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub check_hits: u64,
    pub check_misses: u64,
    pub check_refreshes: u64,
    pub reports_cached: u64,
    pub reports_sent_direct: u64,
    pub operations_flushed: u64,
}

impl AggregatorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_check_hit(&self) {
        self.check_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_check_miss(&self) {
        self.check_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_check_refresh(&self) {
        self.check_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_report_cached(&self, operations: usize) {
        self.reports_cached.fetch_add(operations as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_report_sent_direct(&self) {
        self.reports_sent_direct.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flushed(&self, operations: usize) {
        self.operations_flushed.fetch_add(operations as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            check_hits: self.check_hits.load(Ordering::Relaxed),
            check_misses: self.check_misses.load(Ordering::Relaxed),
            check_refreshes: self.check_refreshes.load(Ordering::Relaxed),
            reports_cached: self.reports_cached.load(Ordering::Relaxed),
            reports_sent_direct: self.reports_sent_direct.load(Ordering::Relaxed),
            operations_flushed: self.operations_flushed.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Share of checks answered from cache, 0.0 when nothing was checked
    pub fn check_hit_ratio(&self) -> f64 {
        let total = self.check_hits + self.check_misses;
        if total == 0 {
            0.0
        } else {
            self.check_hits as f64 / total as f64
        }
    }
}
