//! Discovery statistics with atomic counters.
//!
//! [`DiscoveryStats`] accumulates totals across cycles and can be shared with
//! whoever reports on the service. [`CycleReport`] describes one cycle.
//!
//! # Thread Safety
//!
//! All counters use [`AtomicU64`] with [`Relaxed`](std::sync::atomic::Ordering::Relaxed)
//! ordering. The numbers are informational and need no ordering guarantees.
//!
//! # Examples
//!
//! ```
//! use snapfeed_discovery::{CycleReport, DiscoveryStats};
//!
//! let stats = DiscoveryStats::new();
//! let mut report = CycleReport::new(3);
//! report.published = 1;
//! report.unchanged = 2;
//! stats.record(&report);
//!
//! let totals = stats.snapshot();
//! assert_eq!(totals.cycles, 1);
//! assert_eq!(totals.published, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The outcome of one discovery cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CycleReport {
    /// Number of sources examined.
    pub sources: usize,
    /// Sources for which a new snapshot was published.
    pub published: usize,
    /// Sources whose newest snapshot was already known.
    pub unchanged: usize,
    /// Sources with no completed snapshot yet.
    pub empty: usize,
    /// Sources skipped because of a listing, read, or registration failure.
    pub failed: usize,
    /// Per-source state dropped because the source is no longer tracked.
    pub evicted: usize,
    /// Wall-clock time the cycle took.
    pub elapsed: Duration,
}

impl CycleReport {
    /// Creates an empty report for a cycle over `sources` sources.
    #[inline]
    #[must_use]
    pub fn new(sources: usize) -> Self {
        Self {
            sources,
            ..Self::default()
        }
    }

    /// Returns `true` if at least one snapshot was published.
    #[inline]
    #[must_use]
    pub fn has_published(&self) -> bool {
        self.published > 0
    }
}

/// Cumulative counters over every cycle of one discovery strategy.
#[derive(Debug, Default)]
pub struct DiscoveryStats {
    cycles: AtomicU64,
    published: AtomicU64,
    failed: AtomicU64,
    evicted: AtomicU64,
}

impl DiscoveryStats {
    /// Creates a new [`DiscoveryStats`] with all counters at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one cycle into the totals.
    pub fn record(&self, report: &CycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.published
            .fetch_add(report.published as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
        self.evicted.fetch_add(report.evicted as u64, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`DiscoveryStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Completed cycles.
    pub cycles: u64,
    /// Snapshots published.
    pub published: u64,
    /// Per-source failures.
    pub failed: u64,
    /// Sources evicted after removal.
    pub evicted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let stats = DiscoveryStats::new();
        let mut report = CycleReport::new(2);
        report.published = 1;
        report.failed = 1;
        stats.record(&report);
        stats.record(&report);

        let snap = stats.snapshot();
        assert_eq!(snap.cycles, 2);
        assert_eq!(snap.published, 2);
        assert_eq!(snap.failed, 2);
        assert_eq!(snap.evicted, 0);
    }

    #[test]
    fn test_report_serializes() {
        let mut report = CycleReport::new(4);
        report.empty = 4;
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"empty\":4"));
        assert!(!report.has_published());
    }
}
