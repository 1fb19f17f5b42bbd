//! ## memlist-core::alloc::stats
//! **Allocation statistics and tracking**
//!
//! Counters are updated while the allocator lock is held, but they are plain
//! atomics so readers never need that lock.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Thread-safe allocator counters.
#[derive(Debug, Default)]
pub struct AllocStats {
    allocations: AtomicUsize,
    failed_allocations: AtomicUsize,
    frees: AtomicUsize,
    ignored_frees: AtomicUsize,
    resizes_in_place: AtomicUsize,
    relocations: AtomicUsize,
    failed_resizes: AtomicUsize,
    splits: AtomicUsize,
    merges: AtomicUsize,
}

/// Point-in-time copy of [`AllocStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub allocations: usize,
    pub failed_allocations: usize,
    pub frees: usize,
    pub ignored_frees: usize,
    pub resizes_in_place: usize,
    pub relocations: usize,
    pub failed_resizes: usize,
    pub splits: usize,
    pub merges: usize,
}

impl AllocStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_allocation(&self) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failed_allocation(&self) {
        self.failed_allocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_free(&self) {
        self.frees.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ignored_free(&self) {
        self.ignored_frees.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_resize_in_place(&self) {
        self.resizes_in_place.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_relocation(&self) {
        self.relocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failed_resize(&self) {
        self.failed_resizes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_split(&self) {
        self.splits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_merges(&self, count: usize) {
        if count > 0 {
            self.merges.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            ignored_frees: self.ignored_frees.load(Ordering::Relaxed),
            resizes_in_place: self.resizes_in_place.load(Ordering::Relaxed),
            relocations: self.relocations.load(Ordering::Relaxed),
            failed_resizes: self.failed_resizes.load(Ordering::Relaxed),
            splits: self.splits.load(Ordering::Relaxed),
            merges: self.merges.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Allocations not yet matched by a free.
    pub fn outstanding(&self) -> usize {
        self.allocations.saturating_sub(self.frees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_stats_increment_and_read() {
        let stats = AllocStats::new();
        assert_eq!(stats.allocations(), 0);
        assert_eq!(stats.frees(), 0);

        stats.record_allocation();
        stats.record_allocation();
        stats.record_free();

        assert_eq!(stats.allocations(), 2);
        assert_eq!(stats.frees(), 1);
        assert_eq!(stats.snapshot().outstanding(), 1);
    }

    #[test]
    fn test_alloc_stats_merges_skip_zero() {
        let stats = AllocStats::new();
        stats.record_merges(0);
        stats.record_merges(3);
        stats.record_split();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.merges, 3);
        assert_eq!(snapshot.splits, 1);
        assert_eq!(snapshot.failed_allocations, 0);
    }
}
