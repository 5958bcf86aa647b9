use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters for a tag pool. Updated by every successful or failed operation on the pool.
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Successful allocations, including those made by `next_available`
    allocations: AtomicUsize,
    /// Successful releases
    releases: AtomicUsize,
    /// Releases that returned tags which were already free
    double_releases: AtomicUsize,
    /// Calls that found no tag available
    exhausted: AtomicUsize,
}

impl PoolStats {
    #[inline]
    pub(crate) fn increment_allocations(&self) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_releases(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_double_releases(&self) {
        self.double_releases.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of successful allocations.
    #[inline]
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Returns the number of successful releases.
    #[inline]
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::Relaxed)
    }

    /// Returns the number of releases that found tags already free.
    #[inline]
    pub fn double_releases(&self) -> usize {
        self.double_releases.load(Ordering::Relaxed)
    }

    /// Returns the number of calls that found no tag available.
    #[inline]
    pub fn exhausted(&self) -> usize {
        self.exhausted.load(Ordering::Relaxed)
    }
}
