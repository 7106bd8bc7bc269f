//! Global atomic counters for version-control observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. on a maintenance tick).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters — no allocations, no locking.
pub struct Metrics {
    commits_created: AtomicU64,
    tip_conflicts: AtomicU64,
    history_fast_path: AtomicU64,
    history_fallback: AtomicU64,
    capability_rejections: AtomicU64,
    forks_created: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            commits_created: AtomicU64::new(0),
            tip_conflicts: AtomicU64::new(0),
            history_fast_path: AtomicU64::new(0),
            history_fallback: AtomicU64::new(0),
            capability_rejections: AtomicU64::new(0),
            forks_created: AtomicU64::new(0),
        }
    }

    /// Increment the commits-created counter by one.
    pub fn inc_commits_created(&self) {
        self.commits_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the tip-conflicts counter by one.
    pub fn inc_tip_conflicts(&self) {
        self.tip_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the history fast-path counter by one.
    pub fn inc_history_fast_path(&self) {
        self.history_fast_path.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the history fallback-walk counter by one.
    pub fn inc_history_fallback(&self) {
        self.history_fallback.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the capability-rejections counter by one.
    pub fn inc_capability_rejections(&self) {
        self.capability_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the forks-created counter by one.
    pub fn inc_forks_created(&self) {
        self.forks_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (maintenance tick, backfill sweep)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            commits_created = self.commits_created(),
            tip_conflicts = self.tip_conflicts(),
            history_fast_path = self.history_fast_path(),
            history_fallback = self.history_fallback(),
            capability_rejections = self.capability_rejections(),
            forks_created = self.forks_created(),
        );
    }

    /// Read the current commits-created count.
    pub fn commits_created(&self) -> u64 {
        self.commits_created.load(Ordering::Relaxed)
    }

    /// Read the current tip-conflicts count.
    pub fn tip_conflicts(&self) -> u64 {
        self.tip_conflicts.load(Ordering::Relaxed)
    }

    /// Read the current history fast-path count.
    pub fn history_fast_path(&self) -> u64 {
        self.history_fast_path.load(Ordering::Relaxed)
    }

    /// Read the current history fallback-walk count.
    pub fn history_fallback(&self) -> u64 {
        self.history_fallback.load(Ordering::Relaxed)
    }

    /// Read the current capability-rejections count.
    pub fn capability_rejections(&self) -> u64 {
        self.capability_rejections.load(Ordering::Relaxed)
    }

    /// Read the current forks-created count.
    pub fn forks_created(&self) -> u64 {
        self.forks_created.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.commits_created.store(0, Ordering::Relaxed);
        self.tip_conflicts.store(0, Ordering::Relaxed);
        self.history_fast_path.store(0, Ordering::Relaxed);
        self.history_fallback.store(0, Ordering::Relaxed);
        self.capability_rejections.store(0, Ordering::Relaxed);
        self.forks_created.store(0, Ordering::Relaxed);
    }
}
