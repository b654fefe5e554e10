//! Counters describing how node trees use their caches and backends.
//!
//! Trees are request scoped; a single [`TreeStats`] is usually shared by all
//! of them through an `Arc` so the numbers add up across requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Operations tracked by the statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeOperation {
    Resolve,
    Children,
    Move,
    Copy,
}

impl TreeOperation {
    /// Returns a human-readable name for the operation type.
    pub fn name(&self) -> &'static str {
        match self {
            TreeOperation::Resolve => "resolve",
            TreeOperation::Children => "children",
            TreeOperation::Move => "move",
            TreeOperation::Copy => "copy",
        }
    }
}

/// Statistics for node tree activity.
#[derive(Debug, Default)]
pub struct TreeStats {
    /// Resolutions answered from the request cache
    pub cache_hits: AtomicU64,

    /// Resolutions that had to go to the view
    pub cache_misses: AtomicU64,

    /// Metadata lookups through the persistent index
    pub index_lookups: AtomicU64,

    /// Live scans for upload parts
    pub live_scans: AtomicU64,

    /// Cache entries dropped by invalidation
    pub invalidated_entries: AtomicU64,

    /// Completed operations by type
    operation_counts: DashMap<TreeOperation, AtomicU64>,

    /// Failed operations by type
    failure_counts: DashMap<TreeOperation, AtomicU64>,
}

impl TreeStats {
    /// Creates a new TreeStats instance with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of an operation.
    pub fn record(&self, op: TreeOperation, success: bool) {
        let counts = if success {
            &self.operation_counts
        } else {
            &self.failure_counts
        };
        counts
            .entry(op)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the number of successful operations of one type.
    pub fn operation_count(&self, op: TreeOperation) -> u64 {
        self.operation_counts
            .get(&op)
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Gets the number of failed operations of one type.
    pub fn failure_count(&self, op: TreeOperation) -> u64 {
        self.failure_counts
            .get(&op)
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Returns a snapshot of all successful operation counts.
    pub fn operation_counts(&self) -> HashMap<TreeOperation, u64> {
        self.operation_counts
            .iter()
            .map(|entry| (*entry.key(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }

    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_index_lookups(&self) {
        self.index_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_live_scans(&self) {
        self.live_scans.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_invalidated(&self, entries: u64) {
        self.invalidated_entries.fetch_add(entries, Ordering::Relaxed);
    }

    /// Returns the cache hit rate as a percentage (0.0 to 100.0).
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;

        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    /// Resets all statistics to zero.
    pub fn reset(&self) {
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.index_lookups.store(0, Ordering::Relaxed);
        self.live_scans.store(0, Ordering::Relaxed);
        self.invalidated_entries.store(0, Ordering::Relaxed);
        self.operation_counts.clear();
        self.failure_counts.clear();
    }
}
