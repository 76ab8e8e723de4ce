//! Flush engine metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for buffering and flushing
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Rows appended to buffer files
    pub rows_appended: AtomicU64,

    /// Files uploaded and deleted
    pub files_flushed: AtomicU64,

    /// Bytes uploaded
    pub bytes_flushed: AtomicU64,

    /// Files deleted after a permanent sink error
    pub files_dropped: AtomicU64,

    /// Files kept after a transient sink error
    pub files_retained: AtomicU64,

    /// Empty files deleted without an insert
    pub files_skipped: AtomicU64,

    /// Sweeps not started because the previous one was still running
    pub sweeps_skipped: AtomicU64,
}

impl EngineMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            rows_appended: AtomicU64::new(0),
            files_flushed: AtomicU64::new(0),
            bytes_flushed: AtomicU64::new(0),
            files_dropped: AtomicU64::new(0),
            files_retained: AtomicU64::new(0),
            files_skipped: AtomicU64::new(0),
            sweeps_skipped: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_rows(&self, count: u64) {
        self.rows_appended.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_flushed(&self, bytes: u64) {
        self.files_flushed.fetch_add(1, Ordering::Relaxed);
        self.bytes_flushed.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self) {
        self.files_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_retained(&self) {
        self.files_retained.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sweep_skipped(&self) {
        self.sweeps_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of metrics
    pub fn snapshot(&self) -> EngineMetricsSnapshot {
        EngineMetricsSnapshot {
            rows_appended: self.rows_appended.load(Ordering::Relaxed),
            files_flushed: self.files_flushed.load(Ordering::Relaxed),
            bytes_flushed: self.bytes_flushed.load(Ordering::Relaxed),
            files_dropped: self.files_dropped.load(Ordering::Relaxed),
            files_retained: self.files_retained.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            sweeps_skipped: self.sweeps_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of engine metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineMetricsSnapshot {
    pub rows_appended: u64,
    pub files_flushed: u64,
    pub bytes_flushed: u64,
    pub files_dropped: u64,
    pub files_retained: u64,
    pub files_skipped: u64,
    pub sweeps_skipped: u64,
}
