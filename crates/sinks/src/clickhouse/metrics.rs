//! ClickHouse adapter metrics
//!
//! Atomic counters for tracking adapter traffic and health.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for the ClickHouse adapter
#[derive(Debug, Default)]
pub struct ClickHouseMetrics {
    /// Read statements executed (`execute`)
    pub statements_executed: AtomicU64,

    /// Successful batched inserts
    pub inserts_written: AtomicU64,

    /// Body bytes shipped by successful inserts
    pub bytes_written: AtomicU64,

    /// Schema fetches (`DESCRIBE TABLE`)
    pub schema_fetches: AtomicU64,

    /// Failed requests of any kind
    pub request_errors: AtomicU64,
}

impl ClickHouseMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            statements_executed: AtomicU64::new(0),
            inserts_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            schema_fetches: AtomicU64::new(0),
            request_errors: AtomicU64::new(0),
        }
    }

    /// Record an executed statement
    #[inline]
    pub fn record_statement(&self) {
        self.statements_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful insert of `bytes` body bytes
    #[inline]
    pub fn record_insert(&self, bytes: u64) {
        self.inserts_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a schema fetch
    #[inline]
    pub fn record_schema_fetch(&self) {
        self.schema_fetches.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed request
    #[inline]
    pub fn record_error(&self) {
        self.request_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            statements_executed: self.statements_executed.load(Ordering::Relaxed),
            inserts_written: self.inserts_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            schema_fetches: self.schema_fetches.load(Ordering::Relaxed),
            request_errors: self.request_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub statements_executed: u64,
    pub inserts_written: u64,
    pub bytes_written: u64,
    pub schema_fetches: u64,
    pub request_errors: u64,
}
