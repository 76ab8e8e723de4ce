//! Flush engine
//!
//! Decides when a table's buffer is ready to ship and drives the
//! rotate → read → insert → delete cycle for each file.
//!
//! # Eligibility
//!
//! | Condition | Eligible |
//! |-----------|----------|
//! | engine not started yet | always (drain on boot) |
//! | nothing pending | no |
//! | oldest pending row ≥ `max_delay` | yes |
//! | active file ≥ `max_file_size` | yes |
//!
//! # Outcomes
//!
//! A file that uploads is deleted. A permanent sink error (the table is
//! gone) also deletes it, since retrying cannot succeed. A transient error
//! keeps the rotated file for the next recovery sweep.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use spool_config::BufferConfig;
use spool_sinks::{DataSink, TableName};

use crate::error::{BufferError, Result};
use crate::guard::SweepFlag;
use crate::metrics::{EngineMetrics, EngineMetricsSnapshot};
use crate::store::{BufferFile, BufferStore};

/// Result of flushing one buffer file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Uploaded and deleted
    Flushed { bytes: u64 },
    /// Empty or whitespace-only, deleted without an insert
    Skipped,
    /// Permanent sink error, deleted
    Dropped,
    /// Transient sink error, kept for recovery
    Retained,
    /// Nothing to do (no active file, or another sweep owns the file)
    Nothing,
}

/// Totals for one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub files_flushed: u64,
    pub bytes_flushed: u64,
    pub files_skipped: u64,
    pub files_dropped: u64,
    pub files_retained: u64,
    /// Files that failed with a local I/O error
    pub errors: u64,
}

impl SweepStats {
    fn record(&mut self, outcome: FlushOutcome) {
        match outcome {
            FlushOutcome::Flushed { bytes } => {
                self.files_flushed += 1;
                self.bytes_flushed += bytes;
            }
            FlushOutcome::Skipped => self.files_skipped += 1,
            FlushOutcome::Dropped => self.files_dropped += 1,
            FlushOutcome::Retained => self.files_retained += 1,
            FlushOutcome::Nothing => {}
        }
    }

    /// Files the sweep touched
    pub fn files(&self) -> u64 {
        self.files_flushed + self.files_skipped + self.files_dropped + self.files_retained
    }
}

/// Buffers rows per table and ships them to the sink in batches
pub struct FlushEngine {
    store: BufferStore,
    sink: Arc<dyn DataSink>,
    max_delay: Duration,
    max_file_size: u64,
    started: AtomicBool,
    scheduled: SweepFlag,
    forced: SweepFlag,
    /// Rotated files currently being uploaded
    in_flight: Mutex<HashSet<PathBuf>>,
    metrics: EngineMetrics,
}

impl std::fmt::Debug for FlushEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushEngine")
            .field("dir", &self.store.dir())
            .field("sink", &self.sink.name())
            .field("max_delay", &self.max_delay)
            .field("max_file_size", &self.max_file_size)
            .field("started", &self.is_started())
            .finish()
    }
}

impl FlushEngine {
    /// Create an engine over an open store
    pub fn new(store: BufferStore, sink: Arc<dyn DataSink>, config: &BufferConfig) -> Self {
        Self {
            store,
            sink,
            max_delay: config.max_delay,
            max_file_size: config.max_file_size,
            started: AtomicBool::new(false),
            scheduled: SweepFlag::new(),
            forced: SweepFlag::new(),
            in_flight: Mutex::new(HashSet::new()),
            metrics: EngineMetrics::new(),
        }
    }

    /// Underlying store
    pub fn store(&self) -> &BufferStore {
        &self.store
    }

    /// Leave boot mode; from now on eligibility is age/size based
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    /// True once startup draining has finished
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Current metrics
    pub fn metrics(&self) -> EngineMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Buffer rows for a table
    pub fn append<R: AsRef<[u8]>>(&self, table: &TableName, rows: &[R]) -> Result<()> {
        self.store.append_batch(table, rows)?;
        self.metrics.record_rows(rows.len() as u64);
        Ok(())
    }

    /// Whether a table's active buffer should be shipped now
    pub fn eligible(&self, table: &TableName) -> bool {
        if !self.is_started() {
            return true;
        }
        let Some(since) = self.store.pending_since(table) else {
            return false;
        };
        if since.elapsed() >= self.max_delay {
            return true;
        }
        self.store.active_size(table) >= self.max_file_size
    }

    /// Flush every eligible active buffer
    ///
    /// Returns `None` without doing anything if the previous scheduled sweep
    /// is still running.
    pub async fn scheduled_sweep(&self) -> Option<SweepStats> {
        let Some(_guard) = self.scheduled.try_acquire() else {
            self.metrics.record_sweep_skipped();
            tracing::debug!("scheduled sweep still running, skipping");
            return None;
        };

        let files = self.list_or_log();
        let mut stats = SweepStats::default();
        for file in files.iter().filter(|f| f.is_active()) {
            if !self.eligible(&file.table) {
                continue;
            }
            self.flush_into(file, &mut stats).await;
        }

        log_sweep("scheduled", &stats);
        Some(stats)
    }

    /// Flush every buffer file, active or rotated, regardless of eligibility
    ///
    /// Used once at startup and periodically to recover rotated files left
    /// behind by transient failures or a crash.
    pub async fn forced_sweep(&self) -> Option<SweepStats> {
        let Some(_guard) = self.forced.try_acquire() else {
            self.metrics.record_sweep_skipped();
            tracing::debug!("forced sweep still running, skipping");
            return None;
        };

        let files = self.list_or_log();
        let mut stats = SweepStats::default();
        for file in &files {
            self.flush_into(file, &mut stats).await;
        }

        log_sweep("forced", &stats);
        Some(stats)
    }

    fn list_or_log(&self) -> Vec<BufferFile> {
        self.store.list().unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to list buffer files");
            Vec::new()
        })
    }

    async fn flush_into(&self, file: &BufferFile, stats: &mut SweepStats) {
        match self.flush_one(file).await {
            Ok(outcome) => stats.record(outcome),
            Err(e) => {
                stats.errors += 1;
                tracing::error!(table = %file.table, error = %e, "failed to flush buffer file");
            }
        }
    }

    /// Ship one buffer file
    ///
    /// Active files are rotated first; rotated files are used as they are.
    pub async fn flush_one(&self, file: &BufferFile) -> Result<FlushOutcome> {
        let path = if file.is_active() {
            match self.store.rotate(&file.table)? {
                Some(path) => path,
                None => return Ok(FlushOutcome::Nothing),
            }
        } else {
            file.path.clone()
        };

        let Some(_claim) = InFlight::claim(&self.in_flight, &path) else {
            return Ok(FlushOutcome::Nothing);
        };
        self.upload(&file.table, &path).await
    }

    async fn upload(&self, table: &TableName, path: &Path) -> Result<FlushOutcome> {
        let contents = match tokio::fs::read(path).await {
            Ok(contents) => contents,
            // Already uploaded by an earlier pass
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FlushOutcome::Nothing),
            Err(e) => return Err(BufferError::io("read", path, e)),
        };

        if contents.iter().all(u8::is_ascii_whitespace) {
            remove(path).await?;
            self.metrics.record_skipped();
            tracing::debug!(table = %table, path = %path.display(), "deleted empty buffer file");
            return Ok(FlushOutcome::Skipped);
        }

        let bytes = contents.len() as u64;
        match self.sink.insert(table, Bytes::from(contents)).await {
            Ok(()) => {
                remove(path).await?;
                self.metrics.record_flushed(bytes);
                tracing::info!(table = %table, bytes, "buffer flushed");
                Ok(FlushOutcome::Flushed { bytes })
            }
            Err(e) if e.is_permanent() => {
                remove(path).await?;
                self.metrics.record_dropped();
                tracing::error!(
                    table = %table,
                    bytes,
                    error = %e,
                    "permanent insert failure, buffer file dropped"
                );
                Ok(FlushOutcome::Dropped)
            }
            Err(e) => {
                self.metrics.record_retained();
                tracing::warn!(
                    table = %table,
                    path = %path.display(),
                    error = %e,
                    "insert failed, keeping buffer file for recovery"
                );
                Ok(FlushOutcome::Retained)
            }
        }
    }
}

async fn remove(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BufferError::io("delete", path, e)),
    }
}

fn log_sweep(kind: &'static str, stats: &SweepStats) {
    if stats.files() == 0 && stats.errors == 0 {
        tracing::trace!(kind, "sweep found nothing to flush");
        return;
    }
    tracing::info!(
        kind,
        flushed = stats.files_flushed,
        bytes = stats.bytes_flushed,
        skipped = stats.files_skipped,
        dropped = stats.files_dropped,
        retained = stats.files_retained,
        errors = stats.errors,
        "sweep finished"
    );
}

/// Marks a rotated file as owned by one sweep until dropped
struct InFlight<'a> {
    set: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl<'a> InFlight<'a> {
    fn claim(set: &'a Mutex<HashSet<PathBuf>>, path: &Path) -> Option<Self> {
        set.lock().insert(path.to_path_buf()).then(|| Self {
            set,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.path);
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;
