//! Queue consumer
//!
//! Turns queue messages into buffered rows. Two message shapes are accepted:
//!
//! | Shape | Table from | Row(s) |
//! |-------|------------|--------|
//! | current | `table` header | body: a JSON object, or an array of objects |
//! | legacy | body `table` field | body `values` object, coerced per column |
//!
//! Current-shape rows are buffered as sent; a single-line object body is
//! written byte-for-byte. Legacy values go through the sink's type coercion
//! first.
//!
//! # Acknowledgement
//!
//! - Buffered → ACK
//! - No usable table name → ACK (dropped; redelivery cannot fix routing)
//! - Anything else → NACK after `nack_delay`, so a persistently failing disk
//!   or sink does not turn into a tight redelivery loop

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use spool_buffer::{BufferError, FlushEngine};
use spool_sinks::{DataSink, InvalidTableName, Row, SinkError, TableName};
use tokio_util::sync::CancellationToken;

use crate::stomp::{sleep_or_cancel, Acker, Message, Session, StompClient, StompError};

/// Header naming the destination table
pub const TABLE_HEADER: &str = "table";

/// What to tell the broker about a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Nack,
}

/// Errors turning a message into rows
#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    #[error("body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed payload: {0}")]
    Malformed(&'static str),

    #[error("type coercion failed: {0}")]
    Convert(#[from] SinkError),

    #[error("append failed: {0}")]
    Buffer(#[from] BufferError),
}

/// Where a message goes and what it carries
#[derive(Debug)]
enum Resolved {
    Current { table: TableName },
    Legacy { table: TableName, values: Value },
    /// Missing or unusable table name
    Unroutable { table: Option<String> },
}

// =============================================================================
// Metrics
// =============================================================================

/// Consumer counters
#[derive(Debug, Default)]
pub struct ConsumerMetrics {
    pub received: AtomicU64,
    /// Written to a buffer file
    pub buffered: AtomicU64,
    /// ACK frames handed to the connection
    pub acked: AtomicU64,
    /// NACK frames handed to the connection
    pub nacked: AtomicU64,
    /// Acked without buffering (no usable table)
    pub dropped: AtomicU64,
    /// ACK/NACK frames that could not be sent
    pub ack_failures: AtomicU64,
}

impl ConsumerMetrics {
    pub const fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            buffered: AtomicU64::new(0),
            acked: AtomicU64::new(0),
            nacked: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            ack_failures: AtomicU64::new(0),
        }
    }

    /// Get snapshot of metrics
    pub fn snapshot(&self) -> ConsumerMetricsSnapshot {
        ConsumerMetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            buffered: self.buffered.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            nacked: self.nacked.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            ack_failures: self.ack_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of consumer metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerMetricsSnapshot {
    pub received: u64,
    pub buffered: u64,
    pub acked: u64,
    pub nacked: u64,
    pub dropped: u64,
    pub ack_failures: u64,
}

// =============================================================================
// Consumer
// =============================================================================

/// Buffers queue messages and acknowledges them
pub struct QueueConsumer {
    engine: Arc<FlushEngine>,
    sink: Arc<dyn DataSink>,
    nack_delay: Duration,
    metrics: Arc<ConsumerMetrics>,
}

impl std::fmt::Debug for QueueConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConsumer")
            .field("sink", &self.sink.name())
            .field("nack_delay", &self.nack_delay)
            .finish()
    }
}

impl QueueConsumer {
    pub fn new(engine: Arc<FlushEngine>, sink: Arc<dyn DataSink>, nack_delay: Duration) -> Self {
        Self {
            engine,
            sink,
            nack_delay,
            metrics: Arc::new(ConsumerMetrics::new()),
        }
    }

    /// Current metrics
    pub fn metrics(&self) -> ConsumerMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Buffer one message and decide how to acknowledge it
    pub async fn received(&self, message: &Message) -> Disposition {
        self.metrics.received.fetch_add(1, Ordering::Relaxed);
        let body = message.body();

        let result = match resolve(message.header(TABLE_HEADER), body) {
            Resolved::Unroutable { table } => {
                self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    table = table.as_deref().unwrap_or(""),
                    message_id = message.message_id().unwrap_or(""),
                    "table name missing or invalid, dropping message"
                );
                return Disposition::Ack;
            }
            Resolved::Current { table } => self.buffer_current(&table, body).map(|_| table),
            Resolved::Legacy { table, values } => {
                self.buffer_legacy(&table, values).await.map(|_| table)
            }
        };

        match result {
            Ok(table) => {
                self.metrics.buffered.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(table = %table, "message buffered");
                Disposition::Ack
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    message_id = message.message_id().unwrap_or(""),
                    body = %String::from_utf8_lossy(body),
                    "failed to buffer message"
                );
                Disposition::Nack
            }
        }
    }

    fn buffer_current(&self, table: &TableName, body: &[u8]) -> Result<(), ConsumeError> {
        let rows = current_rows(body)?;
        self.engine.append(table, &rows)?;
        Ok(())
    }

    async fn buffer_legacy(&self, table: &TableName, values: Value) -> Result<(), ConsumeError> {
        let Value::Object(row) = values else {
            return Err(ConsumeError::Malformed("legacy `values` must be an object"));
        };
        let row: Row = self.sink.convert_row(table, row).await?;
        let line = serde_json::to_vec(&row)?;
        self.engine.append(table, &[line])?;
        Ok(())
    }

    /// Consume until cancelled, reconnecting whenever the connection drops
    ///
    /// Takes an already-open session for the first connection.
    pub async fn run(self: Arc<Self>, client: StompClient, mut session: Session, cancel: CancellationToken) {
        loop {
            match self.consume(&mut session, &cancel).await {
                Ok(()) => {
                    session.disconnect().await;
                    tracing::info!("queue consumer stopped");
                    return;
                }
                Err(e) => tracing::warn!(error = %e, "STOMP connection lost, reconnecting"),
            }

            if !sleep_or_cancel(client.config().reconnect_period, &cancel).await {
                return;
            }
            session = match client.open_with_retry(&cancel, false).await {
                Ok(Some(session)) => session,
                Ok(None) => return,
                Err(e) => {
                    tracing::error!(error = %e, "STOMP reconnect failed");
                    return;
                }
            };
        }
    }

    /// Read and dispatch messages; `Ok` only when cancelled
    async fn consume(self: &Arc<Self>, session: &mut Session, cancel: &CancellationToken) -> Result<(), StompError> {
        let acker = session.acker();
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = session.next_message() => match next? {
                    Some(message) => message,
                    None => return Err(StompError::Closed),
                },
            };

            let disposition = self.received(&message).await;
            self.settle(&acker, &message, disposition, cancel).await;
        }
    }

    async fn settle(
        self: &Arc<Self>,
        acker: &Acker,
        message: &Message,
        disposition: Disposition,
        cancel: &CancellationToken,
    ) {
        let Some(target) = message.ack_target() else {
            tracing::warn!(
                message_id = message.message_id().unwrap_or(""),
                "message has no ack id, cannot acknowledge"
            );
            return;
        };

        match disposition {
            Disposition::Ack => {
                match acker.ack(&target).await {
                    Ok(()) => {
                        self.metrics.acked.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        self.metrics.ack_failures.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(error = %e, "failed to ack message");
                    }
                }
            }
            Disposition::Nack => {
                let acker = acker.clone();
                let metrics = Arc::clone(&self.metrics);
                let delay = self.nack_delay;
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    // On shutdown the broker redelivers unacked messages anyway
                    if !sleep_or_cancel(delay, &cancel).await {
                        return;
                    }
                    match acker.nack(&target).await {
                        Ok(()) => {
                            metrics.nacked.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            metrics.ack_failures.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(error = %e, "failed to nack message");
                        }
                    }
                });
            }
        }
    }
}

/// Work out the table and shape of a message
fn resolve(header: Option<&str>, body: &[u8]) -> Resolved {
    if let Some(name) = header {
        return match TableName::new(name) {
            Ok(table) => Resolved::Current { table },
            Err(InvalidTableName(name)) => Resolved::Unroutable { table: Some(name) },
        };
    }

    let Ok(Value::Object(mut envelope)) = serde_json::from_slice::<Value>(body) else {
        return Resolved::Unroutable { table: None };
    };
    let table = match envelope.remove("table") {
        Some(Value::String(name)) => name,
        _ => return Resolved::Unroutable { table: None },
    };
    match TableName::new(table) {
        Ok(table) => Resolved::Legacy {
            table,
            values: envelope.remove("values").unwrap_or(Value::Null),
        },
        Err(InvalidTableName(name)) => Resolved::Unroutable { table: Some(name) },
    }
}

/// Split a current-shape body into NDJSON lines
///
/// A single-line object is kept exactly as sent. Objects spanning several
/// lines are re-serialized compactly, and arrays yield one line per element.
fn current_rows(body: &[u8]) -> Result<Vec<Vec<u8>>, ConsumeError> {
    let trimmed = body.trim_ascii();
    match serde_json::from_slice::<Value>(trimmed)? {
        Value::Object(_) if !trimmed.contains(&b'\n') && !trimmed.contains(&b'\r') => {
            Ok(vec![trimmed.to_vec()])
        }
        value @ Value::Object(_) => Ok(vec![serde_json::to_vec(&value)?]),
        Value::Array(items) => {
            if items.is_empty() {
                return Err(ConsumeError::Malformed("empty row array"));
            }
            items
                .iter()
                .map(|item| -> Result<Vec<u8>, ConsumeError> {
                    match item {
                        Value::Object(_) => Ok(serde_json::to_vec(item)?),
                        _ => Err(ConsumeError::Malformed("array elements must be objects")),
                    }
                })
                .collect()
        }
        _ => Err(ConsumeError::Malformed("body must be a JSON object or array of objects")),
    }
}

#[cfg(test)]
#[path = "consumer_test.rs"]
mod consumer_test;
