//! Tests for the flush engine

use std::collections::VecDeque;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use spool_config::BufferConfig;
use spool_sinks::{DataSink, SinkError, TableName};
use tokio::sync::Notify;

use super::*;
use crate::store::BufferStore;

// =============================================================================
// Mock sink
// =============================================================================

/// Records inserts; answers from a queue of scripted results (default Ok)
#[derive(Default)]
struct MockSink {
    inserts: Mutex<Vec<(String, String)>>,
    responses: Mutex<VecDeque<std::result::Result<(), SinkError>>>,
    gate: Option<Gate>,
}

#[derive(Default)]
struct Gate {
    entered: Notify,
    release: Notify,
}

impl MockSink {
    fn gated() -> Self {
        Self {
            gate: Some(Gate::default()),
            ..Default::default()
        }
    }

    fn respond(&self, result: std::result::Result<(), SinkError>) {
        self.responses.lock().push_back(result);
    }

    fn inserts(&self) -> Vec<(String, String)> {
        self.inserts.lock().clone()
    }
}

#[async_trait]
impl DataSink for MockSink {
    fn name(&self) -> &str {
        "mock"
    }

    async fn insert(&self, table: &TableName, rows: Bytes) -> std::result::Result<(), SinkError> {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.inserts.lock().push((
            table.to_string(),
            String::from_utf8_lossy(&rows).into_owned(),
        ));
        self.responses.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn convert_to_type(
        &self,
        _table: &TableName,
        _column: &str,
        value: Value,
    ) -> std::result::Result<Value, SinkError> {
        Ok(value)
    }
}

fn status(code: u16, body: &str) -> SinkError {
    SinkError::Status {
        status: code,
        body: body.into(),
    }
}

fn table(name: &str) -> TableName {
    TableName::new(name).unwrap()
}

fn engine_with(sink: Arc<MockSink>, config: BufferConfig) -> (tempfile::TempDir, Arc<FlushEngine>) {
    let dir = tempfile::tempdir().unwrap();
    let store = BufferStore::open(dir.path()).unwrap();
    let engine = FlushEngine::new(store, sink, &config);
    (dir, Arc::new(engine))
}

fn engine(sink: Arc<MockSink>) -> (tempfile::TempDir, Arc<FlushEngine>) {
    engine_with(sink, BufferConfig::default())
}

fn file_names(dir: &tempfile::TempDir) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Eligibility
// =============================================================================

#[tokio::test]
async fn test_everything_eligible_before_start() {
    let (_dir, engine) = engine(Arc::new(MockSink::default()));
    assert!(engine.eligible(&table("orders")));

    engine.mark_started();
    assert!(!engine.eligible(&table("orders")));
}

#[tokio::test(start_paused = true)]
async fn test_eligible_after_max_delay() {
    let config = BufferConfig {
        max_delay: Duration::from_secs(1),
        ..Default::default()
    };
    let sink = Arc::new(MockSink::default());
    let (_dir, engine) = engine_with(Arc::clone(&sink), config);
    engine.mark_started();
    let orders = table("orders");

    engine.append(&orders, &[r#"{"id":1}"#]).unwrap();
    assert!(!engine.eligible(&orders));
    assert_eq!(engine.scheduled_sweep().await.unwrap().files(), 0);
    assert!(sink.inserts().is_empty());

    tokio::time::advance(Duration::from_millis(999)).await;
    assert!(!engine.eligible(&orders));

    tokio::time::advance(Duration::from_millis(1)).await;
    assert!(engine.eligible(&orders));

    let stats = engine.scheduled_sweep().await.unwrap();
    assert_eq!(stats.files_flushed, 1);
    assert_eq!(sink.inserts(), vec![("orders".into(), "{\"id\":1}\n".into())]);
}

#[tokio::test]
async fn test_eligible_when_file_too_large() {
    let config = BufferConfig {
        max_file_size: 16,
        ..Default::default()
    };
    let (_dir, engine) = engine_with(Arc::new(MockSink::default()), config);
    engine.mark_started();
    let orders = table("orders");

    engine.append(&orders, &["0123456789"]).unwrap();
    assert!(!engine.eligible(&orders));

    engine.append(&orders, &["0123456789"]).unwrap();
    assert!(engine.eligible(&orders));
}

// =============================================================================
// Sweeps
// =============================================================================

#[tokio::test]
async fn test_startup_sweep_drains_active_files() {
    let sink = Arc::new(MockSink::default());
    let (dir, engine) = engine(Arc::clone(&sink));

    engine.append(&table("orders"), &["{\"a\":1}", "{\"a\":2}"]).unwrap();
    engine.append(&table("users"), &["{\"u\":1}"]).unwrap();

    let stats = engine.scheduled_sweep().await.unwrap();

    assert_eq!(stats.files_flushed, 2);
    assert_eq!(
        sink.inserts(),
        vec![
            ("orders".into(), "{\"a\":1}\n{\"a\":2}\n".into()),
            ("users".into(), "{\"u\":1}\n".into()),
        ]
    );
    assert!(file_names(&dir).is_empty());

    let metrics = engine.metrics();
    assert_eq!(metrics.rows_appended, 3);
    assert_eq!(metrics.files_flushed, 2);
}

#[tokio::test]
async fn test_rotated_leftover_only_picked_up_by_forced_sweep() {
    let sink = Arc::new(MockSink::default());
    let (dir, engine) = engine(Arc::clone(&sink));
    fs::write(dir.path().join("orders.json.abc123"), "{\"id\":7}\n").unwrap();

    let stats = engine.scheduled_sweep().await.unwrap();
    assert_eq!(stats.files(), 0);
    assert!(sink.inserts().is_empty());

    let stats = engine.forced_sweep().await.unwrap();
    assert_eq!(stats.files_flushed, 1);
    assert_eq!(sink.inserts(), vec![("orders".into(), "{\"id\":7}\n".into())]);
    assert!(file_names(&dir).is_empty());
}

#[tokio::test]
async fn test_transient_error_keeps_rotated_file() {
    let sink = Arc::new(MockSink::default());
    sink.respond(Err(status(503, "overloaded")));
    let (dir, engine) = engine(Arc::clone(&sink));

    engine.append(&table("orders"), &["{\"id\":1}"]).unwrap();
    let stats = engine.scheduled_sweep().await.unwrap();

    assert_eq!(stats.files_retained, 1);
    let names = file_names(&dir);
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("orders.json."));

    // Recovery picks it up once the sink is healthy again
    let stats = engine.forced_sweep().await.unwrap();
    assert_eq!(stats.files_flushed, 1);
    assert!(file_names(&dir).is_empty());
    assert_eq!(sink.inserts().len(), 2);
    assert_eq!(engine.metrics().files_retained, 1);
}

#[tokio::test]
async fn test_permanent_error_drops_file() {
    let sink = Arc::new(MockSink::default());
    sink.respond(Err(status(404, "Table default.ghost does not exist. (UNKNOWN_TABLE)")));
    let (dir, engine) = engine(Arc::clone(&sink));

    engine.append(&table("ghost"), &["{\"id\":1}"]).unwrap();
    let stats = engine.scheduled_sweep().await.unwrap();

    assert_eq!(stats.files_dropped, 1);
    assert!(file_names(&dir).is_empty());
    assert_eq!(engine.metrics().files_dropped, 1);
}

#[tokio::test]
async fn test_whitespace_file_deleted_without_insert() {
    let sink = Arc::new(MockSink::default());
    let (dir, engine) = engine(Arc::clone(&sink));
    fs::write(dir.path().join("orders.json.abc123"), "\n  \n").unwrap();
    fs::write(dir.path().join("users.json"), "").unwrap();

    let stats = engine.forced_sweep().await.unwrap();

    assert_eq!(stats.files_skipped, 2);
    assert!(sink.inserts().is_empty());
    assert!(file_names(&dir).is_empty());
}

#[tokio::test]
async fn test_foreign_files_untouched() {
    let sink = Arc::new(MockSink::default());
    let (dir, engine) = engine(Arc::clone(&sink));
    fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

    engine.forced_sweep().await.unwrap();

    assert_eq!(file_names(&dir), vec!["notes.txt"]);
    assert!(sink.inserts().is_empty());
}

#[tokio::test]
async fn test_flush_one_without_active_file() {
    let (dir, engine) = engine(Arc::new(MockSink::default()));
    let file = BufferFile::parse(&dir.path().join("orders.json")).unwrap();

    let outcome = engine.flush_one(&file).await.unwrap();
    assert_eq!(outcome, FlushOutcome::Nothing);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_sweep_not_reentrant() {
    let sink = Arc::new(MockSink::gated());
    let (_dir, engine) = engine(Arc::clone(&sink));
    engine.append(&table("orders"), &["{\"id\":1}"]).unwrap();

    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.scheduled_sweep().await }
    });

    let gate = sink.gate.as_ref().unwrap();
    gate.entered.notified().await;

    // Same kind is refused while the first is blocked in the sink
    assert!(engine.scheduled_sweep().await.is_none());
    assert_eq!(engine.metrics().sweeps_skipped, 1);

    // The forced sweep has its own guard and skips the in-flight file
    let forced = engine.forced_sweep().await.unwrap();
    assert_eq!(forced.files(), 0);

    gate.release.notify_one();
    let stats = first.await.unwrap().unwrap();
    assert_eq!(stats.files_flushed, 1);
    assert_eq!(sink.inserts().len(), 1);

    // Guard released
    assert!(engine.scheduled_sweep().await.is_some());
}

#[tokio::test]
async fn test_appends_during_upload_land_in_new_file() {
    let sink = Arc::new(MockSink::gated());
    let (_dir, engine) = engine(Arc::clone(&sink));
    let orders = table("orders");
    engine.append(&orders, &["{\"n\":1}"]).unwrap();

    let sweep = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.scheduled_sweep().await }
    });

    let gate = sink.gate.as_ref().unwrap();
    gate.entered.notified().await;
    engine.append(&orders, &["{\"n\":2}"]).unwrap();
    gate.release.notify_one();
    sweep.await.unwrap().unwrap();

    assert_eq!(sink.inserts(), vec![("orders".into(), "{\"n\":1}\n".into())]);
    let active = fs::read_to_string(engine.store().active_path(&orders)).unwrap();
    assert_eq!(active, "{\"n\":2}\n");
    assert!(engine.store().pending_since(&orders).is_some());
}
