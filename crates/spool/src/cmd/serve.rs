//! Serve command - Run the worker
//!
//! Startup order matters: everything left on disk by the previous run is
//! shipped before the first message is taken from the queue.
//!
//! ```text
//! open buffer dir → ClickHouse ping + schema warmup
//!   → drain active buffers → recover rotated leftovers → mark started
//!   → connect STOMP → consumer task + sweep timers → wait for signal
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use spool_buffer::{BufferStore, FlushEngine};
use spool_config::Config;
use spool_sinks::{ClickHouseClient, DataSink};
use spool_sources::{QueueConsumer, StompClient};

use crate::scheduler::spawn_periodic;

/// How long each task gets to stop after cancellation
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the serve command
pub async fn run(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        clickhouse = %config.clickhouse.url(),
        broker = %config.stomp.address(),
        destination = %config.stomp.destination(),
        buffer_dir = %config.buffer.path.display(),
        max_delay = ?config.buffer.max_delay,
        max_file_size = config.buffer.max_file_size,
        "spool starting"
    );

    let cancel = CancellationToken::new();
    let signals = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            wait_for_shutdown().await;
            info!("shutdown signal received, stopping worker...");
            cancel.cancel();
        }
    });

    let result = run_worker(&config, &cancel).await;
    signals.abort();

    if let Err(e) = &result {
        error!(error = %e, "worker error");
    }
    info!("spool shutdown complete");
    result
}

/// Main worker run loop
async fn run_worker(config: &Config, cancel: &CancellationToken) -> Result<()> {
    let store = BufferStore::open(&config.buffer.path).with_context(|| {
        format!(
            "failed to open buffer directory {}",
            config.buffer.path.display()
        )
    })?;

    let clickhouse = Arc::new(
        ClickHouseClient::new(&config.clickhouse).context("failed to create ClickHouse client")?,
    );
    prepare_clickhouse(&clickhouse).await;

    let sink: Arc<dyn DataSink> = clickhouse.clone();
    let engine = Arc::new(FlushEngine::new(store, Arc::clone(&sink), &config.buffer));

    // Ship what the previous run left behind before taking new messages
    tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        _ = drain_leftovers(&engine) => {}
    }

    let client = StompClient::new(config.stomp.clone());
    let session = match client
        .open_with_retry(cancel, true)
        .await
        .context("STOMP broker rejected the connection")?
    {
        Some(session) => session,
        None => return Ok(()),
    };

    let consumer = Arc::new(QueueConsumer::new(
        Arc::clone(&engine),
        sink,
        config.buffer.nack_delay,
    ));
    let consumer_task = tokio::spawn(Arc::clone(&consumer).run(client, session, cancel.clone()));

    let flush_timer = spawn_periodic(
        "scheduled sweep",
        config.buffer.max_delay,
        cancel.clone(),
        {
            let engine = Arc::clone(&engine);
            move || {
                let engine = Arc::clone(&engine);
                async move {
                    engine.scheduled_sweep().await;
                }
            }
        },
    );
    let recovery_timer = spawn_periodic(
        "forced sweep",
        config.buffer.recovery_interval,
        cancel.clone(),
        {
            let engine = Arc::clone(&engine);
            move || {
                let engine = Arc::clone(&engine);
                async move {
                    engine.forced_sweep().await;
                }
            }
        },
    );

    info!(
        subscription = %config.stomp.queue,
        recovery_interval = ?config.buffer.recovery_interval,
        "spool running"
    );

    cancel.cancelled().await;

    join_with_timeout("queue consumer", consumer_task).await;
    join_with_timeout("scheduled sweep timer", flush_timer).await;
    join_with_timeout("forced sweep timer", recovery_timer).await;

    let engine_metrics = engine.metrics();
    let consumer_metrics = consumer.metrics();
    let clickhouse_metrics = clickhouse.metrics();
    info!(
        received = consumer_metrics.received,
        buffered = consumer_metrics.buffered,
        dropped = consumer_metrics.dropped,
        acked = consumer_metrics.acked,
        nacked = consumer_metrics.nacked,
        ack_failures = consumer_metrics.ack_failures,
        rows_appended = engine_metrics.rows_appended,
        files_flushed = engine_metrics.files_flushed,
        bytes_flushed = engine_metrics.bytes_flushed,
        files_retained = engine_metrics.files_retained,
        files_dropped = engine_metrics.files_dropped,
        clickhouse_errors = clickhouse_metrics.request_errors,
        "final metrics"
    );

    Ok(())
}

/// Check ClickHouse and load table schemas; failures are not fatal
async fn prepare_clickhouse(clickhouse: &ClickHouseClient) {
    if let Err(e) = clickhouse.ping().await {
        warn!(error = %e, "ClickHouse is not reachable, uploads will be retried");
        return;
    }
    match clickhouse.warm_schema_cache().await {
        Ok(tables) => info!(tables, "schema cache warmed"),
        Err(e) => warn!(error = %e, "failed to warm schema cache"),
    }
}

/// Startup sweeps: every active buffer, then rotated leftovers
async fn drain_leftovers(engine: &FlushEngine) {
    engine.scheduled_sweep().await;
    engine.forced_sweep().await;
    engine.mark_started();
}

async fn join_with_timeout(name: &str, task: JoinHandle<()>) {
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(task = name, error = %e, "task panicked during shutdown"),
        Err(_) => warn!(task = name, "task did not finish within timeout"),
    }
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
