//! Spool - Buffer
//!
//! Rows are appended to one file per destination table and shipped to the
//! sink in large batches once a file is old or big enough.
//!
//! ```text
//! append ──> <dir>/orders.json ──rotate──> <dir>/orders.json.<token> ──insert──> sink
//!                                                      │
//!                                     transient error: kept for the recovery sweep
//! ```
//!
//! Rotation renames the active file before it is read, so appends that
//! arrive during an upload start a fresh file and are never lost.

mod engine;
mod error;
mod guard;
mod lock;
mod metrics;
mod store;

pub use engine::{FlushEngine, FlushOutcome, SweepStats};
pub use error::{BufferError, Result};
pub use guard::{SweepFlag, SweepGuard};
pub use metrics::{EngineMetrics, EngineMetricsSnapshot};
pub use store::{BufferFile, BufferFileKind, BufferStore, ACTIVE_SUFFIX};
