//! Buffer configuration
//!
//! Where rows are spooled on disk and when a table's buffer is shipped.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default age threshold for a table buffer
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(20);

/// Default size threshold for a table buffer (5MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Buffer directory and flush thresholds
///
/// # Example
///
/// ```toml
/// [buffer]
/// path = "/var/spool/clickhouse"
/// max_delay = "20s"
/// max_file_size = 5242880
/// recovery_interval = "1h"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Directory holding the per-table buffer files
    /// Default: "tmp"
    pub path: PathBuf,

    /// Flush a table once its oldest pending row is this old.
    /// Also the period of the scheduled sweep.
    /// Default: 20s
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Flush a table once its active buffer reaches this many bytes
    /// Default: 5242880
    pub max_file_size: u64,

    /// Period of the forced sweep that retries leftover rotated files
    /// Default: 1h
    #[serde(with = "humantime_serde")]
    pub recovery_interval: Duration,

    /// Wait before negatively acknowledging a message that failed to buffer
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub nack_delay: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tmp"),
            max_delay: DEFAULT_MAX_DELAY,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            recovery_interval: Duration::from_secs(3600),
            nack_delay: Duration::from_secs(10),
        }
    }
}
