//! Spool Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use spool_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[stomp]\nqueue = \"events\"").unwrap();
//! assert_eq!(config.stomp.queue, "events");
//! ```
//!
//! # Example Full Config
//!
//! ```toml
//! [log]
//! level = "info"
//!
//! [clickhouse]
//! host = "localhost"
//! port = 8123
//! database = "default"
//!
//! [stomp]
//! host = "localhost"
//! port = 61613
//! queue = "clickhouse"
//!
//! [buffer]
//! path = "tmp"
//! max_delay = "20s"
//! max_file_size = 5242880
//! ```

mod buffer;
mod clickhouse;
mod error;
mod logging;
mod stomp;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use buffer::{BufferConfig, DEFAULT_MAX_DELAY, DEFAULT_MAX_FILE_SIZE};
pub use clickhouse::ClickHouseConfig;
pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use stomp::StompConfig;

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,

    /// ClickHouse HTTP endpoint
    pub clickhouse: ClickHouseConfig,

    /// STOMP broker and queue
    pub stomp: StompConfig,

    /// Buffer directory and flush thresholds
    pub buffer: BufferConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or contains invalid TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::load_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and deserialize a TOML file without validating it
    ///
    /// For callers that layer further settings on top and call
    /// [`Config::validate`] once everything is merged.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::deserialize_str(&contents)
    }

    fn deserialize_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(ConfigError::ParseError)
    }

    /// Parse configuration from a TOML string
    ///
    /// Prefer using the `FromStr` trait implementation.
    fn parse(s: &str) -> Result<Self> {
        let config = Self::deserialize_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Called after parsing, and again by the binary after command-line and
    /// environment overrides have been applied.
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
