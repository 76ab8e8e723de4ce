//! Configuration validation
//!
//! Checks that the resolved configuration can actually run a worker:
//! - Endpoints have a host and a non-zero port
//! - A queue name is set
//! - Flush thresholds and prefetch are positive

use crate::Config;
use crate::error::{ConfigError, Result};

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_clickhouse(config)?;
    validate_stomp(config)?;
    validate_buffer(config)?;
    Ok(())
}

fn validate_clickhouse(config: &Config) -> Result<()> {
    let ch = &config.clickhouse;

    if ch.host.trim().is_empty() {
        return Err(ConfigError::missing_field("clickhouse", "host"));
    }
    if ch.port == 0 {
        return Err(ConfigError::invalid_value("clickhouse", "port", "must not be 0"));
    }
    if ch.database.trim().is_empty() {
        return Err(ConfigError::missing_field("clickhouse", "database"));
    }

    Ok(())
}

fn validate_stomp(config: &Config) -> Result<()> {
    let stomp = &config.stomp;

    if stomp.host.trim().is_empty() {
        return Err(ConfigError::missing_field("stomp", "host"));
    }
    if stomp.port == 0 {
        return Err(ConfigError::invalid_value("stomp", "port", "must not be 0"));
    }
    if stomp.queue.trim().is_empty() {
        return Err(ConfigError::missing_field("stomp", "queue"));
    }
    if stomp.prefetch == 0 {
        return Err(ConfigError::invalid_value(
            "stomp",
            "prefetch",
            "must be greater than zero",
        ));
    }

    Ok(())
}

fn validate_buffer(config: &Config) -> Result<()> {
    let buffer = &config.buffer;

    if buffer.path.as_os_str().is_empty() {
        return Err(ConfigError::missing_field("buffer", "path"));
    }
    if buffer.max_delay.is_zero() {
        return Err(ConfigError::invalid_value(
            "buffer",
            "max_delay",
            "must be greater than zero",
        ));
    }
    if buffer.max_file_size == 0 {
        return Err(ConfigError::invalid_value(
            "buffer",
            "max_file_size",
            "must be greater than zero",
        ));
    }
    if buffer.recovery_interval.is_zero() {
        return Err(ConfigError::invalid_value(
            "buffer",
            "recovery_interval",
            "must be greater than zero",
        ));
    }

    Ok(())
}
