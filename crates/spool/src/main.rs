//! Spool - Queue to ClickHouse batch loader
//!
//! # Usage
//!
//! ```bash
//! # Run the worker (default)
//! spool
//! spool --config configs/spool.toml
//!
//! # Override settings from the environment
//! RABBIT_QUEUE=events CLICKHOUSE_HOST=ch.internal spool serve
//! ```

mod cmd;
mod overrides;
mod scheduler;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spool_config::{Config, LogFormat};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::overrides::Overrides;

/// Default configuration file, used when present
const DEFAULT_CONFIG_PATH: &str = "configs/spool.toml";

/// Spool - Queue to ClickHouse batch loader
#[derive(Parser, Debug)]
#[command(name = "spool")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Consume the queue and load buffered rows into ClickHouse
    Serve,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Serve is the only command, and the default
        Some(Command::Serve) | None => {
            let config = load_config(cli.config.as_deref(), &cli.overrides)?;
            let log_level = cli
                .log_level
                .unwrap_or_else(|| config.log.level.as_str().to_string());
            init_logging(&log_level, config.log.format)?;
            install_panic_hook();
            cmd::serve::run(config).await
        }
    }
}

/// Load the config file, apply command-line and environment overrides, validate
fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
            Config::load_file(path).context("failed to load configuration")?
        }
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Config::load_file(default).context("failed to load configuration")?
            } else {
                Config::default()
            }
        }
    };

    overrides.apply(&mut config);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let (console, json) = match format {
        LogFormat::Console => (Some(fmt::layer().with_target(true)), None),
        LogFormat::Json => (None, Some(fmt::layer().json().with_target(true))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(json)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    Ok(())
}

/// Route panic messages through the logger
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("unknown panic payload");
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        tracing::error!(panic = message, location = %location, "panic");
    }));
}
