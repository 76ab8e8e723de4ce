//! Command-line and environment overrides
//!
//! Every setting a container deployment usually changes can be given as a
//! flag or an environment variable. Values set here win over the config file.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use spool_config::Config;

/// Settings that override the config file
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// ClickHouse host
    #[arg(long, env = "CLICKHOUSE_HOST", global = true)]
    pub clickhouse_host: Option<String>,

    /// ClickHouse HTTP port
    #[arg(long, env = "CLICKHOUSE_PORT", global = true)]
    pub clickhouse_port: Option<u16>,

    /// ClickHouse database
    #[arg(long, env = "CLICKHOUSE_DB", global = true)]
    pub clickhouse_db: Option<String>,

    /// ClickHouse user
    #[arg(long, env = "CLICKHOUSE_USER", global = true)]
    pub clickhouse_user: Option<String>,

    /// ClickHouse password
    #[arg(long, env = "CLICKHOUSE_PASSWORD", global = true, hide_env_values = true)]
    pub clickhouse_password: Option<String>,

    /// STOMP broker host
    #[arg(long, env = "RABBIT_HOST", global = true)]
    pub stomp_host: Option<String>,

    /// STOMP broker port
    #[arg(long, env = "RABBIT_STOMP_PORT", global = true)]
    pub stomp_port: Option<u16>,

    /// STOMP login
    #[arg(long, env = "RABBIT_USER", global = true)]
    pub stomp_user: Option<String>,

    /// STOMP passcode
    #[arg(long, env = "RABBIT_PASSWORD", global = true, hide_env_values = true)]
    pub stomp_password: Option<String>,

    /// STOMP virtual host
    #[arg(long, env = "RABBIT_VHOST", global = true)]
    pub stomp_vhost: Option<String>,

    /// Queue to consume
    #[arg(long, env = "RABBIT_QUEUE", global = true)]
    pub queue: Option<String>,

    /// Seconds a buffer may wait before it is flushed
    #[arg(long, env = "MAX_DELAY", global = true, value_name = "SECONDS")]
    pub max_delay: Option<u64>,

    /// Buffer size in bytes that triggers a flush
    #[arg(long, env = "MAX_FILE_SIZE", global = true, value_name = "BYTES")]
    pub max_file_size: Option<u64>,

    /// Buffer directory
    #[arg(long, env = "SPOOL_BUFFER_DIR", global = true)]
    pub buffer_dir: Option<PathBuf>,
}

impl Overrides {
    /// Write every set value into the config
    pub fn apply(&self, config: &mut Config) {
        let ch = &mut config.clickhouse;
        set(&mut ch.host, &self.clickhouse_host);
        set(&mut ch.port, &self.clickhouse_port);
        set(&mut ch.database, &self.clickhouse_db);
        set(&mut ch.user, &self.clickhouse_user);
        set(&mut ch.password, &self.clickhouse_password);

        let stomp = &mut config.stomp;
        set(&mut stomp.host, &self.stomp_host);
        set(&mut stomp.port, &self.stomp_port);
        set(&mut stomp.user, &self.stomp_user);
        set(&mut stomp.password, &self.stomp_password);
        set(&mut stomp.vhost, &self.stomp_vhost);
        set(&mut stomp.queue, &self.queue);

        let buffer = &mut config.buffer;
        if let Some(secs) = self.max_delay {
            buffer.max_delay = Duration::from_secs(secs);
        }
        set(&mut buffer.max_file_size, &self.max_file_size);
        set(&mut buffer.path, &self.buffer_dir);
    }
}

fn set<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}
