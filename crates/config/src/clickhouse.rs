//! ClickHouse connection configuration
//!
//! The HTTP interface of the ClickHouse server that receives the batched
//! inserts and answers schema lookups.

use serde::Deserialize;
use std::time::Duration;

/// ClickHouse HTTP endpoint configuration
///
/// # Example
///
/// ```toml
/// [clickhouse]
/// host = "clickhouse.internal"
/// port = 8443
/// database = "analytics"
/// user = "writer"
/// password = "secret"
/// tls = true
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClickHouseConfig {
    /// ClickHouse host
    /// Default: "localhost"
    pub host: String,

    /// HTTP interface port
    /// Default: 8123
    pub port: u16,

    /// Database name
    /// Default: "default"
    pub database: String,

    /// Username for authentication (empty = no auth)
    /// Default: "default"
    pub user: String,

    /// Password for authentication
    /// Default: ""
    pub password: String,

    /// Use HTTPS instead of HTTP
    /// Default: false
    pub tls: bool,

    /// Timeout for a single HTTP request
    /// Default: 120s
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 8123,
            database: "default".into(),
            user: "default".into(),
            password: String::new(),
            tls: false,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl ClickHouseConfig {
    /// Base URL of the HTTP interface, e.g. `http://localhost:8123`
    pub fn url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}
