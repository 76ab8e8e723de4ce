//! STOMP broker configuration
//!
//! The durable queue the worker subscribes to (RabbitMQ STOMP plugin or any
//! STOMP 1.2 broker).

use serde::Deserialize;
use std::time::Duration;

/// STOMP connection and subscription configuration
///
/// # Example
///
/// ```toml
/// [stomp]
/// host = "rabbit.internal"
/// port = 61613
/// user = "spool"
/// password = "secret"
/// queue = "clickhouse"
/// prefetch = 50
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StompConfig {
    /// Broker host
    /// Default: "localhost"
    pub host: String,

    /// Broker STOMP port
    /// Default: 61613
    pub port: u16,

    /// Login (empty = anonymous)
    /// Default: ""
    pub user: String,

    /// Passcode
    /// Default: ""
    pub password: String,

    /// Virtual host sent in the CONNECT `host` header
    /// Default: "/"
    pub vhost: String,

    /// Queue name, subscribed as `/queue/<name>` (required)
    /// Default: "clickhouse"
    pub queue: String,

    /// Maximum unacknowledged messages in flight
    /// Default: 10
    pub prefetch: u32,

    /// Delay between reconnection attempts
    /// Default: 1s
    #[serde(with = "humantime_serde")]
    pub reconnect_period: Duration,
}

impl Default for StompConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 61613,
            user: String::new(),
            password: String::new(),
            vhost: "/".into(),
            queue: "clickhouse".into(),
            prefetch: 10,
            reconnect_period: Duration::from_secs(1),
        }
    }
}

impl StompConfig {
    /// Broker socket address, e.g. `localhost:61613`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Subscription destination, e.g. `/queue/clickhouse`
    pub fn destination(&self) -> String {
        format!("/queue/{}", self.queue)
    }
}
