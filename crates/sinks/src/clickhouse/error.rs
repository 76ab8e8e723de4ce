//! ClickHouse adapter errors

/// Error names ClickHouse reports when the insert target is gone
const MISSING_OBJECT_CODES: &[&str] = &["UNKNOWN_TABLE", "UNKNOWN_DATABASE"];

/// Errors from the ClickHouse adapter
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// ClickHouse answered with an error status (>= 400)
    #[error("clickhouse returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Raw response body (ClickHouse exception text)
        body: String,
    },

    /// Transport-level failure (connect, timeout, TLS)
    #[error("clickhouse request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Response body was not the expected JSON envelope
    #[error("failed to decode clickhouse response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SinkError {
    /// True when retrying cannot succeed without operator intervention
    ///
    /// ClickHouse answers 404 for a missing table or database; the exception
    /// name in the body is checked as well for proxies that rewrite statuses.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Status { status, body } => {
                *status == 404 || MISSING_OBJECT_CODES.iter().any(|code| body.contains(code))
            }
            Self::Request(_) | Self::Decode(_) => false,
        }
    }

    /// HTTP status for backend errors
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
