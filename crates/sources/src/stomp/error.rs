//! STOMP client errors

use super::frame::{Command, FrameError};

/// Errors from the STOMP client
#[derive(Debug, thiserror::Error)]
pub enum StompError {
    /// TCP connect to the broker failed
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Socket read or write failed
    #[error("stomp I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Broker sent bytes that are not a valid frame
    #[error("stomp protocol error: {0}")]
    Frame(#[from] FrameError),

    /// Broker refused the CONNECT (bad credentials, unknown vhost)
    #[error("broker rejected connection: {message}")]
    Rejected { message: String, details: String },

    /// Broker sent an ERROR frame on an established connection
    #[error("broker error: {message}")]
    Server { message: String, details: String },

    /// Frame not valid at this point of the conversation
    #[error("unexpected {0} frame")]
    UnexpectedFrame(Command),

    /// Connection closed (EOF, or the writer task has stopped)
    #[error("connection closed")]
    Closed,
}

impl StompError {
    /// Errors that reconnecting will not fix
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}
