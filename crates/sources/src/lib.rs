//! Spool - Sources
//!
//! Receives rows from the message queue and hands them to the buffer.
//!
//! # Components
//!
//! - **STOMP** - Minimal STOMP 1.2 client: CONNECT, SUBSCRIBE with
//!   client-individual acks, MESSAGE, ACK/NACK, DISCONNECT
//! - **Consumer** - Resolves the destination table, coerces legacy payloads
//!   and appends rows to the table's buffer file
//!
//! # Example
//!
//! ```ignore
//! use spool_sources::{QueueConsumer, StompClient};
//! use std::sync::Arc;
//!
//! let client = StompClient::new(config.stomp.clone());
//! let session = client.open().await?;
//!
//! let consumer = Arc::new(QueueConsumer::new(engine, sink, config.buffer.nack_delay));
//! tokio::spawn(consumer.run(client, session, cancel.clone()));
//! ```

pub mod consumer;
pub mod stomp;

pub use consumer::{
    ConsumeError, ConsumerMetrics, ConsumerMetricsSnapshot, Disposition, QueueConsumer,
    TABLE_HEADER,
};
pub use stomp::{AckTarget, Acker, Message, Session, StompClient, StompError};
