//! STOMP 1.2 client
//!
//! A [`Session`] owns one broker connection. Frames are read on the caller's
//! task; writes go through a small channel to a writer task so that
//! acknowledgements can be sent from anywhere (including delayed NACKs)
//! while the read side is blocked waiting for the next message.
//!
//! ```text
//! [broker] ──MESSAGE──> Session::next_message ──> consumer
//!    ^                                               │
//!    └──── writer task <── mpsc <── Acker::ack/nack ─┘
//! ```

use std::time::Duration;

use bytes::BytesMut;
use spool_config::StompConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::StompError;
use super::frame::{Command, Frame};
use super::message::{AckTarget, Message};

/// Read buffer size per connection
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Outbound frames queued for the writer task
const OUTBOUND_QUEUE_SIZE: usize = 256;

/// Connects to the broker and subscribes to the configured queue
#[derive(Debug, Clone)]
pub struct StompClient {
    config: StompConfig,
    subscription_id: String,
}

impl StompClient {
    /// Create a client; the subscription id is `<hostname>-<pid>`
    pub fn new(config: StompConfig) -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "spool".into());
        let subscription_id = format!("{}-{}", host, std::process::id());
        Self {
            config,
            subscription_id,
        }
    }

    /// Override the subscription id
    pub fn with_subscription_id(mut self, id: impl Into<String>) -> Self {
        self.subscription_id = id.into();
        self
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn config(&self) -> &StompConfig {
        &self.config
    }

    /// Connect and subscribe once
    pub async fn open(&self) -> Result<Session, StompError> {
        let address = self.config.address();
        let stream = TcpStream::connect(&address)
            .await
            .map_err(|source| StompError::Connect {
                address: address.clone(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }

        let session = Session::handshake(stream, &self.config).await?;
        session
            .subscribe(
                &self.subscription_id,
                &self.config.destination(),
                self.config.prefetch,
            )
            .await?;

        tracing::info!(
            address = %address,
            destination = %self.config.destination(),
            subscription = %self.subscription_id,
            server = session.server().unwrap_or("unknown"),
            "STOMP connected"
        );
        Ok(session)
    }

    /// Connect and subscribe, retrying every `reconnect_period`
    ///
    /// Returns `Ok(None)` if cancelled first. A rejected CONNECT is returned
    /// as an error when `fail_on_reject` is set and retried otherwise.
    pub async fn open_with_retry(
        &self,
        cancel: &CancellationToken,
        fail_on_reject: bool,
    ) -> Result<Option<Session>, StompError> {
        loop {
            let attempt = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                result = self.open() => result,
            };

            match attempt {
                Ok(session) => return Ok(Some(session)),
                Err(e) if e.is_fatal() && fail_on_reject => return Err(e),
                Err(e) => tracing::warn!(
                    error = %e,
                    retry_in = ?self.config.reconnect_period,
                    "STOMP connect failed"
                ),
            }

            if !sleep_or_cancel(self.config.reconnect_period, cancel).await {
                return Ok(None);
            }
        }
    }
}

/// Sleep unless cancelled; false if cancelled
pub(crate) async fn sleep_or_cancel(period: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}

// =============================================================================
// Session
// =============================================================================

/// One established broker connection
#[derive(Debug)]
pub struct Session {
    reader: OwnedReadHalf,
    buf: BytesMut,
    acker: Acker,
    writer: JoinHandle<()>,
    server: Option<String>,
}

impl Session {
    /// Send CONNECT on a fresh stream and wait for CONNECTED
    pub async fn handshake(stream: TcpStream, config: &StompConfig) -> Result<Self, StompError> {
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        let writer = tokio::spawn(write_loop(writer, rx));

        let mut session = Self {
            reader,
            buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            acker: Acker { outbound: tx },
            writer,
            server: None,
        };

        session.acker.send(connect_frame(config)).await?;

        let frame = session.read_frame().await?.ok_or(StompError::Closed)?;
        match frame.command {
            Command::Connected => {
                session.server = frame.header("server").map(str::to_string);
                Ok(session)
            }
            Command::Error => Err(StompError::Rejected {
                message: frame.header("message").unwrap_or_default().to_string(),
                details: String::from_utf8_lossy(&frame.body).into_owned(),
            }),
            other => Err(StompError::UnexpectedFrame(other)),
        }
    }

    /// Broker `server` header from CONNECTED
    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    /// Subscribe with client-individual acknowledgement
    pub async fn subscribe(&self, id: &str, destination: &str, prefetch: u32) -> Result<(), StompError> {
        let frame = Frame::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "client-individual")
            .with_header("durable", "true")
            .with_header("prefetch-count", prefetch.to_string());
        self.acker.send(frame).await
    }

    /// Handle for acknowledging messages from other tasks
    pub fn acker(&self) -> Acker {
        self.acker.clone()
    }

    /// Wait for the next MESSAGE
    ///
    /// RECEIPT frames are skipped. `Ok(None)` means the broker closed the
    /// connection cleanly.
    pub async fn next_message(&mut self) -> Result<Option<Message>, StompError> {
        loop {
            let Some(frame) = self.read_frame().await? else {
                return Ok(None);
            };
            match frame.command {
                Command::Message => return Ok(Some(Message::from_frame(frame))),
                Command::Receipt => continue,
                Command::Error => {
                    return Err(StompError::Server {
                        message: frame.header("message").unwrap_or_default().to_string(),
                        details: String::from_utf8_lossy(&frame.body).into_owned(),
                    });
                }
                other => return Err(StompError::UnexpectedFrame(other)),
            }
        }
    }

    async fn read_frame(&mut self) -> Result<Option<Frame>, StompError> {
        loop {
            if let Some(frame) = Frame::decode(&mut self.buf)? {
                return Ok(Some(frame));
            }
            if self.reader.read_buf(&mut self.buf).await? == 0 {
                return Ok(None);
            }
        }
    }

    /// Send DISCONNECT and wait for queued frames to be written
    pub async fn disconnect(self) {
        let Self { acker, writer, .. } = self;
        if acker.send(Frame::new(Command::Disconnect)).await.is_err() {
            writer.abort();
            return;
        }
        drop(acker);
        // Other Acker clones (pending delayed NACKs) keep the writer alive
        if tokio::time::timeout(Duration::from_secs(1), writer).await.is_err() {
            tracing::debug!("STOMP writer did not finish after DISCONNECT");
        }
    }
}

fn connect_frame(config: &StompConfig) -> Frame {
    let mut frame = Frame::new(Command::Connect)
        .with_header("accept-version", "1.2")
        .with_header("host", config.vhost.as_str())
        .with_header("heart-beat", "0,0");
    if !config.user.is_empty() {
        frame = frame
            .with_header("login", config.user.as_str())
            .with_header("passcode", config.password.as_str());
    }
    frame
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<Frame>) {
    let mut buf = BytesMut::with_capacity(4096);
    while let Some(frame) = rx.recv().await {
        buf.clear();
        frame.encode(&mut buf);
        if let Err(e) = writer.write_all(&buf).await {
            tracing::warn!(error = %e, command = %frame.command, "STOMP write failed");
            return;
        }
        if frame.command == Command::Disconnect {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

// =============================================================================
// Acknowledgements
// =============================================================================

/// Sends ACK/NACK frames on a session's connection
///
/// Cloneable; sending fails with [`StompError::Closed`] once the connection
/// it belongs to is gone.
#[derive(Debug, Clone)]
pub struct Acker {
    outbound: mpsc::Sender<Frame>,
}

impl Acker {
    async fn send(&self, frame: Frame) -> Result<(), StompError> {
        self.outbound.send(frame).await.map_err(|_| StompError::Closed)
    }

    /// Acknowledge a message
    pub async fn ack(&self, target: &AckTarget) -> Result<(), StompError> {
        self.send(target.frame(Command::Ack)).await
    }

    /// Reject a message so the broker redelivers it
    pub async fn nack(&self, target: &AckTarget) -> Result<(), StompError> {
        self.send(target.frame(Command::Nack)).await
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod client_test;
