//! STOMP 1.2 frames
//!
//! ```text
//! COMMAND\n
//! header1:value1\n
//! header2:value2\n
//! \n
//! body^@
//! ```
//!
//! Header values are escaped (`\\`, `\n`, `\r`, `\c`) on every frame except
//! `CONNECT` and `CONNECTED`. A `content-length` header, when present, gives
//! the exact body size and allows NUL bytes inside the body; otherwise the
//! body runs to the first NUL. Bare EOLs between frames are heart-beats and
//! are skipped.

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Largest frame accepted from the broker (16MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Frame decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("malformed header line '{0}'")]
    MalformedHeader(String),

    #[error("invalid escape sequence in '{0}'")]
    InvalidEscape(String),

    #[error("invalid content-length '{0}'")]
    InvalidContentLength(String),

    #[error("frame body not terminated by NUL")]
    MissingNul,

    #[error("frame headers are not valid UTF-8")]
    InvalidUtf8,

    #[error("frame too large: {size} bytes (limit: {limit})")]
    TooLarge { size: usize, limit: usize },
}

/// STOMP commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // Client frames
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    // Server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// Frames whose headers are sent without escaping
    fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "CONNECTED" => Self::Connected,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        })
    }
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    /// Headers in wire order; repeated names are kept
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Frame {
    /// Frame with no headers and an empty body
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header (repeated headers: the first one wins)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize onto `dst`
    ///
    /// A `content-length` header is added for non-empty bodies unless one is
    /// already present.
    pub fn encode(&self, dst: &mut BytesMut) {
        let escape = self.command.escapes_headers();

        dst.put_slice(self.command.as_str().as_bytes());
        dst.put_u8(b'\n');

        for (name, value) in &self.headers {
            put_header_part(dst, name, escape);
            dst.put_u8(b':');
            put_header_part(dst, value, escape);
            dst.put_u8(b'\n');
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            dst.put_slice(format!("content-length:{}\n", self.body.len()).as_bytes());
        }

        dst.put_u8(b'\n');
        dst.put_slice(&self.body);
        dst.put_u8(0);
    }

    /// Take one complete frame off the front of `buf`
    ///
    /// Returns `Ok(None)` when more data is needed; the buffer is left
    /// untouched in that case apart from skipped heart-beats.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        skip_heartbeats(buf);
        if buf.is_empty() {
            return Ok(None);
        }

        let Some((head_end, body_start)) = find_blank_line(buf) else {
            return incomplete(buf.len());
        };

        let head = std::str::from_utf8(&buf[..head_end]).map_err(|_| FrameError::InvalidUtf8)?;
        let mut lines = head.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));

        let command: Command = lines.next().unwrap_or_default().parse()?;
        let escaped = command.escapes_headers();

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if escaped {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(n, _)| n == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| FrameError::InvalidContentLength(v.clone()))
            })
            .transpose()?;

        let body_end = match content_length {
            Some(len) => {
                let end = body_start + len;
                if end > MAX_FRAME_SIZE {
                    return Err(FrameError::TooLarge {
                        size: end,
                        limit: MAX_FRAME_SIZE,
                    });
                }
                if buf.len() <= end {
                    return Ok(None);
                }
                if buf[end] != 0 {
                    return Err(FrameError::MissingNul);
                }
                end
            }
            None => match buf[body_start..].iter().position(|&b| b == 0) {
                Some(pos) => body_start + pos,
                None => return incomplete(buf.len()),
            },
        };

        let mut frame = buf.split_to(body_end + 1).freeze();
        frame.truncate(body_end);
        let body = frame.slice(body_start..);

        Ok(Some(Frame {
            command,
            headers,
            body,
        }))
    }
}

fn incomplete(buffered: usize) -> Result<Option<Frame>, FrameError> {
    if buffered > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            size: buffered,
            limit: MAX_FRAME_SIZE,
        });
    }
    Ok(None)
}

fn skip_heartbeats(buf: &mut BytesMut) {
    loop {
        if buf.first() == Some(&b'\n') {
            buf.advance(1);
        } else if buf.starts_with(b"\r\n") {
            buf.advance(2);
        } else {
            return;
        }
    }
}

/// Locate the blank line ending the headers
///
/// Returns (end of the last header line, start of the body).
fn find_blank_line(buf: &[u8]) -> Option<(usize, usize)> {
    let mut pos = 0;
    while let Some(offset) = buf[pos..].iter().position(|&b| b == b'\n') {
        let nl = pos + offset;
        match buf.get(nl + 1..) {
            Some([b'\n', ..]) => return Some((nl, nl + 2)),
            Some([b'\r', b'\n', ..]) => return Some((nl, nl + 3)),
            _ => pos = nl + 1,
        }
    }
    None
}

fn put_header_part(dst: &mut BytesMut, s: &str, escape: bool) {
    if !escape {
        dst.put_slice(s.as_bytes());
        return;
    }
    for c in s.chars() {
        match c {
            '\\' => dst.put_slice(b"\\\\"),
            '\r' => dst.put_slice(b"\\r"),
            '\n' => dst.put_slice(b"\\n"),
            ':' => dst.put_slice(b"\\c"),
            c => {
                let mut tmp = [0u8; 4];
                dst.put_slice(c.encode_utf8(&mut tmp).as_bytes());
            }
        }
    }
}

fn unescape(s: &str) -> Result<String, FrameError> {
    if !s.contains('\\') {
        return Ok(s.to_string());
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(s.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod frame_test;
