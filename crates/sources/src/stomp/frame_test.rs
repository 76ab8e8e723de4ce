//! Tests for STOMP frame encoding and decoding

use bytes::{Bytes, BytesMut};

use super::*;

fn encode(frame: &Frame) -> BytesMut {
    let mut buf = BytesMut::new();
    frame.encode(&mut buf);
    buf
}

fn decode_all(input: &[u8]) -> Vec<Frame> {
    let mut buf = BytesMut::from(input);
    let mut frames = Vec::new();
    while let Some(frame) = Frame::decode(&mut buf).unwrap() {
        frames.push(frame);
    }
    assert!(buf.is_empty(), "leftover bytes: {:?}", buf);
    frames
}

// =============================================================================
// Encoding
// =============================================================================

#[test]
fn test_encode_without_body() {
    let frame = Frame::new(Command::Ack).with_header("id", "m-1");
    assert_eq!(&encode(&frame)[..], b"ACK\nid:m-1\n\n\0");
}

#[test]
fn test_encode_adds_content_length() {
    let frame = Frame::new(Command::Send)
        .with_header("destination", "/queue/a")
        .with_body(Bytes::from_static(b"hi"));
    assert_eq!(
        &encode(&frame)[..],
        b"SEND\ndestination:/queue/a\ncontent-length:2\n\nhi\0"
    );
}

#[test]
fn test_encode_escapes_headers() {
    let frame = Frame::new(Command::Send).with_header("a:b", "line1\nline2\\x\r");
    assert_eq!(&encode(&frame)[..], b"SEND\na\\cb:line1\\nline2\\\\x\\r\n\n\0");
}

#[test]
fn test_connect_headers_not_escaped() {
    let frame = Frame::new(Command::Connect).with_header("passcode", "a:b");
    assert_eq!(&encode(&frame)[..], b"CONNECT\npasscode:a:b\n\n\0");
}

// =============================================================================
// Decoding
// =============================================================================

#[test]
fn test_decode_simple() {
    let frames = decode_all(b"CONNECTED\nversion:1.2\nserver:RabbitMQ/3.13\n\n\0");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, Command::Connected);
    assert_eq!(frames[0].header("version"), Some("1.2"));
    assert_eq!(frames[0].header("server"), Some("RabbitMQ/3.13"));
    assert!(frames[0].body.is_empty());
}

#[test]
fn test_decode_body_until_nul() {
    let frames = decode_all(b"MESSAGE\ndestination:/queue/a\n\n{\"id\":1}\0");
    assert_eq!(&frames[0].body[..], b"{\"id\":1}");
}

#[test]
fn test_decode_content_length_body_with_nul() {
    let frames = decode_all(b"MESSAGE\ncontent-length:5\n\na\0b\0c\0");
    assert_eq!(&frames[0].body[..], b"a\0b\0c");
}

#[test]
fn test_decode_crlf_and_heartbeats() {
    let frames = decode_all(b"\n\r\nMESSAGE\r\nmessage-id:1\r\n\r\nbody\0\n\n");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].header("message-id"), Some("1"));
    assert_eq!(&frames[0].body[..], b"body");
}

#[test]
fn test_decode_multiple_frames() {
    let frames = decode_all(b"RECEIPT\nreceipt-id:1\n\n\0\nMESSAGE\nmessage-id:2\n\nx\0");
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].command, Command::Receipt);
    assert_eq!(frames[1].command, Command::Message);
}

#[test]
fn test_decode_unescapes_headers() {
    let frames = decode_all(b"MESSAGE\ntable:a\\cb\\n\\\\\n\n\0");
    assert_eq!(frames[0].header("table"), Some("a:b\n\\"));
}

#[test]
fn test_decode_connected_not_unescaped() {
    let frames = decode_all(b"CONNECTED\nserver:x\\y\n\n\0");
    assert_eq!(frames[0].header("server"), Some("x\\y"));
}

#[test]
fn test_repeated_header_first_wins() {
    let frames = decode_all(b"MESSAGE\nfoo:first\nfoo:second\n\n\0");
    assert_eq!(frames[0].header("foo"), Some("first"));
    assert_eq!(frames[0].headers.len(), 2);
}

#[test]
fn test_decode_partial_needs_more() {
    let full = b"MESSAGE\ncontent-length:4\n\nabcd\0";
    for split in 1..full.len() {
        let mut buf = BytesMut::from(&full[..split]);
        assert_eq!(Frame::decode(&mut buf).unwrap(), None, "split at {split}");
        buf.extend_from_slice(&full[split..]);
        let frame = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame.body[..], b"abcd");
    }
}

#[test]
fn test_decode_errors() {
    let cases: &[(&[u8], FrameError)] = &[
        (b"BOGUS\n\n\0", FrameError::UnknownCommand("BOGUS".into())),
        (b"MESSAGE\nno-colon\n\n\0", FrameError::MalformedHeader("no-colon".into())),
        (b"MESSAGE\na:\\t\n\n\0", FrameError::InvalidEscape("\\t".into())),
        (b"MESSAGE\ncontent-length:x\n\n\0", FrameError::InvalidContentLength("x".into())),
        (b"MESSAGE\ncontent-length:1\n\nab\0", FrameError::MissingNul),
    ];
    for (input, expected) in cases {
        let mut buf = BytesMut::from(*input);
        assert_eq!(Frame::decode(&mut buf).unwrap_err(), *expected);
    }
}

#[test]
fn test_decode_rejects_oversized_frame() {
    let header = format!("MESSAGE\ncontent-length:{}\n\n", MAX_FRAME_SIZE + 1);
    let mut buf = BytesMut::from(header.as_bytes());
    assert!(matches!(
        Frame::decode(&mut buf),
        Err(FrameError::TooLarge { .. })
    ));
}

#[test]
fn test_roundtrip_escaped_headers_and_binary_body() {
    let frame = Frame::new(Command::Message)
        .with_header("table", "weird:name\nx")
        .with_header("message-id", "42")
        .with_body(Bytes::from_static(b"\0\x01{}\0"));

    let frames = decode_all(&encode(&frame));
    assert_eq!(frames[0].header("table"), Some("weird:name\nx"));
    assert_eq!(frames[0].body, frame.body);
}
