//! Unit tests for backend NDJSON framing.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use acp_turn_agent::backend::codec::{BackendCodec, MAX_LINE_BYTES};
use acp_turn_agent::AppError;

#[test]
fn complete_line_is_decoded_without_newline() {
    let mut codec = BackendCodec::new();
    let mut buf = BytesMut::from("{\"type\":\"result\"}\n");

    let line = codec.decode(&mut buf).expect("decode");

    assert_eq!(line.as_deref(), Some("{\"type\":\"result\"}"));
}

#[test]
fn partial_line_waits_for_newline() {
    let mut codec = BackendCodec::new();
    let mut buf = BytesMut::from("{\"type\":");

    assert_eq!(codec.decode(&mut buf).expect("partial decode"), None);

    buf.extend_from_slice(b"\"assistant\"}\n");
    assert_eq!(
        codec.decode(&mut buf).expect("completed decode").as_deref(),
        Some("{\"type\":\"assistant\"}")
    );
}

#[test]
fn batched_lines_decode_one_at_a_time() {
    let mut codec = BackendCodec::new();
    let mut buf = BytesMut::from("a\nb\n");

    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("a"));
    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("b"));
    assert_eq!(codec.decode(&mut buf).unwrap(), None);
}

/// An over-long line is reported as a protocol error and the codec recovers
/// at the next newline.
#[test]
fn over_long_line_is_protocol_error_then_recovers() {
    let mut codec = BackendCodec::with_max_length(8);
    let mut buf = BytesMut::from("0123456789abcdef\nok\n");

    let err = codec.decode(&mut buf).expect_err("line exceeds limit");
    assert!(
        matches!(&err, AppError::Protocol(msg) if msg.starts_with("line too long")),
        "unexpected error: {err}"
    );

    let mut next = codec.decode(&mut buf).expect("decode after discard");
    if next.is_none() {
        next = codec.decode(&mut buf).expect("second decode after discard");
    }
    assert_eq!(next.as_deref(), Some("ok"));
}

#[test]
fn default_limit_is_eight_mebibytes() {
    assert_eq!(MAX_LINE_BYTES, 8 * 1024 * 1024);
}
