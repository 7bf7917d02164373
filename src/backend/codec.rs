//! NDJSON codec for backend streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so a
//! misbehaving backend cannot make the agent buffer an unterminated line
//! without bound.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use acp_turn_agent::backend::codec::BackendCodec;
//!
//! let lines = FramedRead::new(child_stdout, BackendCodec::new());
//! ```

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum line length accepted from the backend: 8 MiB.
///
/// Tool results echoed back by the backend can be large, so the ceiling is
/// higher than a typical control channel would need.
pub const MAX_LINE_BYTES: usize = 8 * 1_048_576;

/// Newline-delimited UTF-8 framing for backend stdout.
///
/// Inbound lines longer than the limit return
/// [`AppError::Protocol`]`("line too long: …")`; the codec then discards
/// input up to the next newline and carries on. I/O errors map to
/// [`AppError::Io`]. Outbound lines are written directly by
/// [`run_writer`](super::writer::run_writer).
#[derive(Debug)]
pub struct BackendCodec(LinesCodec);

impl BackendCodec {
    /// Codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Codec with a custom line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max_length))
    }
}

impl Default for BackendCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for BackendCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let max = self.0.max_length();
        self.0.decode(src).map_err(|e| map_codec_error(e, max))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let max = self.0.max_length();
        self.0.decode_eof(src).map_err(|e| map_codec_error(e, max))
    }
}

fn map_codec_error(e: LinesCodecError, max: usize) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Protocol(format!("line too long: exceeded {max} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
