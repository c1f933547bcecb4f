//! Line framing for collaborator output streams.
//!
//! Wraps [`tokio_util::codec::AnyDelimiterCodec`] split on `\n` with a
//! maximum line length so a runaway line cannot exhaust memory. Lines are
//! framed as bytes and only then decoded as UTF-8, so a line that fails
//! decoding still reaches the capture file. Per-line problems (too long,
//! not UTF-8) are yielded as [`Frame::Malformed`] instead of an error,
//! because [`tokio_util::codec::FramedRead`] stops after the first decoder
//! error and one bad line must not end the stream.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder};

use crate::{AppError, Result};

/// Maximum line length accepted by the stream codec: 8 MiB.
pub const MAX_LINE_BYTES: usize = 8 * 1_048_576;

const NEWLINE: &[u8] = b"\n";

/// One framed unit of collaborator output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line without its terminator.
    Line(String),
    /// A line that could not be decoded.
    Malformed {
        /// Bytes to capture in place of the line: the raw line when it was
        /// not UTF-8, empty when it was too long and had to be discarded.
        raw: Bytes,
        /// Framing error text.
        error: String,
    },
}

/// Newline-delimited decoder for collaborator stdout.
///
/// Inbound lines longer than [`MAX_LINE_BYTES`] yield
/// [`Frame::Malformed`] with empty `raw`; the remainder of that line is
/// discarded and decoding resumes at the next newline. A trailing line
/// without a newline is still yielded at EOF. A trailing `\r` is dropped.
#[derive(Debug)]
pub struct StreamCodec(AnyDelimiterCodec);

impl StreamCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self(AnyDelimiterCodec::new_with_max_length(
            NEWLINE.to_vec(),
            NEWLINE.to_vec(),
            max_length,
        ))
    }
}

impl Default for StreamCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StreamCodec {
    type Item = Frame;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let max = self.0.max_length();
        recover(self.0.decode(src), max)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let max = self.0.max_length();
        recover(self.0.decode_eof(src), max)
    }
}

/// Turn per-line framing errors into [`Frame::Malformed`]; keep I/O errors.
fn recover(
    decoded: std::result::Result<Option<Bytes>, AnyDelimiterCodecError>,
    max: usize,
) -> Result<Option<Frame>> {
    match decoded {
        Ok(chunk) => Ok(chunk.map(into_frame)),
        Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => Ok(Some(Frame::Malformed {
            raw: Bytes::new(),
            error: format!("line too long: exceeded {max} bytes"),
        })),
        Err(AnyDelimiterCodecError::Io(err)) => Err(AppError::from(err)),
    }
}

fn into_frame(chunk: Bytes) -> Frame {
    let line = chunk.strip_suffix(b"\r").unwrap_or(&chunk[..]);
    let decoded = std::str::from_utf8(line).map(str::to_owned);
    match decoded {
        Ok(line) => Frame::Line(line),
        Err(err) => Frame::Malformed {
            raw: chunk,
            error: format!("invalid utf-8: {err}"),
        },
    }
}
