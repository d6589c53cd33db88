//! Tokio codec for newline-delimited JSON frames

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::error::ProtocolError;
use crate::frame::InboundFrame;

/// Decoder for the agent channel.
///
/// Frames are UTF-8 JSON objects, one per line, terminated by `\n`. A frame
/// may span multiple socket reads and multiple frames may arrive in one
/// read; the `BytesMut` accumulator handed in by the `Framed` machinery
/// retains the unconsumed remainder across calls.
///
/// Lines that do not parse as a well-formed frame are skipped rather than
/// surfaced as errors, so a single bad line never tears down the connection.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Scan offset into the accumulator, so already-searched bytes are not
    /// re-scanned on the next partial read
    scanned: usize,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self { scanned: 0 }
    }
}

impl Decoder for FrameCodec {
    type Item = InboundFrame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline = src[self.scanned..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|pos| self.scanned + pos);

            let Some(newline) = newline else {
                // Need more data
                self.scanned = src.len();
                return Ok(None);
            };

            let line = src.split_to(newline + 1);
            self.scanned = 0;

            match InboundFrame::parse(&line[..line.len() - 1]) {
                Some(frame) => return Ok(Some(frame)),
                None => {
                    tracing::debug!(len = line.len(), "Dropping malformed frame");
                }
            }
        }
    }
}
