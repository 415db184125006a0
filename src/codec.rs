use bytes::{Buf, BytesMut};
use std::io::Cursor;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{self, Frame};
use crate::Error;

/// Default upper bound for a single buffered frame: 512 MiB, the same as Redis' `proto-max-bulk-len`.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// Attempts to parse one frame from the start of `src`.
///
/// Returns `Ok(None)` when `src` does not yet hold a complete frame; nothing is consumed in that
/// case and the caller is expected to retry once more bytes are available. On success, returns the
/// number of bytes the frame occupies together with the frame itself.
pub fn try_parse(src: &[u8]) -> Result<Option<(usize, Frame)>, frame::Error> {
    let mut cursor = Cursor::new(src);

    match Frame::parse(&mut cursor) {
        Ok(frame) => Ok(Some((cursor.position() as usize, frame))),
        Err(frame::Error::Incomplete) => Ok(None),
        Err(err) => Err(err),
    }
}

pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> FrameCodec {
        FrameCodec { max_frame_size }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match try_parse(&src[..])? {
            Some((consumed, frame)) => {
                // Remove the parsed frame from the buffer.
                src.advance(consumed);
                Ok(Some(frame))
            }
            None if src.len() > self.max_frame_size => {
                // Check if the frame size exceeds a certain limit to prevent DoS attacks
                Err(format!(
                    "protocol error; frame exceeds the limit of {} bytes",
                    self.max_frame_size
                )
                .into())
            }
            None => {
                // Not enough data to parse a frame.
                src.reserve(4096);
                Ok(None)
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&frame.serialize());
        Ok(())
    }
}
