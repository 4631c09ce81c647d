//! Frame codec for async byte streams
//!
//! Applies the same synchronization and acceptance rule as
//! [`FrameAssembler`](super::FrameAssembler) to a `tokio_util` framed stream.
//! Unlike the assembler, bytes following an emitted frame stay buffered so the
//! next call can pick up a back-to-back reply.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use super::assembler::{scan_frame, sync_point, SyncPoint};
use super::{Frame, ProtocolError, MAX_BUFFERED_BYTES};

/// `Decoder`/`Encoder` for protocol frames
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_buffered: usize,
}

impl FrameCodec {
    /// Create a codec with the default buffer cap
    pub fn new() -> Self {
        Self {
            max_buffered: MAX_BUFFERED_BYTES,
        }
    }

    /// Create a codec that drops unframed input past `max_buffered` bytes
    pub fn with_max_buffered(max_buffered: usize) -> Self {
        Self { max_buffered }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        let start = match sync_point(src) {
            SyncPoint::Empty => return Ok(None),
            SyncPoint::PaddingOnly | SyncPoint::Lost => {
                debug!("codec: dropping {} unsynchronized bytes", src.len());
                src.clear();
                return Ok(None);
            }
            SyncPoint::At(start) => start,
        };

        match scan_frame(&src[start..]) {
            Some(len) => {
                src.advance(start);
                let bytes = src.split_to(len);
                Ok(Frame::from_bytes(bytes.to_vec()))
            }
            None => {
                if src.len() > self.max_buffered {
                    debug!("codec: {} bytes without a frame, dropping", src.len());
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        dst.reserve(frame.len());
        dst.put_slice(frame.as_bytes());
        Ok(())
    }
}
