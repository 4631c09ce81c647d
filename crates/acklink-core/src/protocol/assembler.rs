//! Frame assembly from fragmented reads
//!
//! Serial drivers hand over whatever happens to be in the receive buffer, so a
//! reply frame may arrive split across any number of reads. The assembler
//! accumulates fragments until a prefix of the buffered data passes the
//! acceptance rule.

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, trace, warn};

use super::config::LinkConfig;
use super::frame::{is_valid_frame, Frame};
use super::{MAX_BUFFERED_BYTES, PAD_BYTE, START_BYTE, TAIL_BYTE};

/// Where a buffer stands with respect to frame synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyncPoint {
    /// Nothing buffered
    Empty,
    /// Only wake-up padding so far
    PaddingOnly,
    /// Data does not begin with a synchronization byte
    Lost,
    /// Candidate frame begins at this offset (after any padding)
    At(usize),
}

/// Locate the start of a candidate frame
pub(crate) fn sync_point(data: &[u8]) -> SyncPoint {
    match data.first() {
        None => SyncPoint::Empty,
        Some(&b) if b == START_BYTE || b == PAD_BYTE => {
            match data.iter().position(|&b| b != PAD_BYTE) {
                Some(offset) => SyncPoint::At(offset),
                None => SyncPoint::PaddingOnly,
            }
        }
        Some(_) => SyncPoint::Lost,
    }
}

/// Length of the shortest prefix of `data` that ends on a tail marker and
/// passes the acceptance rule.
///
/// Every tail position is tried in ascending order, so a length byte that
/// happens to collide with a tail marker inside the body does not end the
/// search.
pub(crate) fn scan_frame(data: &[u8]) -> Option<usize> {
    data.iter()
        .enumerate()
        .filter(|&(_, &b)| b == TAIL_BYTE)
        .map(|(i, _)| i + 1)
        .find(|&len| is_valid_frame(&data[..len]))
}

/// Accumulates fragments and extracts complete frames.
///
/// `decode` takes `&self` and serializes internally, so one assembler can be
/// shared between the inbound-data thread and anyone else feeding it.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: Mutex<Vec<u8>>,
    max_buffered: usize,
}

impl FrameAssembler {
    /// Create an assembler with the default buffer cap
    pub fn new() -> Self {
        Self::with_max_buffered(MAX_BUFFERED_BYTES)
    }

    /// Create an assembler that discards its buffer once it grows past `max_buffered`
    pub fn with_max_buffered(max_buffered: usize) -> Self {
        Self {
            buffer: Mutex::new(Vec::new()),
            max_buffered,
        }
    }

    /// Create an assembler capped at `config.max_buffered_bytes`
    pub fn from_config(config: &LinkConfig) -> Self {
        Self::with_max_buffered(config.max_buffered_bytes)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        // A panic mid-decode leaves at worst a stale buffer, which the next
        // unsynchronized fragment discards anyway.
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a fragment and return the first complete frame, if any.
    ///
    /// The buffer is cleared when a frame is returned, when the buffered data
    /// does not start with `0x68` or `0xFE` padding, or when it holds nothing
    /// but padding. Otherwise it is retained for the next fragment.
    pub fn decode(&self, fragment: &[u8]) -> Option<Frame> {
        let mut buffer = self.lock();
        buffer.extend_from_slice(fragment);

        let start = match sync_point(&buffer) {
            SyncPoint::Empty => return None,
            SyncPoint::PaddingOnly => {
                trace!("assembler: {} bytes of padding only", buffer.len());
                buffer.clear();
                return None;
            }
            SyncPoint::Lost => {
                debug!("assembler: discarding unsynchronized data {:02X?}", &buffer[..]);
                buffer.clear();
                return None;
            }
            SyncPoint::At(start) => start,
        };

        if let Some(len) = scan_frame(&buffer[start..]) {
            let bytes = buffer[start..start + len].to_vec();
            buffer.clear();
            debug!("assembler: frame complete {:02X?}", bytes);
            return Frame::from_bytes(bytes);
        }

        if buffer.len() > self.max_buffered {
            warn!(
                "assembler: {} bytes buffered without a frame, discarding",
                buffer.len()
            );
            buffer.clear();
        }

        None
    }

    /// Number of bytes currently buffered
    pub fn buffered_len(&self) -> usize {
        self.lock().len()
    }

    /// Drop any buffered fragments
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: [u8; 8] = [0x68, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x68];

    #[test]
    fn test_sync_point() {
        assert_eq!(sync_point(&[]), SyncPoint::Empty);
        assert_eq!(sync_point(&[0xFE, 0xFE]), SyncPoint::PaddingOnly);
        assert_eq!(sync_point(&[0x00, 0x68]), SyncPoint::Lost);
        assert_eq!(sync_point(&[0x68, 0x00]), SyncPoint::At(0));
        assert_eq!(sync_point(&[0xFE, 0xFE, 0x68]), SyncPoint::At(2));
    }

    #[test]
    fn test_scan_skips_early_tail_markers() {
        // Data byte 0x16 at offset 11 forms a 12-byte candidate with a bad length.
        let mut data = HEADER.to_vec();
        data.extend_from_slice(&[0x01, 0x02, 0xAA, 0x16, 0xD0, 0x16]);
        assert_eq!(data.len(), 14);
        assert_eq!(scan_frame(&data), Some(14));
        assert_eq!(scan_frame(&data[..12]), None);
    }

    #[test]
    fn test_from_config_uses_buffer_cap() {
        let config = LinkConfig {
            max_buffered_bytes: 16,
            ..LinkConfig::default()
        };
        let asm = FrameAssembler::from_config(&config);
        let mut data = HEADER.to_vec();
        data.extend_from_slice(&[0x55; 9]);
        assert!(asm.decode(&data).is_none());
        assert_eq!(asm.buffered_len(), 0);
    }

    #[test]
    fn test_decode_single_fragment() {
        let asm = FrameAssembler::new();
        let mut data = HEADER.to_vec();
        data.extend_from_slice(&[0x01, 0x00, 0xD0, 0x16]);

        let frame = asm.decode(&data).expect("frame");
        assert_eq!(frame.as_bytes(), &data[..]);
        assert_eq!(asm.buffered_len(), 0);
        assert!(asm.decode(&[]).is_none());
    }

    #[test]
    fn test_buffer_cap_discards() {
        let asm = FrameAssembler::with_max_buffered(16);
        assert!(asm.decode(&HEADER).is_none());
        assert_eq!(asm.buffered_len(), 8);
        assert!(asm.decode(&[0x00; 9]).is_none());
        assert_eq!(asm.buffered_len(), 0);
    }
}
