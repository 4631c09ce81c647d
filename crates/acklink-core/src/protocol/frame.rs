//! Frame encoding and validation
//!
//! Frame format:
//! - 8 bytes: header magic
//! - 1 byte: control (reserved)
//! - 1 byte: data length `L`
//! - L bytes: data
//! - 1 byte: check
//! - 1 byte: tail (0x16)
//!
//! Total length is always `L + 12`.

use super::{
    ProtocolError, DEFAULT_CHECK_BYTE, FRAME_OVERHEAD, HEADER_MAGIC, LENGTH_OFFSET, TAIL_BYTE,
};

/// Structural acceptance rule for a candidate frame.
///
/// The candidate must be longer than 11 bytes, start with the header magic,
/// end with the tail marker, and carry a length byte equal to `len - 12`.
pub fn is_valid_frame(data: &[u8]) -> bool {
    data.len() >= FRAME_OVERHEAD
        && data.last() == Some(&TAIL_BYTE)
        && data[..HEADER_MAGIC.len()] == HEADER_MAGIC
        && data[LENGTH_OFFSET] as usize == data.len() - FRAME_OVERHEAD
}

/// A complete, validated protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Wrap raw bytes, returning `None` if they fail the acceptance rule
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        if is_valid_frame(&bytes) {
            Some(Self { bytes })
        } else {
            None
        }
    }

    /// Control byte (offset 8)
    pub fn control(&self) -> u8 {
        self.bytes[HEADER_MAGIC.len()]
    }

    /// Declared data length
    pub fn data_len(&self) -> usize {
        self.bytes[LENGTH_OFFSET] as usize
    }

    /// Data bytes between the length field and the check byte
    pub fn data(&self) -> &[u8] {
        let start = LENGTH_OFFSET + 1;
        &self.bytes[start..start + self.data_len()]
    }

    /// Check byte preceding the tail
    pub fn check(&self) -> u8 {
        self.bytes[self.bytes.len() - 2]
    }

    /// Total encoded length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// A frame always carries at least its fixed overhead
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Raw encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the frame, returning the encoded bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Builder for outbound command frames
pub struct FrameBuilder {
    control: u8,
    data: Vec<u8>,
    check: u8,
}

impl FrameBuilder {
    /// Create a new frame builder
    pub fn new() -> Self {
        Self {
            control: 0x00,
            data: Vec::new(),
            check: DEFAULT_CHECK_BYTE,
        }
    }

    /// Set the control byte
    pub fn control(mut self, control: u8) -> Self {
        self.control = control;
        self
    }

    /// Add a single data byte
    pub fn byte(mut self, b: u8) -> Self {
        self.data.push(b);
        self
    }

    /// Add raw data bytes
    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.data.extend_from_slice(data);
        self
    }

    /// Override the check byte
    pub fn check(mut self, check: u8) -> Self {
        self.check = check;
        self
    }

    /// Build the frame
    pub fn build(self) -> Result<Frame, ProtocolError> {
        let len = u8::try_from(self.data.len())
            .map_err(|_| ProtocolError::FrameTooLong(self.data.len()))?;

        let mut bytes = Vec::with_capacity(FRAME_OVERHEAD + self.data.len());
        bytes.extend_from_slice(&HEADER_MAGIC);
        bytes.push(self.control);
        bytes.push(len);
        bytes.extend_from_slice(&self.data);
        bytes.push(self.check);
        bytes.push(TAIL_BYTE);

        Ok(Frame { bytes })
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}
