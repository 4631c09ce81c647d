//! Serial Protocol Communication
//!
//! Implements the half-duplex request/acknowledge protocol used by the
//! field devices: one command is written, the controller waits for a
//! well-formed reply frame, and unanswered commands are retried a bounded
//! number of times.
//!
//! Frames on the wire look like:
//! - 8 bytes: header magic `68 00 00 00 00 00 00 68`
//! - 1 byte: control/reserved
//! - 1 byte: data length `L`
//! - L bytes: data
//! - 1 byte: check
//! - 1 byte: tail `0x16`

mod assembler;
pub mod channel;
mod codec;
mod config;
mod controller;
mod error;
mod frame;
mod outcome;
pub mod serial;
mod signal;

pub use assembler::FrameAssembler;
pub use channel::{Channel, DataReceivedHandler, Transport};
pub use codec::FrameCodec;
pub use config::{LinkConfig, Parity, PortSettings};
pub use controller::{LinkState, PendingCommand, TransportController};
pub use error::ProtocolError;
pub use frame::{is_valid_frame, Frame, FrameBuilder};
pub use outcome::CommandOutcome;
pub use serial::{list_ports, PortInfo, SerialChannel, SerialTransport};
pub use signal::AckSignal;

/// Frame header magic
pub const HEADER_MAGIC: [u8; 8] = [0x68, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x68];

/// Frame start byte, also the first synchronization byte
pub const START_BYTE: u8 = 0x68;

/// Frame tail marker
pub const TAIL_BYTE: u8 = 0x16;

/// Wake-up padding that may precede a frame
pub const PAD_BYTE: u8 = 0xFE;

/// Check byte used by outbound frames unless overridden
pub const DEFAULT_CHECK_BYTE: u8 = 0xD0;

/// Offset of the length field
pub const LENGTH_OFFSET: usize = 9;

/// Bytes a frame carries besides its data (header, control, length, check, tail)
pub const FRAME_OVERHEAD: usize = 12;

/// Default baud rate for device communication
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default time to wait for an acknowledgment in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Attempts made for one command before it is reported as timed out
pub const MAX_ATTEMPTS: u32 = 3;

/// Maximum number of bytes the assembler buffers while hunting for a frame
pub const MAX_BUFFERED_BYTES: usize = 4096;
