//! # acklink Core Library
//!
//! Core functionality for talking to half-duplex serial field devices.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Frame assembly from fragmented serial reads
//! - Channel lifecycle management over a pluggable transport
//! - Acknowledged command delivery with bounded retry
//! - A typed publish/subscribe bus for command outcomes
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use acklink_core::protocol::{
//!     FrameAssembler, FrameBuilder, PortSettings, SerialTransport, TransportController,
//! };
//!
//! let controller = TransportController::new(SerialTransport::default());
//! controller.on_error(|message| eprintln!("link error: {}", message));
//!
//! let assembler = Arc::new(FrameAssembler::new());
//! let settings = PortSettings::new("/dev/ttyUSB0", 2400);
//! controller.open_with_assembler(&settings, assembler, |frame| {
//!     println!("reply: {:02X?}", frame.data());
//! })?;
//!
//! let command = FrameBuilder::new().control(0x11).bytes(&[0x33, 0x34]).build()?;
//! let outcome = controller.send(command.as_bytes());
//! println!("outcome: {:?}", outcome);
//! # Ok::<(), acklink_core::protocol::ProtocolError>(())
//! ```

pub mod event;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::event::{EventBus, SubscriptionToken};
    pub use crate::protocol::{
        CommandOutcome, Frame, FrameAssembler, FrameBuilder, LinkConfig, LinkState, Parity,
        PortSettings, ProtocolError, SerialTransport, TransportController,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
