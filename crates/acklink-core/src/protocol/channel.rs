//! Transport abstraction
//!
//! The controller never talks to a serial driver directly. It opens a
//! [`Channel`] through a [`Transport`], which keeps device specifics (and test
//! doubles) out of the protocol logic.

use std::io;
use std::sync::Arc;

use super::{PortSettings, ProtocolError};

/// Callback fired by a channel when inbound bytes are waiting to be read
pub type DataReceivedHandler = Arc<dyn Fn() + Send + Sync>;

/// An open physical link
pub trait Channel: Send {
    /// Write all bytes to the link
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Write text as raw bytes, without framing
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.write_bytes(text.as_bytes())
    }

    /// Drain every byte the driver currently holds, without blocking
    fn read_available(&mut self) -> io::Result<Vec<u8>>;

    /// Whether the link is still usable
    fn is_open(&self) -> bool;

    /// Install or remove the inbound-data notification
    fn set_data_received(&mut self, handler: Option<DataReceivedHandler>);

    /// Close the link. Closing twice is harmless.
    fn close(&mut self);
}

/// Factory for channels plus port enumeration
pub trait Transport: Send + Sync {
    /// Open a channel with the given settings
    fn open(&self, settings: &PortSettings) -> Result<Box<dyn Channel>, ProtocolError>;

    /// Names of the ports currently present
    fn list_port_names(&self) -> Result<Vec<String>, ProtocolError>;
}
