//! Protocol errors

use thiserror::Error;

/// Errors that can occur during protocol communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Transport is not initialized")]
    NotInitialized,

    #[error("Serial port is not open")]
    NotOpen,

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Unsupported port setting: {0}")]
    Unsupported(String),

    #[error("Frame data too long: {0} bytes (max 255)")]
    FrameTooLong(usize),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serialport::Error> for ProtocolError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(e.to_string()),
            _ => ProtocolError::SerialError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::ConfigError(e.to_string())
    }
}
