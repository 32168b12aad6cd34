//! # Error Types
//!
//! Custom error types for CoDrone Link using `thiserror`.

use thiserror::Error;

use crate::packet::decoder::DecodeError;

/// Main error type for CoDrone Link
#[derive(Debug, Error)]
pub enum LinkError {
    /// Frame could not be built from the given header and payload
    #[error("Encode error: {0}")]
    Encode(String),

    /// Received frame failed validation
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Serial port could not be configured or used
    #[error("Serial error: {0}")]
    Serial(String),

    /// No serial port was found to auto-select or open
    #[error("Serial port not found (tried: {0})")]
    SerialPortNotFound(String),

    /// Operation needs an open port
    #[error("Serial port is not open")]
    NotOpen,

    /// Device names are matched on their 12-character prefix
    #[error("Device name must be 12 characters long, got {0:?}")]
    InvalidDeviceName(String),

    /// Telemetry serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for CoDrone Link
pub type Result<T> = std::result::Result<T, LinkError>;
