//! Error types for the frame-ble library.

use thiserror::Error;

use crate::types::{Endpoint, ResponseKind};

/// The main error type for Frame operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Bluetooth stack error.
    #[error("bluetooth error: {0}")]
    Ble(#[from] btleplug::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed notification from the device.
    #[error("notification error: {0}")]
    Notification(#[from] NotificationError),

    /// The device answered with something other than what was expected.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// No matching notification arrived in time.
    #[error("response timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Connection is not established.
    #[error("not connected")]
    NotConnected,

    /// The device is connected in firmware update mode.
    #[error("device is in firmware update mode")]
    FirmwareUpdateMode,

    /// The host has no usable Bluetooth adapter.
    #[error("no bluetooth adapter available")]
    NoAdapter,

    /// Discovery gave up after exhausting its retry budget.
    #[error("device not found after {attempts} attempts")]
    DeviceNotFound { attempts: u32 },

    /// The connected peer lacks a required service or characteristic.
    #[error("{which} not found on device")]
    CharacteristicMissing { which: Endpoint },

    /// Outbound payload exceeds what the link can carry in one write.
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// Script chunk size must be positive.
    #[error("invalid chunk size: {size}")]
    InvalidChunkSize { size: usize },

    /// A response of this kind is already being awaited.
    #[error("a {kind} response is already pending")]
    ResponsePending { kind: ResponseKind },

    /// Channel receive error.
    #[error("channel closed")]
    ChannelClosed,
}

/// Notification decoding errors.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Notification carried no discriminator byte.
    #[error("empty notification")]
    Empty,

    /// Print payload is not valid UTF-8.
    #[error("print payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Result type alias for Frame operations.
pub type Result<T> = std::result::Result<T, Error>;
