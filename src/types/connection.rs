//! Connection and correlation value types.

use std::fmt;

/// Lifecycle state of the link to the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Connected in normal mode with the data channel open.
    Connected,
    /// Connected to a device advertising in firmware update mode.
    DfuConnected,
    /// No link.
    #[default]
    Disconnected,
}

impl ConnectionState {
    /// Returns true for either connected state.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::DfuConnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connected => "connected",
            Self::DfuConnected => "connected (firmware update mode)",
            Self::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Logical response stream a notification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    /// Text printed by the device.
    Print,
    /// Raw binary data sent by the device.
    Data,
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Print => "print",
            Self::Data => "data",
        })
    }
}

/// A GATT endpoint the data channel requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// The Frame service.
    Service,
    /// Device-to-host notification characteristic.
    Rx,
    /// Host-to-device write characteristic.
    Tx,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Service => "service",
            Self::Rx => "RX characteristic",
            Self::Tx => "TX characteristic",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::DfuConnected.is_connected());
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::Tx.to_string(), "TX characteristic");
        assert_eq!(ResponseKind::Data.to_string(), "data");
    }
}
