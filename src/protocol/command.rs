//! Outbound message encoding for the Frame protocol.
//!
//! The TX characteristic accepts three kinds of writes:
//! - Lua source text, executed by the device as-is
//! - Binary data, prefixed with [`DATA_FLAG`]
//! - Single-byte control signals

use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::notification::DATA_FLAG;

/// Control signals understood by the device firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlSignal {
    /// Break out of the running script.
    Break = 0x03,
    /// Restart the Lua virtual machine.
    Reset = 0x04,
}

impl ControlSignal {
    /// Encodes the signal as a one-byte write.
    #[must_use]
    pub fn encode(self) -> Bytes {
        Bytes::copy_from_slice(&[self as u8])
    }
}

/// Encodes Lua source text for the TX characteristic.
#[must_use]
pub fn encode_text(text: &str) -> Bytes {
    Bytes::copy_from_slice(text.as_bytes())
}

/// Encodes binary data for the TX characteristic.
#[must_use]
pub fn encode_data(data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + data.len());
    buf.put_u8(DATA_FLAG);
    buf.put_slice(data);
    buf.freeze()
}
