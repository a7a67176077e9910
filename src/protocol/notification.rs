//! Classification of notifications received from the device.
//!
//! Every notification on the RX characteristic starts with a discriminator:
//! ```text
//! ┌──────────────┬──────────────────────────────┐
//! │ discriminator│           payload            │
//! │    1 byte    │  UTF-8 text or raw bytes     │
//! └──────────────┴──────────────────────────────┘
//! ```
//! `0x01` marks binary data; any other value (`0x00` in practice) marks
//! printed text.

use bytes::Bytes;

use crate::error::NotificationError;
use crate::types::ResponseKind;

/// Discriminator for binary data messages, in both directions.
pub const DATA_FLAG: u8 = 0x01;

/// Discriminator the device uses for printed text.
pub const PRINT_FLAG: u8 = 0x00;

/// A classified notification with its discriminator stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Text printed by the device.
    Print(String),
    /// Binary data sent by the device.
    Data(Bytes),
}

impl Notification {
    /// Returns the response kind this notification resolves.
    #[must_use]
    pub const fn kind(&self) -> ResponseKind {
        match self {
            Self::Print(_) => ResponseKind::Print,
            Self::Data(_) => ResponseKind::Data,
        }
    }
}

/// Returns the response kind selected by a discriminator byte.
#[must_use]
pub const fn classify(discriminator: u8) -> ResponseKind {
    if discriminator == DATA_FLAG {
        ResponseKind::Data
    } else {
        ResponseKind::Print
    }
}

/// Decodes a raw notification.
///
/// # Errors
///
/// Returns a `NotificationError` if:
/// - The notification is empty
/// - A print payload is not valid UTF-8
pub fn decode(raw: &[u8]) -> Result<Notification, NotificationError> {
    let (&discriminator, payload) = raw.split_first().ok_or(NotificationError::Empty)?;

    match classify(discriminator) {
        ResponseKind::Data => Ok(Notification::Data(Bytes::copy_from_slice(payload))),
        ResponseKind::Print => {
            let text = String::from_utf8(payload.to_vec())?;
            Ok(Notification::Print(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_data_strips_discriminator() {
        let notification = decode(&[0x01, 0x05, 0x06]).unwrap();
        assert_eq!(
            notification,
            Notification::Data(Bytes::from_static(&[0x05, 0x06]))
        );
        assert_eq!(notification.kind(), ResponseKind::Data);
    }

    #[test]
    fn test_decode_print() {
        let notification = decode(b"\x00hello").unwrap();
        assert_eq!(notification, Notification::Print("hello".into()));
    }

    #[test]
    fn test_unknown_discriminator_is_print() {
        assert_eq!(classify(0x7f), ResponseKind::Print);
        let notification = decode(b"\x02ok").unwrap();
        assert_eq!(notification, Notification::Print("ok".into()));
    }

    #[test]
    fn test_decode_empty_payload() {
        assert_eq!(
            decode(&[DATA_FLAG]).unwrap(),
            Notification::Data(Bytes::new())
        );
        assert_eq!(
            decode(&[PRINT_FLAG]).unwrap(),
            Notification::Print(String::new())
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode(&[]), Err(NotificationError::Empty)));
        assert!(matches!(
            decode(&[0x00, 0xff, 0xfe]),
            Err(NotificationError::InvalidUtf8(_))
        ));
    }
}
