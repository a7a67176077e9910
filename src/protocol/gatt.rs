//! GATT identifiers for Frame devices.

use uuid::Uuid;

/// Frame data service.
pub const FRAME_SERVICE_UUID: Uuid = Uuid::from_u128(0x7A23_0001_5475_A6A4_654C_8431_F6AD_49C4);

/// Device-to-host notifications.
pub const FRAME_RX_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x7A23_0002_5475_A6A4_654C_8431_F6AD_49C4);

/// Host-to-device writes.
pub const FRAME_TX_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x7A23_0003_5475_A6A4_654C_8431_F6AD_49C4);

/// Nordic secure DFU service, advertised while in firmware update mode.
pub const DFU_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_FE59_0000_1000_8000_0080_5F9B_34FB);

/// Advertised local name of a Frame in normal mode.
pub const FRAME_DEVICE_NAME: &str = "Frame";
