//! Protocol definitions for Frame communication.
//!
//! This module contains the low-level protocol types including:
//! - GATT identifiers
//! - Notification classification
//! - Outbound message encoding and control signals
//! - Script packaging for file uploads

pub mod command;
pub mod gatt;
pub mod notification;
pub mod script;

pub use command::{ControlSignal, encode_data, encode_text};
pub use gatt::{
    DFU_SERVICE_UUID, FRAME_DEVICE_NAME, FRAME_RX_CHARACTERISTIC_UUID, FRAME_SERVICE_UUID,
    FRAME_TX_CHARACTERISTIC_UUID,
};
pub use notification::{DATA_FLAG, Notification, PRINT_FLAG};
pub use script::{
    ChunkBoundaries, DEFAULT_CHUNK_SIZE, DEFAULT_REMOTE_PATH, ScriptSource, UPLOAD_SENTINEL,
    UploadCommand, chunk_boundaries, escape, open_command,
};
