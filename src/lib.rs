//! # frame-ble
//!
//! A Rust client library for Frame smart glasses.
//!
//! This library provides async communication with Frame devices over
//! Bluetooth Low Energy: pushing Lua scripts to the device and exchanging
//! printed text and binary data with it.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Chunked, acknowledged script uploads
//! - Correlated request/response over the print and data streams
//! - Swappable transports (BLE hardware or in-memory simulation)
//!
//! ## Quick Start
//!
//! ```no_run
//! use frame_ble::{FrameClient, ScriptSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), frame_ble::Error> {
//!     // Find and connect to a Frame
//!     let mut client = FrameClient::ble();
//!     client.connect().await?;
//!
//!     // Run a line of Lua and read what it prints
//!     let reply = client.send_text("print(1 + 2)", true).await?;
//!     println!("Frame says: {reply:?}");
//!
//!     // Upload a script as app.lua
//!     let script = ScriptSource::new("frame.display.text('hi', 1, 1)\nframe.display.show()");
//!     client.upload_script(&script).await?;
//!
//!     // Disconnect
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`protocol`] - Wire formats (notifications, control signals, script packaging)
//! - [`types`] - Value types (connection state, response kinds, endpoints)
//! - [`transport`] - Transport trait, payload guard, BLE and mock transports
//! - [`router`] - Notification routing and response correlation
//! - [`commands`] - Command handler for device exchanges
//! - [`client`] - High-level [`FrameClient`]

pub mod client;
pub mod commands;
pub mod error;
pub mod protocol;
pub mod router;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::FrameClient;
pub use error::{Error, NotificationError, Result};
pub use protocol::{ControlSignal, Notification, ScriptSource, UploadCommand};
pub use router::{NotificationRouter, PendingResponse, Waiter};
pub use transport::{BleConfig, BleTransport, MockTransport, Transport, TransportGuard};
pub use types::{ConnectionState, Endpoint, ResponseKind};
