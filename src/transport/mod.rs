//! Transport layer for Frame communication.
//!
//! This module provides the abstraction over the byte channel to the device.
//! [`BleTransport`] talks to real hardware; [`MockTransport`] simulates a
//! device in memory. Either is wrapped in a [`TransportGuard`] that enforces
//! the link's payload limit.

pub mod ble;
pub mod discovery;
pub mod guard;
pub mod mock;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::ConnectionState;

/// Trait for transport implementations.
pub trait Transport: Send + Sync {
    /// Connects to the device, returning the mode it was found in.
    fn connect(&mut self)
    -> Pin<Box<dyn Future<Output = Result<ConnectionState>> + Send + '_>>;

    /// Disconnects from the device.
    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Writes one payload to the device in a single write.
    fn send(&mut self, data: Bytes) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Returns true if connected.
    fn is_connected(&self) -> bool;

    /// Returns the link MTU in bytes.
    fn mtu(&self) -> u16;

    /// Sets the channel that receives raw notifications.
    ///
    /// Must be called before [`Transport::connect`].
    fn set_notification_sender(&mut self, tx: mpsc::Sender<Bytes>);
}

pub use ble::{BleConfig, BleTransport};
pub use guard::TransportGuard;
pub use mock::{MockHandle, MockTransport};
