//! In-memory transport that simulates a device.
//!
//! Writes are recorded and can be answered by a scripted responder, which
//! makes request/response flows testable without hardware.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::transport::ble::DEFAULT_MTU;
use crate::types::ConnectionState;

/// Produces the notifications a simulated device sends after a write.
pub type Responder = Box<dyn Fn(&[u8]) -> Vec<Bytes> + Send + Sync>;

#[derive(Default)]
struct Shared {
    written: Mutex<Vec<Bytes>>,
    notify_tx: Mutex<Option<mpsc::Sender<Bytes>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated device transport.
pub struct MockTransport {
    shared: Arc<Shared>,
    mtu: u16,
    mode: ConnectionState,
    connected: bool,
    responder: Option<Responder>,
    // Bound to the link on connect, like a real forwarder.
    pending_tx: Option<mpsc::Sender<Bytes>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a silent device with the default MTU.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            mtu: DEFAULT_MTU,
            mode: ConnectionState::Connected,
            connected: false,
            responder: None,
            pending_tx: None,
        }
    }

    /// Sets the link MTU.
    #[must_use]
    pub const fn with_mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }

    /// Sets the mode reported on connect.
    #[must_use]
    pub const fn with_mode(mut self, mode: ConnectionState) -> Self {
        self.mode = mode;
        self
    }

    /// Answers every write with the notifications `responder` returns.
    #[must_use]
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&[u8]) -> Vec<Bytes> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Returns a handle for inspecting writes and injecting notifications.
    #[must_use]
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Transport for MockTransport {
    fn connect(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<ConnectionState>> + Send + '_>> {
        Box::pin(async move {
            if self.connected {
                return Ok(self.mode);
            }
            *lock(&self.shared.notify_tx) = self.pending_tx.clone();
            self.connected = true;
            tracing::debug!("mock transport connected ({})", self.mode);
            Ok(self.mode)
        })
    }

    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.connected = false;
            lock(&self.shared.notify_tx).take();
            Ok(())
        })
    }

    fn send(&mut self, data: Bytes) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if !self.connected {
                return Err(Error::NotConnected);
            }

            let replies = self
                .responder
                .as_ref()
                .map(|respond| respond(&data))
                .unwrap_or_default();
            lock(&self.shared.written).push(data);

            if replies.is_empty() {
                return Ok(());
            }
            let tx = lock(&self.shared.notify_tx)
                .clone()
                .ok_or(Error::ChannelClosed)?;
            for reply in replies {
                tx.send(reply).await.map_err(|_| Error::ChannelClosed)?;
            }
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn mtu(&self) -> u16 {
        self.mtu
    }

    fn set_notification_sender(&mut self, tx: mpsc::Sender<Bytes>) {
        self.pending_tx = Some(tx);
    }
}

/// Shared view of a [`MockTransport`].
#[derive(Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockHandle {
    /// Returns every payload written so far, in order.
    #[must_use]
    pub fn written(&self) -> Vec<Bytes> {
        lock(&self.shared.written).clone()
    }

    /// Delivers a raw notification as if the device had sent it.
    pub async fn notify(&self, raw: impl Into<Bytes>) -> Result<()> {
        let tx = lock(&self.shared.notify_tx)
            .clone()
            .ok_or(Error::NotConnected)?;
        tx.send(raw.into()).await.map_err(|_| Error::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_requires_connection() {
        let mut transport = MockTransport::new();
        assert!(matches!(
            transport.send(Bytes::from_static(b"x")).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_responder_replies_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut transport = MockTransport::new().with_responder(|data| {
            vec![Bytes::copy_from_slice(data), Bytes::from_static(b"\x00done")]
        });
        transport.set_notification_sender(tx);
        transport.connect().await.unwrap();

        transport.send(Bytes::from_static(b"ping")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().as_ref(), b"ping");
        assert_eq!(rx.recv().await.unwrap().as_ref(), b"\x00done");
        assert_eq!(transport.handle().written().len(), 1);
    }

    #[tokio::test]
    async fn test_handle_notify() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut transport = MockTransport::new().with_mode(ConnectionState::DfuConnected);
        let handle = transport.handle();
        transport.set_notification_sender(tx);

        assert_eq!(
            transport.connect().await.unwrap(),
            ConnectionState::DfuConnected
        );
        handle.notify(&b"\x01\x02"[..]).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().as_ref(), &[0x01, 0x02]);
    }

    #[tokio::test]
    async fn test_connected_link_keeps_its_sender() {
        let (first_tx, mut first_rx) = mpsc::channel(8);
        let (second_tx, mut second_rx) = mpsc::channel(8);
        let mut transport = MockTransport::new();
        let handle = transport.handle();

        transport.set_notification_sender(first_tx);
        transport.connect().await.unwrap();
        transport.set_notification_sender(second_tx);
        transport.connect().await.unwrap();
        handle.notify(&b"\x00a"[..]).await.unwrap();
        assert_eq!(first_rx.recv().await.unwrap().as_ref(), b"\x00a");

        transport.disconnect().await.unwrap();
        assert!(matches!(handle.notify(&b"\x00b"[..]).await, Err(Error::NotConnected)));
        transport.connect().await.unwrap();
        handle.notify(&b"\x00c"[..]).await.unwrap();
        assert_eq!(second_rx.recv().await.unwrap().as_ref(), b"\x00c");
    }
}
