//! Main [`FrameClient`] implementation.
//!
//! This module provides the high-level [`FrameClient`] that combines the
//! transport, notification routing and commands into a unified interface.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use crate::commands::CommandHandler;
use crate::error::{Error, NotificationError, Result};
use crate::protocol::command::ControlSignal;
use crate::protocol::script::ScriptSource;
use crate::router::NotificationRouter;
use crate::transport::{BleConfig, BleTransport, Transport, TransportGuard};
use crate::types::ConnectionState;

/// Capacity of the queue between the transport and the router.
const NOTIFICATION_QUEUE: usize = 256;

/// Client for communicating with a Frame device.
pub struct FrameClient<T> {
    transport: Arc<Mutex<TransportGuard<T>>>,
    router: NotificationRouter,
    commands: CommandHandler<T>,
    state: watch::Sender<ConnectionState>,

    // Background task
    process_task: Option<JoinHandle<()>>,
}

impl FrameClient<BleTransport> {
    /// Creates a new client that looks for a device named `Frame`.
    ///
    /// # Returns
    ///
    /// A new client (not yet connected).
    #[must_use]
    pub fn ble() -> Self {
        Self::with_ble_config(BleConfig::new())
    }

    /// Creates a new client with custom BLE configuration.
    #[must_use]
    pub fn with_ble_config(config: BleConfig) -> Self {
        Self::new(BleTransport::new(config))
    }
}

impl<T: Transport + 'static> FrameClient<T> {
    /// Creates a new client with the given transport.
    #[must_use]
    pub fn new(transport: T) -> Self {
        let transport = Arc::new(Mutex::new(TransportGuard::new(transport)));
        let router = NotificationRouter::new();
        let commands = CommandHandler::new(Arc::clone(&transport), router.clone());
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            transport,
            router,
            commands,
            state,
            process_task: None,
        }
    }

    /// Connects to the device.
    ///
    /// This will:
    /// 1. Hand the transport a notification queue
    /// 2. Open the transport connection
    /// 3. Start the background routing task
    ///
    /// Calling this while the link is up and routing is a no-op that returns
    /// the current state.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery or connection fails.
    pub async fn connect(&mut self) -> Result<ConnectionState> {
        let routing = self
            .process_task
            .as_ref()
            .is_some_and(|task| !task.is_finished());
        let (notify_tx, mut notify_rx) = mpsc::channel::<Bytes>(NOTIFICATION_QUEUE);

        let state = {
            let mut transport = self.transport.lock().await;
            if routing && transport.inner().is_connected() {
                let state = self.state();
                tracing::debug!("already {}", state);
                return Ok(state);
            }
            transport.inner_mut().set_notification_sender(notify_tx);
            transport.inner_mut().connect().await?
        };

        if let Some(task) = self.process_task.take() {
            task.abort();
        }
        let router = self.router.clone();
        self.process_task = Some(tokio::spawn(async move {
            while let Some(notification) = notify_rx.recv().await {
                router.dispatch(&notification);
            }
            tracing::debug!("notification queue closed");
        }));

        self.state.send_replace(state);
        tracing::info!("device {}", state);
        Ok(state)
    }

    /// Disconnects from the device.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(task) = self.process_task.take() {
            task.abort();
        }

        {
            let mut transport = self.transport.lock().await;
            transport.inner_mut().disconnect().await?;
        }

        self.state.send_replace(ConnectionState::Disconnected);
        Ok(())
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes connection state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Returns true if connected in either mode.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Returns the command handler for direct command access.
    #[must_use]
    pub const fn commands(&self) -> &CommandHandler<T> {
        &self.commands
    }

    /// Returns the notification router.
    #[must_use]
    pub const fn router(&self) -> &NotificationRouter {
        &self.router
    }

    /// Sets the response timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.commands.set_timeout(timeout);
    }

    /// Enables debug logging of every outbound payload.
    pub async fn set_show_payloads(&self, enabled: bool) {
        self.transport.lock().await.set_show_payloads(enabled);
    }

    /// Returns the largest payload a single write may carry.
    pub async fn max_payload(&self) -> usize {
        self.transport.lock().await.max_payload()
    }

    /// Registers the handler that sees every printed line.
    pub fn on_print<F>(&self, handler: F)
    where
        F: Fn(std::result::Result<&str, &NotificationError>) + Send + Sync + 'static,
    {
        self.router.set_print_handler(handler);
    }

    /// Registers the handler that sees every data notification.
    pub fn on_data<F>(&self, handler: F)
    where
        F: Fn(&Bytes) + Send + Sync + 'static,
    {
        self.router.set_data_handler(handler);
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::DfuConnected => Err(Error::FirmwareUpdateMode),
            ConnectionState::Disconnected => Err(Error::NotConnected),
        }
    }

    // ==================== High-Level Device Methods ====================

    /// Uploads a script to the device.
    pub async fn upload_script(&self, script: &ScriptSource) -> Result<()> {
        self.ensure_ready()?;
        self.commands.upload(script).await
    }

    /// Reads a script from the host and uploads it to the default path.
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let script = ScriptSource::from_path(path)?;
        self.upload_script(&script).await
    }

    /// Sends Lua source text, returning what it prints if `await_response`.
    pub async fn send_text(&self, text: &str, await_response: bool) -> Result<Option<String>> {
        self.ensure_ready()?;
        self.commands.send_text(text, await_response).await
    }

    /// Sends binary data, returning the device's reply if `await_response`.
    pub async fn send_bytes(&self, data: &[u8], await_response: bool) -> Result<Option<Bytes>> {
        self.ensure_ready()?;
        self.commands.send_data(data, await_response).await
    }

    /// Waits for the next printed text.
    pub async fn receive_text(&self, timeout: Duration) -> Result<String> {
        self.ensure_ready()?;
        self.commands.receive_text(timeout).await
    }

    /// Waits for the next data notification.
    pub async fn receive_bytes(&self, timeout: Duration) -> Result<Bytes> {
        self.ensure_ready()?;
        self.commands.receive_data(timeout).await
    }

    /// Breaks out of the script running on the device.
    pub async fn halt_execution(&self) -> Result<()> {
        self.ensure_ready()?;
        self.commands.send_signal(ControlSignal::Break).await
    }

    /// Restarts the device's Lua virtual machine.
    pub async fn reset(&self) -> Result<()> {
        self.ensure_ready()?;
        self.commands.send_signal(ControlSignal::Reset).await
    }
}

impl<T> Drop for FrameClient<T> {
    fn drop(&mut self) {
        if let Some(task) = self.process_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tracing_subscriber::EnvFilter;

    use super::*;
    use crate::protocol::script::UPLOAD_SENTINEL;
    use crate::transport::{MockHandle, MockTransport};
    use crate::types::ResponseKind;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn print(text: &str) -> Bytes {
        let mut raw = vec![0x00];
        raw.extend_from_slice(text.as_bytes());
        Bytes::from(raw)
    }

    fn acknowledges_uploads(data: &[u8]) -> Vec<Bytes> {
        let sentinel = format!("print('{UPLOAD_SENTINEL}')");
        if data.ends_with(sentinel.as_bytes()) {
            vec![print(UPLOAD_SENTINEL)]
        } else {
            Vec::new()
        }
    }

    async fn connected(transport: MockTransport) -> (FrameClient<MockTransport>, MockHandle) {
        init_tracing();
        let handle = transport.handle();
        let mut client = FrameClient::new(transport);
        client.connect().await.unwrap();
        (client, handle)
    }

    #[tokio::test]
    async fn test_connection_state_lifecycle() {
        let mut client = FrameClient::new(MockTransport::new());
        let watcher = client.watch_state();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(matches!(
            client.send_text("print(1)", false).await,
            Err(Error::NotConnected)
        ));

        assert_eq!(client.connect().await.unwrap(), ConnectionState::Connected);
        assert_eq!(*watcher.borrow(), ConnectionState::Connected);
        assert!(client.is_connected());

        client.disconnect().await.unwrap();
        assert_eq!(*watcher.borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_twice_keeps_routing() {
        let transport = MockTransport::new().with_responder(|data| {
            if data == b"print(2)" {
                vec![print("2")]
            } else {
                Vec::new()
            }
        });
        let (mut client, handle) = connected(transport).await;

        assert_eq!(client.connect().await.unwrap(), ConnectionState::Connected);
        let reply = client.send_text("print(2)", true).await.unwrap();
        assert_eq!(reply.as_deref(), Some("2"));
        assert_eq!(handle.written().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_after_disconnect() {
        let transport = MockTransport::new().with_responder(|_| vec![print("up")]);
        let (mut client, _handle) = connected(transport).await;

        client.disconnect().await.unwrap();
        assert!(matches!(
            client.send_text("print(1)", true).await,
            Err(Error::NotConnected)
        ));

        client.connect().await.unwrap();
        let reply = client.send_text("print(1)", true).await.unwrap();
        assert_eq!(reply.as_deref(), Some("up"));
    }

    #[tokio::test]
    async fn test_dfu_mode_rejects_commands() {
        let (client, handle) =
            connected(MockTransport::new().with_mode(ConnectionState::DfuConnected)).await;
        assert_eq!(client.state(), ConnectionState::DfuConnected);
        assert!(matches!(
            client.upload_script(&ScriptSource::new("print(1)")).await,
            Err(Error::FirmwareUpdateMode)
        ));
        assert!(handle.written().is_empty());
    }

    #[tokio::test]
    async fn test_send_text_awaits_print() {
        let transport = MockTransport::new().with_responder(|data| {
            if data == b"print('hello')" {
                vec![print("hello")]
            } else {
                Vec::new()
            }
        });
        let (client, handle) = connected(transport).await;

        let reply = client.send_text("print('hello')", true).await.unwrap();
        assert_eq!(reply.as_deref(), Some("hello"));
        assert_eq!(handle.written(), vec![Bytes::from_static(b"print('hello')")]);
    }

    #[tokio::test]
    async fn test_send_text_without_await() {
        let (client, handle) = connected(MockTransport::new()).await;
        assert_eq!(client.send_text("frame.display.show()", false).await.unwrap(), None);
        assert_eq!(handle.written().len(), 1);
        assert!(!client.router().is_awaiting(ResponseKind::Print));
    }

    #[tokio::test]
    async fn test_send_bytes_awaits_data() {
        let transport = MockTransport::new().with_responder(|data| {
            if data.first() == Some(&0x01) {
                vec![Bytes::from_static(&[0x01, 0x06])]
            } else {
                Vec::new()
            }
        });
        let (client, handle) = connected(transport).await;

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.on_data(move |bytes| sink.lock().unwrap().push(bytes.clone()));

        let reply = client.send_bytes(&[0x10, 0x20], true).await.unwrap();
        assert_eq!(reply, Some(Bytes::from_static(&[0x06])));
        assert_eq!(handle.written(), vec![Bytes::from_static(&[0x01, 0x10, 0x20])]);
        assert_eq!(*seen.lock().unwrap(), vec![Bytes::from_static(&[0x06])]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_timeout_resets_pending() {
        let (mut client, handle) = connected(MockTransport::new()).await;
        client.set_timeout(Duration::from_secs(1));

        let result = client.send_text("print(1)", true).await;
        assert!(matches!(result, Err(Error::Timeout { timeout_ms: 1000 })));
        assert!(!client.router().is_awaiting(ResponseKind::Print));

        // A late reply reaches only the passive handler.
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        client.on_print(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.notify(print("1")).await.unwrap();
        while seen.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        let next = client.receive_text(Duration::from_millis(10)).await;
        assert!(matches!(next, Err(Error::Timeout { .. })));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_receive_text_and_bytes() {
        let (client, handle) = connected(MockTransport::new()).await;

        let notifier = handle.clone();
        let (text, ()) = tokio::join!(client.receive_text(Duration::from_secs(1)), async {
            while !client.router().is_awaiting(ResponseKind::Print) {
                tokio::task::yield_now().await;
            }
            notifier.notify(print("tap")).await.unwrap();
        });
        assert_eq!(text.unwrap(), "tap");

        let (data, ()) = tokio::join!(client.receive_bytes(Duration::from_secs(1)), async {
            while !client.router().is_awaiting(ResponseKind::Data) {
                tokio::task::yield_now().await;
            }
            handle.notify(Bytes::from_static(&[0x01, 0xbe, 0xef])).await.unwrap();
        });
        assert_eq!(data.unwrap().as_ref(), &[0xbe, 0xef]);
    }

    #[tokio::test]
    async fn test_concurrent_same_kind_requests_serialize() {
        let transport = MockTransport::new()
            .with_responder(|data| vec![print(&format!("ack {}", data.len()))]);
        let (client, handle) = connected(transport).await;

        let (first, second) =
            tokio::join!(client.send_text("a", true), client.send_text("bb", true));
        assert_eq!(first.unwrap().as_deref(), Some("ack 1"));
        assert_eq!(second.unwrap().as_deref(), Some("ack 2"));
        assert_eq!(handle.written().len(), 2);
    }

    #[tokio::test]
    async fn test_payload_too_large() {
        let (client, handle) = connected(MockTransport::new()).await;
        let max = client.max_payload().await;
        assert_eq!(max, 244);

        let text = "x".repeat(max + 1);
        assert!(matches!(
            client.send_text(&text, false).await,
            Err(Error::PayloadTooLarge { size: 245, max: 244 })
        ));
        assert!(handle.written().is_empty());

        client.send_text(&"x".repeat(max), false).await.unwrap();
        assert_eq!(handle.written().len(), 1);
    }

    #[tokio::test]
    async fn test_halt_and_reset() {
        let (client, handle) = connected(MockTransport::new()).await;
        client.halt_execution().await.unwrap();
        client.reset().await.unwrap();
        assert_eq!(
            handle.written(),
            vec![Bytes::from_static(&[0x03]), Bytes::from_static(&[0x04])]
        );
    }

    #[tokio::test]
    async fn test_upload_500_char_script() {
        let (client, handle) =
            connected(MockTransport::new().with_responder(acknowledges_uploads)).await;
        let script = ScriptSource::new("a".repeat(500));

        client.upload_script(&script).await.unwrap();

        let written = handle.written();
        assert_eq!(written.len(), 4);
        assert!(written[0].starts_with(b"f=frame.file.open('app.lua', 'w')"));
        let chunk_lengths: Vec<usize> = written[1..]
            .iter()
            .map(|w| w.iter().filter(|&&b| b == b'a').count())
            .collect();
        assert_eq!(chunk_lengths, vec![170, 170, 160]);
        assert!(!client.router().is_awaiting(ResponseKind::Print));
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_waits_for_each_acknowledgement() {
        let writes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&writes);
        let transport = MockTransport::new().with_responder(move |data| {
            // Acknowledge the open command and the first chunk only.
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                acknowledges_uploads(data)
            } else {
                Vec::new()
            }
        });
        let (mut client, handle) = connected(transport).await;
        client.set_timeout(Duration::from_secs(2));

        let result = client.upload_script(&ScriptSource::new("b".repeat(500))).await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert_eq!(handle.written().len(), 3);
    }

    #[tokio::test]
    async fn test_upload_rejects_unexpected_reply() {
        let transport = MockTransport::new().with_responder(|_| vec![print("[string]:1: error")]);
        let (client, handle) = connected(transport).await;

        let result = client.upload_script(&ScriptSource::new("print(1)")).await;
        assert!(matches!(result, Err(Error::Protocol { .. })));
        assert_eq!(handle.written().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_validates_before_writing() {
        let (client, handle) =
            connected(MockTransport::new().with_responder(acknowledges_uploads)).await;

        let zero = ScriptSource::new("print(1)").with_chunk_size(0);
        assert!(matches!(
            client.upload_script(&zero).await,
            Err(Error::InvalidChunkSize { size: 0 })
        ));

        let oversize = ScriptSource::new("c".repeat(400)).with_chunk_size(300);
        assert!(matches!(
            client.upload_script(&oversize).await,
            Err(Error::PayloadTooLarge { .. })
        ));
        assert!(handle.written().is_empty());
    }

    #[tokio::test]
    async fn test_upload_file() {
        let path = std::env::temp_dir().join("frame_ble_client_upload.lua");
        std::fs::write(&path, "print(\"hi\")\n").unwrap();

        let (client, handle) =
            connected(MockTransport::new().with_responder(acknowledges_uploads)).await;
        let result = client.upload_file(&path).await;
        std::fs::remove_file(&path).unwrap();

        result.unwrap();
        let written = handle.written();
        assert_eq!(written.len(), 2);
        assert_eq!(
            written[1].as_ref(),
            "f:write('print(\\\"hi\\\")\\n');print('\u{2}')".as_bytes()
        );
    }

    #[tokio::test]
    async fn test_malformed_notification_reported() {
        let (client, handle) = connected(MockTransport::new()).await;
        let errors = Arc::new(AtomicUsize::new(0));
        let lines = Arc::new(AtomicUsize::new(0));
        let (error_count, line_count) = (Arc::clone(&errors), Arc::clone(&lines));
        client.on_print(move |result| {
            if result.is_err() {
                error_count.fetch_add(1, Ordering::SeqCst);
            }
            line_count.fetch_add(1, Ordering::SeqCst);
        });

        handle.notify(Bytes::from_static(&[0x00, 0xff])).await.unwrap();
        handle.notify(print("still alive")).await.unwrap();
        while lines.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }

        let (text, ()) = tokio::join!(client.receive_text(Duration::from_secs(1)), async {
            while !client.router().is_awaiting(ResponseKind::Print) {
                tokio::task::yield_now().await;
            }
            handle.notify(print("next")).await.unwrap();
        });
        assert_eq!(text.unwrap(), "next");
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }
}
