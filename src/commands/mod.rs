//! Command handlers for Frame operations.
//!
//! This module provides the request/response exchanges with the device.
//! The device tags nothing with a request id, so every exchange that waits
//! for a reply holds the exchange lock of its response kind from arming
//! until the reply (or timeout).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::protocol::command::{ControlSignal, encode_data, encode_text};
use crate::protocol::script::{ScriptSource, UPLOAD_SENTINEL};
use crate::router::NotificationRouter;
use crate::transport::{Transport, TransportGuard};

/// Default response timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Command handler for Frame operations.
pub struct CommandHandler<T> {
    transport: Arc<Mutex<TransportGuard<T>>>,
    router: NotificationRouter,
    timeout: Duration,
    print_exchange: Mutex<()>,
    data_exchange: Mutex<()>,
}

impl<T: Transport> CommandHandler<T> {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(transport: Arc<Mutex<TransportGuard<T>>>, router: NotificationRouter) -> Self {
        Self {
            transport,
            router,
            timeout: DEFAULT_TIMEOUT,
            print_exchange: Mutex::new(()),
            data_exchange: Mutex::new(()),
        }
    }

    /// Sets the response timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Returns the response timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Writes one payload through the guard.
    async fn write(&self, data: Bytes) -> Result<()> {
        let mut transport = self.transport.lock().await;
        transport.send(data).await
    }

    /// Sends a payload and waits for the next print notification.
    async fn send_and_wait_print(&self, data: Bytes) -> Result<String> {
        // Arm before sending so a fast reply cannot slip past the slot.
        let waiter = self.router.expect_print()?;
        self.write(data).await?;
        waiter.wait(self.timeout).await
    }

    /// Sends a payload and waits for the next data notification.
    async fn send_and_wait_data(&self, data: Bytes) -> Result<Bytes> {
        let waiter = self.router.expect_data()?;
        self.write(data).await?;
        waiter.wait(self.timeout).await
    }

    // ==================== Text Commands ====================

    /// Sends Lua source text, optionally waiting for what it prints.
    pub async fn send_text(&self, text: &str, await_response: bool) -> Result<Option<String>> {
        let data = encode_text(text);
        if !await_response {
            self.write(data).await?;
            return Ok(None);
        }

        let _exchange = self.print_exchange.lock().await;
        self.send_and_wait_print(data).await.map(Some)
    }

    /// Waits for the next printed text without sending anything.
    pub async fn receive_text(&self, timeout: Duration) -> Result<String> {
        let _exchange = self.print_exchange.lock().await;
        self.router.expect_print()?.wait(timeout).await
    }

    // ==================== Data Commands ====================

    /// Sends binary data, optionally waiting for the device's data reply.
    pub async fn send_data(&self, data: &[u8], await_response: bool) -> Result<Option<Bytes>> {
        let data = encode_data(data);
        if !await_response {
            self.write(data).await?;
            return Ok(None);
        }

        let _exchange = self.data_exchange.lock().await;
        self.send_and_wait_data(data).await.map(Some)
    }

    /// Waits for the next data notification without sending anything.
    pub async fn receive_data(&self, timeout: Duration) -> Result<Bytes> {
        let _exchange = self.data_exchange.lock().await;
        self.router.expect_data()?.wait(timeout).await
    }

    // ==================== Control Commands ====================

    /// Sends a control signal without waiting for a reply.
    pub async fn send_signal(&self, signal: ControlSignal) -> Result<()> {
        tracing::debug!("sending {:?} signal", signal);
        self.write(signal.encode()).await
    }

    // ==================== Script Upload ====================

    /// Uploads a script, one acknowledged command at a time.
    ///
    /// Each command must be answered with the upload sentinel before the next
    /// is written. Every command is size-checked before the first write, so a
    /// chunk size too large for the link fails without touching the device.
    pub async fn upload(&self, script: &ScriptSource) -> Result<()> {
        let commands = script.commands()?;
        let payloads: Vec<Bytes> = commands
            .iter()
            .map(|command| encode_text(&command.to_string()))
            .collect();

        {
            let transport = self.transport.lock().await;
            for payload in &payloads {
                transport.check(payload.len())?;
            }
        }

        let _exchange = self.print_exchange.lock().await;
        let total = payloads.len();
        for (index, payload) in payloads.into_iter().enumerate() {
            let reply = self.send_and_wait_print(payload).await?;
            if reply != UPLOAD_SENTINEL {
                return Err(Error::Protocol {
                    message: format!("unexpected reply to upload command {}: {reply:?}", index + 1),
                });
            }
            tracing::debug!("upload command {}/{} acknowledged", index + 1, total);
        }

        tracing::info!(
            "uploaded {} bytes to {}",
            script.source_text().len(),
            script.remote_path()
        );
        Ok(())
    }
}
