//! Bluetooth Low Energy transport implementation.
//!
//! This module discovers a Frame by its advertised name, opens the data
//! channel over the TX/RX characteristics and forwards RX notifications to
//! the client. The retry loop itself lives in [`super::discovery`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::protocol::gatt::{
    DFU_SERVICE_UUID, FRAME_DEVICE_NAME, FRAME_RX_CHARACTERISTIC_UUID, FRAME_SERVICE_UUID,
    FRAME_TX_CHARACTERISTIC_UUID,
};
use crate::transport::Transport;
use crate::transport::discovery::{
    Advertisement, Discovered, Linked, Radio, RadioFuture, discover, pick,
};
use crate::types::{ConnectionState, Endpoint};

/// Default link MTU.
///
/// btleplug does not report the negotiated MTU on every platform; Frame
/// negotiates 247 with current hosts.
pub const DEFAULT_MTU: u16 = 247;

/// Default length of each scan window.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(3);

/// Default number of discover-and-connect attempts.
pub const DEFAULT_RETRIES: u32 = 50;

/// Default ceiling on the whole discovery loop.
pub const DEFAULT_CONNECT_DEADLINE: Duration = Duration::from_secs(300);

/// Default timeout for a single connection attempt.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for BLE transport.
#[derive(Debug, Clone)]
pub struct BleConfig {
    /// Advertised local name to connect to.
    pub device_name: String,
    /// Length of each scan window.
    pub scan_duration: Duration,
    /// Number of discover-and-connect attempts.
    pub retries: u32,
    /// Ceiling on the whole discovery loop.
    pub connect_deadline: Duration,
    /// Timeout for a single connection attempt.
    pub connection_timeout: Duration,
    /// Link MTU used to size writes.
    pub mtu: u16,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            device_name: FRAME_DEVICE_NAME.to_owned(),
            scan_duration: DEFAULT_SCAN_DURATION,
            retries: DEFAULT_RETRIES,
            connect_deadline: DEFAULT_CONNECT_DEADLINE,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            mtu: DEFAULT_MTU,
        }
    }
}

impl BleConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the advertised name to connect to.
    #[must_use]
    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Sets the scan window.
    #[must_use]
    pub const fn scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub const fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the ceiling on the whole discovery loop.
    #[must_use]
    pub const fn connect_deadline(mut self, deadline: Duration) -> Self {
        self.connect_deadline = deadline;
        self
    }

    /// Sets the timeout for a single connection attempt.
    #[must_use]
    pub const fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the link MTU.
    #[must_use]
    pub const fn mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }
}

/// btleplug adapter driven by the discovery loop.
struct BtleRadio {
    adapter: Adapter,
}

impl Radio for BtleRadio {
    type Peripheral = Peripheral;
    type Channel = Characteristic;

    fn scan<'a>(
        &'a mut self,
        config: &'a BleConfig,
    ) -> RadioFuture<'a, Result<Option<Discovered<Peripheral>>>> {
        Box::pin(async move {
            self.adapter.start_scan(ScanFilter::default()).await?;
            tokio::time::sleep(config.scan_duration).await;
            self.adapter.stop_scan().await?;

            let mut adverts = Vec::new();
            for peripheral in self.adapter.peripherals().await? {
                let Some(properties) = peripheral.properties().await? else {
                    continue;
                };
                tracing::trace!("advertisement: {:?}", properties.local_name);
                adverts.push(Advertisement {
                    peripheral,
                    dfu_service: properties.services.contains(&DFU_SERVICE_UUID),
                    local_name: properties.local_name,
                });
            }
            Ok(pick(adverts, &config.device_name))
        })
    }

    fn open<'a>(
        &'a mut self,
        peripheral: &'a Peripheral,
        timeout: Duration,
    ) -> RadioFuture<'a, Result<()>> {
        Box::pin(async move {
            tokio::time::timeout(timeout, peripheral.connect())
                .await
                .map_err(|_| Error::Timeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })??;
            Ok(())
        })
    }

    fn attach<'a>(
        &'a mut self,
        peripheral: &'a Peripheral,
    ) -> RadioFuture<'a, Result<Characteristic>> {
        Box::pin(async move {
            peripheral.discover_services().await?;

            let service = peripheral
                .services()
                .into_iter()
                .find(|s| s.uuid == FRAME_SERVICE_UUID)
                .ok_or(Error::CharacteristicMissing {
                    which: Endpoint::Service,
                })?;
            let find = |uuid: Uuid, which: Endpoint| {
                service
                    .characteristics
                    .iter()
                    .find(|c| c.uuid == uuid)
                    .cloned()
                    .ok_or(Error::CharacteristicMissing { which })
            };
            let rx_char = find(FRAME_RX_CHARACTERISTIC_UUID, Endpoint::Rx)?;
            let tx_char = find(FRAME_TX_CHARACTERISTIC_UUID, Endpoint::Tx)?;

            peripheral.subscribe(&rx_char).await?;
            Ok(tx_char)
        })
    }

    fn release<'a>(&'a mut self, peripheral: &'a Peripheral) -> RadioFuture<'a, ()> {
        Box::pin(async move {
            if let Err(e) = peripheral.disconnect().await {
                tracing::debug!("disconnect after failed attach: {}", e);
            }
        })
    }
}

/// BLE transport for Frame communication.
pub struct BleTransport {
    config: BleConfig,
    peripheral: Option<Peripheral>,
    tx_char: Option<Characteristic>,
    notify_tx: Option<mpsc::Sender<Bytes>>,
    notify_task: Option<JoinHandle<()>>,
    state: ConnectionState,
    // Cleared by the forwarder when the notification stream ends.
    link_up: Arc<AtomicBool>,
}

impl BleTransport {
    /// Creates a new BLE transport with the given configuration.
    #[must_use]
    pub fn new(config: BleConfig) -> Self {
        Self {
            config,
            peripheral: None,
            tx_char: None,
            notify_tx: None,
            notify_task: None,
            state: ConnectionState::Disconnected,
            link_up: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &BleConfig {
        &self.config
    }

    async fn adapter() -> Result<Adapter> {
        let manager = Manager::new().await?;
        manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::NoAdapter)
    }

    /// Forwards RX notifications to the current sender, replacing any
    /// previous forwarder.
    async fn forward_notifications(&mut self, peripheral: &Peripheral) -> Result<()> {
        if let Some(task) = self.notify_task.take() {
            task.abort();
        }
        let Some(sender) = self.notify_tx.clone() else {
            tracing::warn!("no notification sender set, notifications will be dropped");
            return Ok(());
        };

        let mut notifications = peripheral.notifications().await?;
        let link_up = Arc::clone(&self.link_up);
        self.notify_task = Some(tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != FRAME_RX_CHARACTERISTIC_UUID {
                    continue;
                }
                if sender.send(Bytes::from(notification.value)).await.is_err() {
                    tracing::debug!("notification receiver dropped");
                    return;
                }
            }
            link_up.store(false, Ordering::SeqCst);
            tracing::info!("notification stream ended, link lost");
        }));
        Ok(())
    }

    /// Returns true if the held peripheral is still linked.
    async fn link_alive(&self, peripheral: &Peripheral) -> bool {
        self.link_up.load(Ordering::SeqCst) && peripheral.is_connected().await.unwrap_or(false)
    }

    /// Drops all link state, returning the peripheral if one was held.
    fn teardown(&mut self) -> Option<Peripheral> {
        if let Some(task) = self.notify_task.take() {
            task.abort();
        }
        self.link_up.store(false, Ordering::SeqCst);
        self.tx_char = None;
        self.state = ConnectionState::Disconnected;
        self.peripheral.take()
    }
}

impl Transport for BleTransport {
    fn connect(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<ConnectionState>> + Send + '_>> {
        Box::pin(async move {
            if let Some(peripheral) = self.peripheral.clone() {
                if self.link_alive(&peripheral).await {
                    // Rebind the forwarder in case the sender was replaced.
                    if self.state == ConnectionState::Connected {
                        self.forward_notifications(&peripheral).await?;
                    }
                    return Ok(self.state);
                }
                tracing::info!("link to {} lost, rediscovering", self.config.device_name);
                self.teardown();
            }

            let mut radio = BtleRadio {
                adapter: Self::adapter().await?,
            };
            match discover(&mut radio, &self.config).await? {
                Linked::Frame {
                    peripheral,
                    channel,
                } => {
                    if let Err(e) = self.forward_notifications(&peripheral).await {
                        radio.release(&peripheral).await;
                        return Err(e);
                    }
                    self.tx_char = Some(channel);
                    self.peripheral = Some(peripheral);
                    self.state = ConnectionState::Connected;
                }
                Linked::Dfu(peripheral) => {
                    self.peripheral = Some(peripheral);
                    self.state = ConnectionState::DfuConnected;
                }
            }

            self.link_up.store(true, Ordering::SeqCst);
            Ok(self.state)
        })
    }

    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if let Some(peripheral) = self.teardown() {
                tracing::info!("disconnecting from {}", self.config.device_name);
                peripheral.disconnect().await?;
            }
            Ok(())
        })
    }

    fn send(&mut self, data: Bytes) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let peripheral = self.peripheral.as_ref().ok_or(Error::NotConnected)?;
            let tx_char = self.tx_char.as_ref().ok_or(Error::NotConnected)?;

            let write_type = if tx_char.properties.contains(CharPropFlags::WRITE) {
                WriteType::WithResponse
            } else {
                WriteType::WithoutResponse
            };
            tracing::trace!("writing {} bytes", data.len());
            peripheral.write(tx_char, &data, write_type).await?;
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.peripheral.is_some() && self.link_up.load(Ordering::SeqCst)
    }

    fn mtu(&self) -> u16 {
        self.config.mtu
    }

    fn set_notification_sender(&mut self, tx: mpsc::Sender<Bytes>) {
        self.notify_tx = Some(tx);
    }
}
