//! Discover-and-connect retry loop.
//!
//! The loop is written against the [`Radio`] trait so the retry budget, the
//! deadline and the characteristic checks run the same way over btleplug
//! and over a scripted radio in tests.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::transport::ble::BleConfig;

/// Boxed future returned by [`Radio`] methods.
pub type RadioFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A device picked out of one scan window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovered<P> {
    /// A Frame advertising its configured name.
    Frame(P),
    /// A device advertising the firmware update service.
    Dfu(P),
}

/// One advertisement seen during a scan window.
#[derive(Debug, Clone)]
pub struct Advertisement<P> {
    pub peripheral: P,
    pub local_name: Option<String>,
    pub dfu_service: bool,
}

/// Outcome of a successful discovery.
#[derive(Debug)]
pub enum Linked<P, C> {
    /// Data channel open and subscribed.
    Frame { peripheral: P, channel: C },
    /// Connected to a device in firmware update mode.
    Dfu(P),
}

/// Radio operations driven by [`discover`].
pub trait Radio: Send {
    /// Handle to a remote device.
    type Peripheral: Send + Sync;
    /// Whatever [`Radio::attach`] hands back for writing.
    type Channel: Send;

    /// Runs one scan window.
    fn scan<'a>(
        &'a mut self,
        config: &'a BleConfig,
    ) -> RadioFuture<'a, Result<Option<Discovered<Self::Peripheral>>>>;

    /// Opens a link to `peripheral` within `timeout`.
    fn open<'a>(
        &'a mut self,
        peripheral: &'a Self::Peripheral,
        timeout: Duration,
    ) -> RadioFuture<'a, Result<()>>;

    /// Resolves the Frame service and characteristics and subscribes to RX.
    fn attach<'a>(
        &'a mut self,
        peripheral: &'a Self::Peripheral,
    ) -> RadioFuture<'a, Result<Self::Channel>>;

    /// Drops a link that failed to attach.
    fn release<'a>(&'a mut self, peripheral: &'a Self::Peripheral) -> RadioFuture<'a, ()>;
}

/// Picks the device to connect to from one scan window.
///
/// A device advertising the configured name wins over any device that only
/// advertises the firmware update service, whatever the order they were seen.
pub fn pick<P>(
    adverts: impl IntoIterator<Item = Advertisement<P>>,
    device_name: &str,
) -> Option<Discovered<P>> {
    let mut dfu = None;
    for advert in adverts {
        if advert.local_name.as_deref() == Some(device_name) {
            return Some(Discovered::Frame(advert.peripheral));
        }
        if dfu.is_none() && advert.dfu_service {
            dfu = Some(advert.peripheral);
        }
    }
    dfu.map(Discovered::Dfu)
}

/// Scans until a device is linked, the retry budget runs out or the
/// deadline passes.
///
/// A Frame without the expected service or characteristics fails at once
/// with [`Error::CharacteristicMissing`]; other connection failures use up
/// one attempt each.
pub async fn discover<R: Radio>(
    radio: &mut R,
    config: &BleConfig,
) -> Result<Linked<R::Peripheral, R::Channel>> {
    let deadline = Instant::now() + config.connect_deadline;
    let mut remaining = config.retries;
    let mut attempts = 0;

    tracing::info!("searching for {}", config.device_name);

    while remaining > 0 && Instant::now() < deadline {
        remaining -= 1;
        attempts += 1;

        match radio.scan(config).await? {
            Some(Discovered::Frame(peripheral)) => {
                if let Err(e) = radio.open(&peripheral, config.connection_timeout).await {
                    tracing::warn!("connection attempt {} failed: {}", attempts, e);
                    continue;
                }
                match radio.attach(&peripheral).await {
                    Ok(channel) => {
                        tracing::info!("connected to {}", config.device_name);
                        return Ok(Linked::Frame {
                            peripheral,
                            channel,
                        });
                    }
                    Err(e @ Error::CharacteristicMissing { .. }) => {
                        radio.release(&peripheral).await;
                        return Err(e);
                    }
                    Err(e) => {
                        radio.release(&peripheral).await;
                        tracing::warn!("connection attempt {} failed: {}", attempts, e);
                    }
                }
            }
            Some(Discovered::Dfu(peripheral)) => {
                if let Err(e) = radio.open(&peripheral, config.connection_timeout).await {
                    tracing::warn!("connection attempt {} failed: {}", attempts, e);
                    continue;
                }
                tracing::info!("connected to device in firmware update mode");
                return Ok(Linked::Dfu(peripheral));
            }
            None => {
                tracing::debug!(
                    "{} not found, {} attempts left",
                    config.device_name,
                    remaining
                );
            }
        }
    }

    tracing::error!(
        "{} not found after {} attempts",
        config.device_name,
        attempts
    );
    Err(Error::DeviceNotFound { attempts })
}
