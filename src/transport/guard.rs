//! Outbound payload size enforcement.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Bytes of each packet taken by the ATT header.
pub const ATT_HEADER_LEN: usize = 3;

/// Largest application payload a link with `mtu` can carry in one write.
#[must_use]
pub fn max_payload(mtu: u16) -> usize {
    usize::from(mtu).saturating_sub(ATT_HEADER_LEN)
}

/// Wraps a transport and rejects payloads the link cannot carry.
pub struct TransportGuard<T> {
    inner: T,
    show_payloads: bool,
}

impl<T: Transport> TransportGuard<T> {
    /// Creates a guard around `inner`.
    #[must_use]
    pub const fn new(inner: T) -> Self {
        Self {
            inner,
            show_payloads: false,
        }
    }

    /// Enables logging of every payload before it is written.
    pub fn set_show_payloads(&mut self, enabled: bool) {
        self.show_payloads = enabled;
    }

    /// Returns the largest payload the current link accepts.
    #[must_use]
    pub fn max_payload(&self) -> usize {
        max_payload(self.inner.mtu())
    }

    /// Checks that a payload of `size` bytes fits.
    pub fn check(&self, size: usize) -> Result<()> {
        let max = self.max_payload();
        if size > max {
            return Err(Error::PayloadTooLarge { size, max });
        }
        Ok(())
    }

    /// Validates and writes `payload`.
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLarge` without writing if the payload does
    /// not fit, or the transport's error if the write fails.
    pub async fn send(&mut self, payload: Bytes) -> Result<()> {
        self.check(payload.len())?;

        if self.show_payloads {
            tracing::debug!("tx {} bytes: {}", payload.len(), hex::encode(&payload));
        }

        self.inner.send(payload).await
    }

    /// Returns the wrapped transport.
    pub const fn inner(&self) -> &T {
        &self.inner
    }

    /// Returns the wrapped transport mutably.
    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}
