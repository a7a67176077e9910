//! Single-slot rendezvous between a blocked caller and the router.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::types::ResponseKind;

struct Armed<T> {
    id: u64,
    sender: oneshot::Sender<T>,
}

/// At most one outstanding waiter for one response kind.
///
/// Resolution is one-shot: the first value offered after arming goes to the
/// waiter and the slot returns to idle. Values offered while idle are not
/// queued.
pub struct PendingResponse<T> {
    kind: ResponseKind,
    slot: Mutex<Option<Armed<T>>>,
    next_id: AtomicU64,
}

impl<T> PendingResponse<T> {
    /// Creates an idle slot.
    #[must_use]
    pub fn new(kind: ResponseKind) -> Self {
        Self {
            kind,
            slot: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns the kind of response this slot correlates.
    #[must_use]
    pub const fn kind(&self) -> ResponseKind {
        self.kind
    }

    fn lock(&self) -> MutexGuard<'_, Option<Armed<T>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true while a waiter is armed.
    #[must_use]
    pub fn is_awaiting(&self) -> bool {
        self.lock().as_ref().is_some_and(|armed| !armed.sender.is_closed())
    }

    /// Arms the slot and returns the waiter.
    ///
    /// # Errors
    ///
    /// Returns `Error::ResponsePending` if another waiter is still armed.
    pub fn arm(self: &Arc<Self>) -> Result<Waiter<T>> {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|armed| !armed.sender.is_closed()) {
            return Err(Error::ResponsePending { kind: self.kind });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        *slot = Some(Armed { id, sender });
        tracing::trace!("armed {} waiter {}", self.kind, id);

        Ok(Waiter {
            pending: Arc::clone(self),
            id,
            receiver: Some(receiver),
        })
    }

    /// Hands `value` to the armed waiter, if any.
    ///
    /// Returns true if a waiter was resolved.
    pub fn resolve(&self, value: T) -> bool {
        let Some(armed) = self.lock().take() else {
            return false;
        };
        tracing::trace!("resolving {} waiter {}", self.kind, armed.id);
        armed.sender.send(value).is_ok()
    }

    /// Clears the slot if it still belongs to waiter `id`.
    fn disarm(&self, id: u64) {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|armed| armed.id == id) {
            *slot = None;
        }
    }
}

/// The caller's half of an armed [`PendingResponse`].
///
/// Dropping a waiter before it resolves returns the slot to idle.
pub struct Waiter<T> {
    pending: Arc<PendingResponse<T>>,
    id: u64,
    receiver: Option<oneshot::Receiver<T>>,
}

impl<T> Waiter<T> {
    /// Waits for the slot to resolve.
    ///
    /// # Errors
    ///
    /// Returns `Error::Timeout` if nothing arrives within `timeout`; the slot
    /// is reset to idle before returning.
    pub async fn wait(mut self, timeout: Duration) -> Result<T> {
        let Some(receiver) = self.receiver.take() else {
            return Err(Error::ChannelClosed);
        };

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => {
                tracing::debug!("{} response timed out", self.pending.kind);
                Err(Error::Timeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }
}

impl<T> Drop for Waiter<T> {
    fn drop(&mut self) {
        self.pending.disarm(self.id);
    }
}
