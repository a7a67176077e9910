//! Routing of device notifications to waiters and handlers.
//!
//! Each notification is classified by its discriminator and then:
//! - resolves the armed waiter of its kind, if there is one
//! - is forwarded to the passive handler of its kind, always
//!
//! Dispatch never blocks and never fails; malformed notifications are
//! reported to the print handler and dropped.

pub mod pending;

use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;

use crate::error::{NotificationError, Result};
use crate::protocol::notification::{self, Notification};
use crate::types::ResponseKind;

pub use pending::{PendingResponse, Waiter};

/// Passive handler for printed text or decode failures.
pub type PrintHandler =
    Arc<dyn Fn(std::result::Result<&str, &NotificationError>) + Send + Sync>;

/// Passive handler for binary data.
pub type DataHandler = Arc<dyn Fn(&Bytes) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    print: Option<PrintHandler>,
    data: Option<DataHandler>,
}

struct RouterInner {
    print: Arc<PendingResponse<String>>,
    data: Arc<PendingResponse<Bytes>>,
    handlers: RwLock<Handlers>,
}

/// Demultiplexes notifications into the print and data streams.
#[derive(Clone)]
pub struct NotificationRouter {
    inner: Arc<RouterInner>,
}

impl Default for NotificationRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationRouter {
    /// Creates a router with idle slots and no handlers.
    #[must_use]
    pub fn new() -> Self {
        let inner = RouterInner {
            print: Arc::new(PendingResponse::new(ResponseKind::Print)),
            data: Arc::new(PendingResponse::new(ResponseKind::Data)),
            handlers: RwLock::new(Handlers::default()),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Sets the passive print handler, replacing any previous one.
    pub fn set_print_handler<F>(&self, handler: F)
    where
        F: Fn(std::result::Result<&str, &NotificationError>) + Send + Sync + 'static,
    {
        let mut handlers = self
            .inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        handlers.print = Some(Arc::new(handler));
    }

    /// Sets the passive data handler, replacing any previous one.
    pub fn set_data_handler<F>(&self, handler: F)
    where
        F: Fn(&Bytes) + Send + Sync + 'static,
    {
        let mut handlers = self
            .inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        handlers.data = Some(Arc::new(handler));
    }

    /// Arms the print slot.
    pub fn expect_print(&self) -> Result<Waiter<String>> {
        self.inner.print.arm()
    }

    /// Arms the data slot.
    pub fn expect_data(&self) -> Result<Waiter<Bytes>> {
        self.inner.data.arm()
    }

    /// Returns true while a waiter of `kind` is armed.
    #[must_use]
    pub fn is_awaiting(&self, kind: ResponseKind) -> bool {
        match kind {
            ResponseKind::Print => self.inner.print.is_awaiting(),
            ResponseKind::Data => self.inner.data.is_awaiting(),
        }
    }

    /// Routes one raw notification.
    pub fn dispatch(&self, raw: &[u8]) {
        tracing::trace!("notification: {} bytes", raw.len());

        let (print, data) = {
            let handlers = self
                .inner
                .handlers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            (handlers.print.clone(), handlers.data.clone())
        };

        match notification::decode(raw) {
            Ok(Notification::Data(bytes)) => {
                self.inner.data.resolve(bytes.clone());
                if let Some(handler) = data {
                    handler(&bytes);
                }
            }
            Ok(Notification::Print(text)) => {
                self.inner.print.resolve(text.clone());
                if let Some(handler) = print {
                    handler(Ok(&text));
                }
            }
            Err(e) => {
                tracing::warn!("dropping malformed notification: {}", e);
                if let Some(handler) = print {
                    handler(Err(&e));
                }
            }
        }
    }
}
