//! Transport event stream.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::connection::Connection;
use crate::protocol::Frame;

/// Lifecycle and traffic notifications from a transport endpoint.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A connection was established.
    Connected(Arc<Connection>),
    /// A connection was torn down.
    Disconnected(Arc<Connection>),
    /// A verified frame arrived, before command dispatch.
    Receive {
        connection: Arc<Connection>,
        frame: Frame,
    },
    /// A non-fatal or fatal runtime error.
    Error {
        connection: Option<Arc<Connection>>,
        error: String,
    },
}

/// Hands transport events to at most one subscriber.
///
/// Events emitted before anyone subscribes, or after the subscriber is
/// dropped, are discarded. Subscribing again replaces the previous
/// receiver.
#[derive(Default)]
pub struct EventHub {
    tx: Mutex<Option<UnboundedSender<TransportEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start receiving events from now on.
    pub fn subscribe(&self) -> UnboundedReceiver<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.lock() = Some(tx);
        rx
    }

    pub(crate) fn emit(&self, event: TransportEvent) {
        let mut guard = self.lock();
        if let Some(tx) = guard.as_ref() {
            if tx.send(event).is_err() {
                // Receiver dropped; stop buffering into the void.
                *guard = None;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<UnboundedSender<TransportEvent>>> {
        self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
