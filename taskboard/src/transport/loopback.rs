//! Loopback transport for testing and offline mode.
//!
//! [`LoopbackHub`] reproduces the relay server's broadcast semantics
//! in-process: publishing a command on any endpoint delivers the matching
//! notification to every endpoint, including the publisher. A single-
//! endpoint hub is how the CLI runs offline: local mutations still echo
//! back through the same inbound path they would take over the network.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use taskboard_proto::sync::{TaskCommand, TaskNotification};

use super::{Transport, TransportError, TransportType};

/// One registered endpoint's delivery channel.
struct PeerSlot {
    name: String,
    tx: mpsc::UnboundedSender<TaskNotification>,
}

/// Shared hub state: every endpoint's sender.
#[derive(Default)]
struct HubInner {
    peers: Mutex<Vec<PeerSlot>>,
}

/// In-process broadcast hub.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    inner: Arc<HubInner>,
}

impl LoopbackHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new endpoint on the hub.
    pub fn endpoint(&self, name: impl Into<String>) -> LoopbackTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        let name = name.into();
        self.inner.peers.lock().push(PeerSlot {
            name: name.clone(),
            tx,
        });
        LoopbackTransport {
            name,
            hub: Arc::clone(&self.inner),
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Severs the named endpoint: its pending and future deliveries stop and
    /// its `next_event` returns `ConnectionClosed`.
    pub fn disconnect(&self, name: &str) {
        self.inner.peers.lock().retain(|p| p.name != name);
    }

    /// Number of currently registered endpoints.
    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.inner.peers.lock().len()
    }
}

/// An endpoint on a [`LoopbackHub`].
pub struct LoopbackTransport {
    name: String,
    hub: Arc<HubInner>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<TaskNotification>>,
}

impl LoopbackTransport {
    /// Returns this endpoint's name on the hub.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Transport for LoopbackTransport {
    async fn publish(&self, command: TaskCommand) -> Result<(), TransportError> {
        let event = TaskNotification::from(command);
        // Endpoints whose receiver is gone are pruned as a side effect.
        self.hub
            .peers
            .lock()
            .retain(|peer| peer.tx.send(event.clone()).is_ok());
        Ok(())
    }

    async fn next_event(&self) -> Result<TaskNotification, TransportError> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        self.hub.peers.lock().iter().any(|p| p.name == self.name)
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Loopback
    }
}
