//! Sync channel adapter between the repository and the transport.
//!
//! [`SyncChannel`] wraps a [`Transport`] and owns the subscription
//! lifecycle: exactly one handler set is registered at a time, inbound
//! notifications are dispatched to it from a background pump task, and
//! outbound commands are published fire-and-forget. The adapter performs no
//! filtering or deduplication; repeated or out-of-order notifications are
//! made harmless by the repository's idempotent operations.
//!
//! Connection lifecycle is `Disconnected -> Connecting -> Connected`. A
//! transport-level reconnect goes through [`SyncChannel::reattach`], which
//! resumes delivery to the already-registered handlers, so subscribers never
//! re-register across a reconnect.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use taskboard_proto::sync::{TaskCommand, TaskNotification};
use taskboard_proto::task::{Task, TaskId};

use crate::transport::{Transport, TransportError};

/// Errors that can occur on the sync channel.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Connection state of a [`SyncChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No transport attached, or the attached transport has failed.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The transport is live and notifications are being dispatched.
    Connected,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Atomic cell holding a [`ChannelState`].
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    const fn new(state: ChannelState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn get(&self) -> ChannelState {
        match self.0.load(Ordering::SeqCst) {
            0 => ChannelState::Disconnected,
            1 => ChannelState::Connecting,
            _ => ChannelState::Connected,
        }
    }

    fn set(&self, state: ChannelState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// The three inbound event handlers, one per event class.
///
/// Handlers run on the pump task and must not block; they are expected to
/// call the corresponding repository operation directly.
pub struct SyncHandlers {
    /// Invoked for each `TaskAdded` notification.
    pub on_added: Box<dyn FnMut(Task) + Send>,
    /// Invoked for each `TaskUpdated` notification.
    pub on_updated: Box<dyn FnMut(Task) + Send>,
    /// Invoked for each `TaskDeleted` notification.
    pub on_deleted: Box<dyn FnMut(TaskId) + Send>,
}

/// A registered handler set plus the epoch it was registered under.
struct Registration {
    handlers: SyncHandlers,
    epoch: u64,
}

type SharedRegistration = Arc<Mutex<Option<Registration>>>;

/// Disposable handle for a handler registration.
///
/// Dropping the subscription deregisters the handlers synchronously: the
/// dispatch table entry is removed under the same lock the pump dispatches
/// through, so no callback runs after the drop returns. The handle is
/// epoch-checked: dropping a stale subscription after a remount has
/// re-subscribed does not revoke the newer registration.
pub struct Subscription {
    registration: SharedRegistration,
    epoch: u64,
}

impl Subscription {
    /// Deregisters the handlers now, consuming the handle.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut guard = self.registration.lock();
        if guard.as_ref().is_some_and(|reg| reg.epoch == self.epoch) {
            *guard = None;
        }
    }
}

/// Adapter that translates between repository mutations and transport
/// messages.
pub struct SyncChannel<T: Transport> {
    transport: Arc<Mutex<Option<Arc<T>>>>,
    registration: SharedRegistration,
    state: Arc<StateCell>,
    epoch: AtomicU64,
    pump: Mutex<Option<JoinHandle<()>>>,
    attached: Arc<Notify>,
}

impl<T: Transport + 'static> SyncChannel<T> {
    /// Creates a channel over an already-established transport.
    #[must_use]
    pub fn new(transport: T) -> Self {
        let state = if transport.is_connected() {
            ChannelState::Connected
        } else {
            ChannelState::Disconnected
        };
        Self {
            transport: Arc::new(Mutex::new(Some(Arc::new(transport)))),
            registration: Arc::new(Mutex::new(None)),
            state: Arc::new(StateCell::new(state)),
            epoch: AtomicU64::new(0),
            pump: Mutex::new(None),
            attached: Arc::new(Notify::new()),
        }
    }

    /// Creates a channel with no transport attached.
    ///
    /// Use [`connect`](Self::connect) to attach one; until then, publishing
    /// fails with [`TransportError::NotConnected`] and no notifications are
    /// dispatched.
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            transport: Arc::new(Mutex::new(None)),
            registration: Arc::new(Mutex::new(None)),
            state: Arc::new(StateCell::new(ChannelState::Disconnected)),
            epoch: AtomicU64::new(0),
            pump: Mutex::new(None),
            attached: Arc::new(Notify::new()),
        }
    }

    /// Drives a transport connection attempt, exposing the `Connecting`
    /// state while it is in flight.
    ///
    /// # Errors
    ///
    /// Returns the transport's connection error; the channel goes back to
    /// `Disconnected`.
    pub async fn connect<F>(&self, connecting: F) -> Result<(), SyncError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        self.state.set(ChannelState::Connecting);
        match connecting.await {
            Ok(transport) => {
                self.attach(transport);
                Ok(())
            }
            Err(e) => {
                self.state.set(ChannelState::Disconnected);
                Err(e.into())
            }
        }
    }

    /// Attaches a freshly reconnected transport and resumes dispatch to the
    /// registered handlers.
    ///
    /// This is the silent-resubscription path: handlers registered before a
    /// transport failure keep receiving notifications after the swap without
    /// any re-registration.
    pub fn reattach(&self, transport: T) {
        self.attach(transport);
    }

    fn attach(&self, transport: T) {
        *self.transport.lock() = Some(Arc::new(transport));
        self.state.set(ChannelState::Connected);
        self.attached.notify_one();
    }

    /// Registers the handler set, replacing any prior registration.
    ///
    /// Idempotent against remount: subscribing again simply swaps the
    /// dispatch table entry, so events are never applied twice. The pump
    /// task is started on first use.
    pub fn subscribe(&self, handlers: SyncHandlers) -> Subscription {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *self.registration.lock() = Some(Registration { handlers, epoch });
        self.ensure_pump();
        Subscription {
            registration: Arc::clone(&self.registration),
            epoch,
        }
    }

    /// Deregisters all handlers.
    ///
    /// Guaranteed no further callback invocation after this returns: the
    /// entry is removed under the dispatch lock.
    pub fn unsubscribe(&self) {
        *self.registration.lock() = None;
    }

    /// Publishes a command, fire-and-forget.
    ///
    /// No acknowledgement is awaited; delivery is best-effort with whatever
    /// guarantees the transport provides.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] if no transport is attached,
    /// or the transport's own send error.
    pub async fn publish(&self, command: TaskCommand) -> Result<(), SyncError> {
        let transport = self
            .transport
            .lock()
            .clone()
            .ok_or(TransportError::NotConnected)?;
        transport.publish(command).await?;
        Ok(())
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.state.get()
    }

    fn ensure_pump(&self) {
        let mut pump = self.pump.lock();
        if pump.is_none() {
            *pump = Some(tokio::spawn(pump_loop(
                Arc::clone(&self.transport),
                Arc::clone(&self.registration),
                Arc::clone(&self.state),
                Arc::clone(&self.attached),
            )));
        }
    }
}

impl<T: Transport> Drop for SyncChannel<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.pump.lock().take() {
            handle.abort();
        }
    }
}

/// Background task: pull notifications off the transport and dispatch them.
///
/// On a transport failure the loop marks the channel disconnected and parks
/// until a new transport is attached; the registration is left untouched so
/// delivery resumes to the same handlers.
async fn pump_loop<T: Transport>(
    transport: Arc<Mutex<Option<Arc<T>>>>,
    registration: SharedRegistration,
    state: Arc<StateCell>,
    attached: Arc<Notify>,
) {
    loop {
        let current = transport.lock().clone();
        if let Some(current) = current {
            match current.next_event().await {
                Ok(event) => {
                    dispatch(&registration, event);
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "sync channel receive failed, awaiting reattach");
                    state.set(ChannelState::Disconnected);
                }
            }
        }
        attached.notified().await;
    }
}

/// Invokes the registered handler for one notification.
///
/// Runs under the registration lock, which is what makes
/// [`SyncChannel::unsubscribe`] synchronous: once it has taken the lock and
/// cleared the entry, no in-flight event can reach a handler.
fn dispatch(registration: &Mutex<Option<Registration>>, event: TaskNotification) {
    let mut guard = registration.lock();
    let Some(reg) = guard.as_mut() else {
        tracing::debug!("notification dropped, no subscriber");
        return;
    };
    match event {
        TaskNotification::TaskAdded(task) => (reg.handlers.on_added)(task),
        TaskNotification::TaskUpdated(task) => (reg.handlers.on_updated)(task),
        TaskNotification::TaskDeleted(id) => (reg.handlers.on_deleted)(id),
    }
}
