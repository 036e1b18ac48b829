//! Session wiring: one board, one repository, one subscription.
//!
//! [`BoardSession::start`] constructs the repository, sync channel, and
//! coordinator as explicitly owned instances (there is no process-wide
//! store) and installs the three inbound handlers that translate
//! notifications into repository operations. The handler registration is
//! held as a [`Subscription`] guard on the session, so tearing the session
//! down deregisters the handlers before any replacement session subscribes.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use taskboard_proto::task::Task;

use crate::coordinator::{SharedRepository, TaskCoordinator};
use crate::notice::{Origin, TaskNotice};
use crate::store::TaskRepository;
use crate::sync::{ChannelState, Subscription, SyncChannel, SyncHandlers};
use crate::transport::Transport;

/// Default capacity of the notice channel handed to the UI.
pub const DEFAULT_NOTICE_BUFFER: usize = 64;

/// A live board session: repository, coordinator, and sync subscription.
pub struct BoardSession<T: Transport> {
    repo: SharedRepository,
    channel: Arc<SyncChannel<T>>,
    coordinator: TaskCoordinator<T>,
    _subscription: Subscription,
}

impl<T: Transport + 'static> BoardSession<T> {
    /// Starts a session over an already-established transport.
    ///
    /// Returns the session and the receiver for user-facing
    /// [`TaskNotice`]s.
    #[must_use]
    pub fn start(transport: T, notice_buffer: usize) -> (Self, mpsc::Receiver<TaskNotice>) {
        Self::with_channel(SyncChannel::new(transport), notice_buffer)
    }

    /// Starts a session over a pre-built sync channel (which may still be
    /// disconnected or mid-connect).
    #[must_use]
    pub fn with_channel(
        channel: SyncChannel<T>,
        notice_buffer: usize,
    ) -> (Self, mpsc::Receiver<TaskNotice>) {
        let channel = Arc::new(channel);
        let repo: SharedRepository = Arc::new(Mutex::new(TaskRepository::new()));
        let (notice_tx, notice_rx) = mpsc::channel(notice_buffer);

        let subscription = channel.subscribe(inbound_handlers(&repo, &notice_tx));
        let coordinator =
            TaskCoordinator::new(Arc::clone(&repo), Arc::clone(&channel), notice_tx);

        (
            Self {
                repo,
                channel,
                coordinator,
                _subscription: subscription,
            },
            notice_rx,
        )
    }

    /// Returns the mutation coordinator, the session's write surface.
    #[must_use]
    pub const fn coordinator(&self) -> &TaskCoordinator<T> {
        &self.coordinator
    }

    /// Returns the sync channel, for state inspection and reattachment.
    #[must_use]
    pub fn channel(&self) -> &SyncChannel<T> {
        &self.channel
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Returns a snapshot of the canonical ordered task collection.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.repo.lock().snapshot()
    }
}

/// Builds the three inbound handlers over a shared repository.
///
/// Each handler validates its payload, applies the corresponding repository
/// operation, and emits a Remote notice only when the operation actually
/// applied; the echo of a local mutation is a repository no-op and stays
/// silent. A notification that fails validation is rejected without
/// touching the repository; it never takes down the dispatch loop.
fn inbound_handlers(
    repo: &SharedRepository,
    notice_tx: &mpsc::Sender<TaskNotice>,
) -> SyncHandlers {
    let (add_repo, update_repo, delete_repo) =
        (Arc::clone(repo), Arc::clone(repo), Arc::clone(repo));
    let (add_tx, update_tx, delete_tx) =
        (notice_tx.clone(), notice_tx.clone(), notice_tx.clone());

    SyncHandlers {
        on_added: Box::new(move |task: Task| {
            if let Err(e) = task.validate() {
                tracing::warn!(task_id = %task.id, error = %e, "rejecting invalid task-added event");
                return;
            }
            if add_repo.lock().insert(task.clone()) {
                let _ = add_tx.try_send(TaskNotice::Added {
                    task,
                    origin: Origin::Remote,
                });
            } else {
                tracing::debug!(task_id = %task.id, "duplicate task-added event ignored");
            }
        }),
        on_updated: Box::new(move |task: Task| {
            if let Err(e) = task.validate() {
                tracing::warn!(task_id = %task.id, error = %e, "rejecting invalid task-updated event");
                return;
            }
            if update_repo.lock().replace(task.clone()) {
                let _ = update_tx.try_send(TaskNotice::Updated {
                    task,
                    origin: Origin::Remote,
                });
            } else {
                tracing::debug!(task_id = %task.id, "task-updated event for unknown task ignored");
            }
        }),
        on_deleted: Box::new(move |id| {
            if delete_repo.lock().remove(&id) {
                let _ = delete_tx.try_send(TaskNotice::Deleted {
                    id,
                    origin: Origin::Remote,
                });
            } else {
                tracing::debug!(task_id = %id, "task-deleted event for unknown task ignored");
            }
        }),
    }
}
