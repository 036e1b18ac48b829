//! Mutation coordinator: the façade the UI layer calls.
//!
//! Every mutation follows the same policy: validate, apply to the local
//! repository first (optimistic: the caller sees its own change without
//! waiting on the network), emit a notice, then broadcast the matching
//! command. A failed broadcast is logged and otherwise ignored: the local
//! state stays correct, and the board converges again on the next
//! successful sync. The echo of each broadcast comes back through the
//! session's inbound handlers and no-ops against the repository.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use taskboard_proto::sync::TaskCommand;
use taskboard_proto::task::{Task, TaskDraft, TaskId, ValidationError};

use crate::notice::{Origin, TaskNotice};
use crate::store::TaskRepository;
use crate::sync::SyncChannel;
use crate::transport::Transport;

/// Repository handle shared between the coordinator and the session's
/// inbound handlers. The lock is only ever held for the duration of one
/// synchronous repository operation.
pub type SharedRepository = Arc<Mutex<TaskRepository>>;

/// Applies local mutations and broadcasts them to the board.
pub struct TaskCoordinator<T: Transport> {
    repo: SharedRepository,
    channel: Arc<SyncChannel<T>>,
    notice_tx: mpsc::Sender<TaskNotice>,
}

impl<T: Transport + 'static> TaskCoordinator<T> {
    /// Creates a coordinator over the given repository and sync channel.
    #[must_use]
    pub const fn new(
        repo: SharedRepository,
        channel: Arc<SyncChannel<T>>,
        notice_tx: mpsc::Sender<TaskNotice>,
    ) -> Self {
        Self {
            repo,
            channel,
            notice_tx,
        }
    }

    /// Adds a task to the board.
    ///
    /// Synthesizes an id when the draft lacks one, applies the insert
    /// locally, then broadcasts. The new task is visible through
    /// [`snapshot`](Self::snapshot) before any transport interaction.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the draft's name is empty or too long.
    pub async fn add_task(&self, draft: TaskDraft) -> Result<Task, ValidationError> {
        let task = draft.into_task()?;

        let applied = self.repo.lock().insert(task.clone());
        if applied {
            self.notify(TaskNotice::Added {
                task: task.clone(),
                origin: Origin::Local,
            });
            self.broadcast(TaskCommand::AddTask(task.clone())).await;
        } else {
            // Caller-supplied id already on the board; tolerated as a no-op.
            tracing::warn!(task_id = %task.id, "add with duplicate id ignored");
        }

        Ok(task)
    }

    /// Replaces an existing task (last-write-wins).
    ///
    /// Returns `Ok(false)` when no task with that id exists locally, an
    /// expected outcome under network reordering, not an error. The command
    /// is broadcast either way so remote repositories converge on whichever
    /// state they can apply.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the new name is empty or too long.
    pub async fn update_task(&self, task: Task) -> Result<bool, ValidationError> {
        task.validate()?;

        let applied = self.repo.lock().replace(task.clone());
        if applied {
            self.notify(TaskNotice::Updated {
                task: task.clone(),
                origin: Origin::Local,
            });
        } else {
            tracing::debug!(task_id = %task.id, "update for unknown task applied as no-op");
        }
        self.broadcast(TaskCommand::UpdateTask(task)).await;

        Ok(applied)
    }

    /// Deletes a task from the board.
    ///
    /// Returns `false` when no task with that id exists locally; the delete
    /// is still broadcast so peers that do hold the task converge.
    pub async fn delete_task(&self, id: &TaskId) -> bool {
        let applied = self.repo.lock().remove(id);
        if applied {
            self.notify(TaskNotice::Deleted {
                id: id.clone(),
                origin: Origin::Local,
            });
        } else {
            tracing::debug!(task_id = %id, "delete for unknown task applied as no-op");
        }
        self.broadcast(TaskCommand::DeleteTask(id.clone())).await;

        applied
    }

    /// Returns a snapshot of the canonical ordered collection.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Task> {
        self.repo.lock().snapshot()
    }

    /// Best-effort broadcast: the local optimistic state is already correct,
    /// so a transport failure only delays convergence.
    async fn broadcast(&self, command: TaskCommand) {
        if let Err(e) = self.channel.publish(command).await {
            tracing::warn!(error = %e, "broadcast failed, keeping local state");
        }
    }

    /// Best-effort notice emission; a full notice channel drops the notice
    /// rather than blocking a mutation.
    fn notify(&self, notice: TaskNotice) {
        if self.notice_tx.try_send(notice).is_err() {
            tracing::debug!("notice channel full or closed, notice dropped");
        }
    }
}
