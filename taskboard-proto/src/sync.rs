//! Task synchronization messages.
//!
//! Two directions, identical payload shapes: clients publish a
//! [`TaskCommand`] for each local mutation, and the transport delivers a
//! [`TaskNotification`] for each mutation any participant made, including
//! the echo of the client's own commands. Neither direction carries
//! acknowledgements or sequence numbers; ordering and delivery are the
//! transport's responsibility.

use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskId};

/// Outbound event classes: a local mutation to broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskCommand {
    /// A task was created locally.
    AddTask(Task),
    /// An existing task was replaced locally (last-write-wins).
    UpdateTask(Task),
    /// A task was removed locally.
    DeleteTask(TaskId),
}

/// Inbound event classes: a mutation made by some participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskNotification {
    /// A task was created.
    TaskAdded(Task),
    /// An existing task was replaced.
    TaskUpdated(Task),
    /// A task was removed.
    TaskDeleted(TaskId),
}

impl From<TaskCommand> for TaskNotification {
    fn from(command: TaskCommand) -> Self {
        match command {
            TaskCommand::AddTask(task) => Self::TaskAdded(task),
            TaskCommand::UpdateTask(task) => Self::TaskUpdated(task),
            TaskCommand::DeleteTask(id) => Self::TaskDeleted(id),
        }
    }
}
