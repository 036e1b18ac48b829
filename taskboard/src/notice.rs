//! User-facing change notices.
//!
//! The repository itself is side-effect-free; notices are the separate
//! observability layer the UI consumes (toasts, status lines). The
//! coordinator emits a notice for each local mutation and the session's
//! inbound handlers emit one for each remote mutation that actually
//! applied; the echo of a local mutation never produces a second notice
//! because the repository reports it as a no-op.

use taskboard_proto::task::{Task, TaskId};

/// Where a mutation originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Applied by this session's coordinator.
    Local,
    /// Applied from a transport notification.
    Remote,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// A change the UI may want to surface to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskNotice {
    /// A task was added to the board.
    Added {
        /// The task that was added.
        task: Task,
        /// Where the mutation originated.
        origin: Origin,
    },
    /// A task was updated.
    Updated {
        /// The task after the update.
        task: Task,
        /// Where the mutation originated.
        origin: Origin,
    },
    /// A task was deleted.
    Deleted {
        /// Id of the deleted task.
        id: TaskId,
        /// Where the mutation originated.
        origin: Origin,
    },
}

impl TaskNotice {
    /// Returns where the mutation behind this notice originated.
    #[must_use]
    pub const fn origin(&self) -> Origin {
        match self {
            Self::Added { origin, .. }
            | Self::Updated { origin, .. }
            | Self::Deleted { origin, .. } => *origin,
        }
    }
}
