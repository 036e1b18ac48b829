//! Core task types shared by clients and the relay server.
//!
//! A [`Task`] is the unit of synchronization: an opaque time-ordered
//! identifier, a display name, a workflow status, and a creation timestamp.
//! Identifiers are UUID v7 so that ids synthesized concurrently on different
//! clients are unique and roughly time-ordered without coordination.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task name length in characters.
pub const MAX_TASK_NAME_LENGTH: usize = 256;

/// Unique identifier for a task, based on UUID v7 for time-ordering.
///
/// Stable across edits: updates and deletes address a task by this id,
/// never by position or name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `TaskId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Workflow status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Task has not been started.
    Pending,
    /// Task is actively being worked on.
    InProgress,
    /// Task has been completed.
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in-progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in-progress" | "in_progress" | "inprogress" => Ok(Self::InProgress),
            "completed" | "done" => Ok(Self::Completed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Error returned when a status string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status: {0}")]
pub struct ParseStatusError(String);

/// Errors produced when validating a task name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Task name cannot be empty.
    #[error("task name cannot be empty")]
    NameEmpty,
    /// Task name exceeds the maximum length.
    #[error("task name too long (max {MAX_TASK_NAME_LENGTH} characters)")]
    NameTooLong,
}

/// A task as it appears in the canonical collection and on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier (UUID v7, time-ordered), stable across edits.
    pub id: TaskId,
    /// Display name. Non-empty, at most [`MAX_TASK_NAME_LENGTH`] characters.
    pub name: String,
    /// Current workflow status.
    pub status: TaskStatus,
    /// When this task was originally created.
    pub created_at: Timestamp,
}

impl Task {
    /// Validates the task name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NameEmpty`] if the name is empty, or
    /// [`ValidationError::NameTooLong`] if it exceeds
    /// [`MAX_TASK_NAME_LENGTH`] characters.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)
    }
}

/// A task as submitted by the UI, before an id has been assigned.
///
/// Leaving `id` as `None` lets the coordinator synthesize one; supplying
/// an id lets callers replay a known task (e.g. in tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    /// Optional pre-assigned identifier.
    pub id: Option<TaskId>,
    /// Display name for the new task.
    pub name: String,
    /// Initial workflow status.
    pub status: TaskStatus,
}

impl TaskDraft {
    /// Creates a draft with no pre-assigned id.
    #[must_use]
    pub const fn new(name: String, status: TaskStatus) -> Self {
        Self {
            id: None,
            name,
            status,
        }
    }

    /// Sets a pre-assigned id on the draft.
    #[must_use]
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = Some(id);
        self
    }

    /// Converts the draft into a [`Task`], validating the name and
    /// synthesizing an id and creation timestamp as needed.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the name is empty or too long.
    pub fn into_task(self) -> Result<Task, ValidationError> {
        validate_name(&self.name)?;
        Ok(Task {
            id: self.id.unwrap_or_default(),
            name: self.name,
            status: self.status,
            created_at: Timestamp::now(),
        })
    }
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::NameEmpty);
    }
    if name.chars().count() > MAX_TASK_NAME_LENGTH {
        return Err(ValidationError::NameTooLong);
    }
    Ok(())
}
