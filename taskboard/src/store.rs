//! Canonical task collection.
//!
//! [`TaskRepository`] owns the ordered task list and exposes the three pure
//! mutation operations everything else is built on. Every operation is a
//! silent no-op when its precondition does not hold (inserting an id that
//! already exists, replacing or removing one that does not). That is what
//! makes applying a transport echo of a local mutation harmless, and what
//! lets out-of-order delivery of update/delete degrade gracefully instead
//! of erroring.
//!
//! The repository has no side effects: it never logs, never notifies, never
//! touches the transport. Observers key off the `bool` each mutation returns
//! (did it actually apply?) so that notification deduplication stays
//! structural rather than relying on the transport.

use taskboard_proto::task::{Task, TaskId};

/// Ordered, id-unique collection of tasks.
///
/// Insertion order is preserved: `replace` swaps a task in place and
/// `remove` collapses the position. Callers never hold a second copy of
/// the collection — reads go through [`all`](Self::all) or
/// [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct TaskRepository {
    tasks: Vec<Task>,
}

impl TaskRepository {
    /// Creates an empty repository.
    #[must_use]
    pub const fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Appends a task to the collection.
    ///
    /// Returns `false` without modifying anything if a task with the same
    /// id already exists.
    pub fn insert(&mut self, task: Task) -> bool {
        if self.contains(&task.id) {
            return false;
        }
        self.tasks.push(task);
        true
    }

    /// Replaces the task with a matching id, in place.
    ///
    /// Returns `false` if no task has that id. The replaced task keeps its
    /// position in the collection.
    pub fn replace(&mut self, task: Task) -> bool {
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => {
                *slot = task;
                true
            }
            None => false,
        }
    }

    /// Removes the first task with a matching id.
    ///
    /// Returns `false` if no task has that id.
    pub fn remove(&mut self, id: &TaskId) -> bool {
        match self.tasks.iter().position(|t| t.id == *id) {
            Some(index) => {
                self.tasks.remove(index);
                true
            }
            None => false,
        }
    }

    /// Returns the current ordered collection as a read-only slice.
    #[must_use]
    pub fn all(&self) -> &[Task] {
        &self.tasks
    }

    /// Returns a cloned snapshot of the current ordered collection.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.clone()
    }

    /// Returns the task with the given id, if present.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == *id)
    }

    /// Returns whether a task with the given id exists.
    #[must_use]
    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.iter().any(|t| t.id == *id)
    }

    /// Returns the number of tasks in the collection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
