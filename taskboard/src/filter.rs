//! Search and status filtering over the task collection.
//!
//! The projection never mutates the collection: [`FilterState::project`]
//! is a pure function of the tasks, the committed search term, and the
//! status filter. Search input is debounced: each keystroke updates the
//! transient input immediately (for UI echo) and re-arms a trailing-edge
//! timer; only after the quiet period elapses does the term commit and
//! affect projection.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use taskboard_proto::task::{Task, TaskStatus};

/// Quiet period a search commit waits for after the last keystroke.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Status filter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    /// Match every status.
    #[default]
    All,
    /// Match only pending tasks.
    Pending,
    /// Match only in-progress tasks.
    InProgress,
    /// Match only completed tasks.
    Completed,
}

impl StatusFilter {
    /// Returns whether a task status passes this filter.
    #[must_use]
    pub const fn matches(self, status: TaskStatus) -> bool {
        match self {
            Self::All => true,
            Self::Pending => matches!(status, TaskStatus::Pending),
            Self::InProgress => matches!(status, TaskStatus::InProgress),
            Self::Completed => matches!(status, TaskStatus::Completed),
        }
    }
}

impl From<TaskStatus> for StatusFilter {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Pending => Self::Pending,
            TaskStatus::InProgress => Self::InProgress,
            TaskStatus::Completed => Self::Completed,
        }
    }
}

impl std::fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in-progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for StatusFilter {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse::<TaskStatus>()
            .map(Self::from)
            .map_err(|_| ParseFilterError(s.to_string()))
    }
}

/// Error returned when a filter string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status filter: {0}")]
pub struct ParseFilterError(String);

/// Committed filter state: the inputs the projection sees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    /// Case-insensitive substring to match against task names.
    pub search_term: String,
    /// Status filter, combined with the search term by logical AND.
    pub status: StatusFilter,
}

impl FilterState {
    /// Returns whether a single task passes this filter.
    ///
    /// An empty search term matches every name.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        self.status.matches(task.status)
            && task
                .name
                .to_lowercase()
                .contains(&self.search_term.to_lowercase())
    }

    /// Projects the ordered subsequence of `tasks` passing this filter.
    ///
    /// Pure: no hidden state, safe to call on every render.
    #[must_use]
    pub fn project(&self, tasks: &[Task]) -> Vec<Task> {
        let needle = self.search_term.to_lowercase();
        tasks
            .iter()
            .filter(|t| self.status.matches(t.status) && t.name.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }
}

/// A cancellable one-shot timer.
///
/// Its only two operations are [`schedule`](Self::schedule) (cancel any
/// pending arm, then re-arm) and [`cancel`](Self::cancel). The pending arm
/// is cancelled on drop, so a torn-down owner can never fire a late commit.
#[derive(Debug)]
pub struct DebounceTimer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl DebounceTimer {
    /// Creates a timer with the given quiet period.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Cancels any pending arm and schedules `action` to run after the
    /// quiet period.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&mut self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        }));
    }

    /// Cancels the pending arm, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Owns the filter inputs and the debounce timer for search commits.
///
/// `set_search_input` echoes the keystroke into the transient input
/// immediately and re-arms the timer; `set_status_filter` commits
/// immediately. Projection always reads the committed [`FilterState`].
#[derive(Debug)]
pub struct FilterController {
    input: String,
    committed: Arc<Mutex<FilterState>>,
    timer: DebounceTimer,
}

impl FilterController {
    /// Creates a controller with the given debounce quiet period.
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            input: String::new(),
            committed: Arc::new(Mutex::new(FilterState::default())),
            timer: DebounceTimer::new(debounce),
        }
    }

    /// Updates the transient search input and schedules a debounced commit
    /// of the search term with trailing-edge semantics: only the last
    /// keystroke inside the quiet window commits.
    ///
    /// Must be called from within a tokio runtime.
    pub fn set_search_input(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.input = text.clone();
        let committed = Arc::clone(&self.committed);
        self.timer.schedule(move || {
            committed.lock().search_term = text;
        });
    }

    /// Sets the status filter immediately, no debounce.
    pub fn set_status_filter(&mut self, status: StatusFilter) {
        self.committed.lock().status = status;
    }

    /// Returns the transient search input (what the search box displays).
    #[must_use]
    pub fn search_input(&self) -> &str {
        &self.input
    }

    /// Returns a copy of the committed filter state.
    #[must_use]
    pub fn committed(&self) -> FilterState {
        self.committed.lock().clone()
    }

    /// Projects `tasks` through the committed filter state.
    #[must_use]
    pub fn project(&self, tasks: &[Task]) -> Vec<Task> {
        self.committed.lock().project(tasks)
    }
}

impl Default for FilterController {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_DEBOUNCE)
    }
}
