//! Property tests for the task repository invariants.
//!
//! Checks the structural guarantees the sync layer leans on: id uniqueness
//! under arbitrary operation interleavings, idempotent insert, no-op safety
//! for stale references, and position preservation on replace.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;

use taskboard::store::TaskRepository;
use taskboard_proto::task::{Task, TaskDraft, TaskId, TaskStatus};

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// A small pool of task ids so generated operations frequently collide.
fn id_pool() -> Vec<TaskId> {
    (0..8).map(|_| TaskId::new()).collect()
}

fn status_strategy() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Pending),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Completed),
    ]
}

/// One repository operation, with ids drawn from the shared pool by index.
#[derive(Debug, Clone)]
enum Op {
    Insert { id_index: usize, name: String, status: TaskStatus },
    Replace { id_index: usize, name: String, status: TaskStatus },
    Remove { id_index: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let name = "[a-z]{1,12}";
    prop_oneof![
        (0..8usize, name, status_strategy())
            .prop_map(|(id_index, name, status)| Op::Insert { id_index, name, status }),
        (0..8usize, name, status_strategy())
            .prop_map(|(id_index, name, status)| Op::Replace { id_index, name, status }),
        (0..8usize).prop_map(|id_index| Op::Remove { id_index }),
    ]
}

fn make_task(id: &TaskId, name: &str, status: TaskStatus) -> Task {
    TaskDraft::new(name.to_string(), status)
        .with_id(id.clone())
        .into_task()
        .unwrap()
}

fn apply(repo: &mut TaskRepository, ids: &[TaskId], op: &Op) {
    match op {
        Op::Insert { id_index, name, status } => {
            repo.insert(make_task(&ids[*id_index], name, *status));
        }
        Op::Replace { id_index, name, status } => {
            repo.replace(make_task(&ids[*id_index], name, *status));
        }
        Op::Remove { id_index } => {
            repo.remove(&ids[*id_index]);
        }
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    /// Ids stay unique no matter how operations interleave.
    #[test]
    fn ids_stay_unique_under_arbitrary_ops(ops in prop::collection::vec(op_strategy(), 0..64)) {
        let ids = id_pool();
        let mut repo = TaskRepository::new();
        for op in &ops {
            apply(&mut repo, &ids, op);

            let snapshot = repo.snapshot();
            let mut seen = std::collections::HashSet::new();
            for task in &snapshot {
                prop_assert!(seen.insert(task.id.clone()), "duplicate id in collection");
            }
        }
    }

    /// Inserting the same task twice yields exactly one entry with that id.
    #[test]
    fn insert_is_idempotent(name in "[a-z]{1,12}", status in status_strategy()) {
        let id = TaskId::new();
        let task = make_task(&id, &name, status);
        let mut repo = TaskRepository::new();
        repo.insert(task.clone());
        repo.insert(task);
        prop_assert_eq!(repo.len(), 1);
        prop_assert_eq!(repo.all().iter().filter(|t| t.id == id).count(), 1);
    }

    /// Replace and remove on an absent id leave the collection unchanged.
    #[test]
    fn stale_references_are_noops(
        ops in prop::collection::vec(op_strategy(), 0..32),
        name in "[a-z]{1,12}",
    ) {
        let ids = id_pool();
        let mut repo = TaskRepository::new();
        for op in &ops {
            apply(&mut repo, &ids, op);
        }

        let before = repo.snapshot();
        let absent = TaskId::new();
        prop_assert!(!repo.replace(make_task(&absent, &name, TaskStatus::Pending)));
        prop_assert!(!repo.remove(&absent));
        prop_assert_eq!(repo.snapshot(), before);
    }

    /// Replacing a task never changes its position in the collection.
    #[test]
    fn replace_preserves_position(
        count in 1..8usize,
        target in 0..8usize,
        name in "[a-z]{1,12}",
        status in status_strategy(),
    ) {
        let target = target % count;
        let mut repo = TaskRepository::new();
        let mut inserted = Vec::new();
        for i in 0..count {
            let id = TaskId::new();
            let task = make_task(&id, &format!("task{i}"), TaskStatus::Pending);
            repo.insert(task.clone());
            inserted.push(task);
        }

        let replacement = make_task(&inserted[target].id, &name, status);
        prop_assert!(repo.replace(replacement.clone()));

        let snapshot = repo.snapshot();
        prop_assert_eq!(snapshot.len(), count);
        prop_assert_eq!(&snapshot[target], &replacement);
        for (i, task) in snapshot.iter().enumerate() {
            if i != target {
                prop_assert_eq!(task, &inserted[i]);
            }
        }
    }
}
