//! Integration tests for optimistic sync over the loopback hub.
//!
//! Exercises the full client stack (coordinator, repository, sync channel,
//! session handlers) with multiple sessions on one in-process hub:
//! convergence, echo idempotence, out-of-order tolerance, and notice
//! deduplication.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use taskboard::notice::{Origin, TaskNotice};
use taskboard::session::BoardSession;
use taskboard::transport::Transport;
use taskboard::transport::loopback::{LoopbackHub, LoopbackTransport};
use taskboard_proto::sync::TaskCommand;
use taskboard_proto::task::{TaskDraft, TaskStatus};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn draft(name: &str) -> TaskDraft {
    TaskDraft::new(name.to_string(), TaskStatus::Pending)
}

fn start_session(
    hub: &LoopbackHub,
    name: &str,
) -> (BoardSession<LoopbackTransport>, mpsc::Receiver<TaskNotice>) {
    BoardSession::start(hub.endpoint(name), 32)
}

/// Polls until `condition` holds, panicking after two seconds.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Sleeps long enough for in-flight hub deliveries to settle.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ---------------------------------------------------------------------------
// End-to-end echo scenario
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_with_echo_leaves_exactly_one_task() {
    let hub = LoopbackHub::new();
    let (session, _notices) = start_session(&hub, "a");

    let task = session
        .coordinator()
        .add_task(draft("X"))
        .await
        .expect("add");

    // The mutation is locally visible synchronously, before the echo.
    assert_eq!(session.tasks().len(), 1);

    // After the transport echoes the add back, still exactly one task.
    settle().await;
    let tasks = session.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, task.id);
    assert_eq!(tasks[0].name, "X");
}

#[tokio::test]
async fn every_mutation_kind_survives_its_own_echo() {
    let hub = LoopbackHub::new();
    let (session, _notices) = start_session(&hub, "a");

    let mut task = session
        .coordinator()
        .add_task(draft("lifecycle"))
        .await
        .expect("add");

    task.status = TaskStatus::InProgress;
    session
        .coordinator()
        .update_task(task.clone())
        .await
        .expect("update");
    settle().await;
    assert_eq!(session.tasks().len(), 1);
    assert_eq!(session.tasks()[0].status, TaskStatus::InProgress);

    session.coordinator().delete_task(&task.id).await;
    settle().await;
    assert!(session.tasks().is_empty());
}

// ---------------------------------------------------------------------------
// Multi-session convergence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn three_sessions_converge_on_add_update_delete() {
    let hub = LoopbackHub::new();
    let (a, _an) = start_session(&hub, "a");
    let (b, _bn) = start_session(&hub, "b");
    let (c, _cn) = start_session(&hub, "c");

    let task = a.coordinator().add_task(draft("Shared")).await.expect("add");
    wait_until(|| b.tasks().len() == 1 && c.tasks().len() == 1).await;

    let mut updated = task.clone();
    updated.status = TaskStatus::Completed;
    b.coordinator().update_task(updated).await.expect("update");
    wait_until(|| {
        a.tasks()[0].status == TaskStatus::Completed
            && c.tasks()[0].status == TaskStatus::Completed
    })
    .await;

    c.coordinator().delete_task(&task.id).await;
    wait_until(|| a.tasks().is_empty() && b.tasks().is_empty() && c.tasks().is_empty()).await;
}

#[tokio::test]
async fn concurrent_adds_from_two_sessions_both_survive() {
    let hub = LoopbackHub::new();
    let (a, _an) = start_session(&hub, "a");
    let (b, _bn) = start_session(&hub, "b");

    let task_a = a.coordinator().add_task(draft("From A")).await.expect("add");
    let task_b = b.coordinator().add_task(draft("From B")).await.expect("add");

    wait_until(|| a.tasks().len() == 2 && b.tasks().len() == 2).await;

    let ids_a: Vec<_> = a.tasks().iter().map(|t| t.id.clone()).collect();
    let ids_b: Vec<_> = b.tasks().iter().map(|t| t.id.clone()).collect();
    assert!(ids_a.contains(&task_a.id) && ids_a.contains(&task_b.id));
    assert!(ids_b.contains(&task_a.id) && ids_b.contains(&task_b.id));
}

#[tokio::test]
async fn concurrent_updates_resolve_last_applied_wins() {
    let hub = LoopbackHub::new();
    let (a, _an) = start_session(&hub, "a");
    let (b, _bn) = start_session(&hub, "b");

    let task = a.coordinator().add_task(draft("Contested")).await.expect("add");
    wait_until(|| b.tasks().len() == 1).await;

    // Both sessions update the same task; the hub delivers in publish
    // order, so both ends converge on whichever update applied last.
    let mut from_a = task.clone();
    from_a.status = TaskStatus::InProgress;
    a.coordinator().update_task(from_a).await.expect("update a");

    let mut from_b = task.clone();
    from_b.status = TaskStatus::Completed;
    b.coordinator().update_task(from_b).await.expect("update b");

    settle().await;
    assert_eq!(a.tasks()[0].status, b.tasks()[0].status);
}

// ---------------------------------------------------------------------------
// Out-of-order and duplicate delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_arriving_before_add_is_tolerated() {
    let hub = LoopbackHub::new();
    let (session, _notices) = start_session(&hub, "a");
    let publisher = hub.endpoint("raw");

    let task = draft("Raced").into_task().expect("draft");

    // Delete for a task the session has never seen: silent no-op.
    publisher
        .publish(TaskCommand::DeleteTask(task.id.clone()))
        .await
        .expect("publish");
    settle().await;
    assert!(session.tasks().is_empty());

    // The add then lands normally.
    publisher
        .publish(TaskCommand::AddTask(task.clone()))
        .await
        .expect("publish");
    wait_until(|| session.tasks().len() == 1).await;
}

#[tokio::test]
async fn duplicate_add_notifications_apply_once() {
    let hub = LoopbackHub::new();
    let (session, _notices) = start_session(&hub, "a");
    let publisher = hub.endpoint("raw");

    let task = draft("Dup").into_task().expect("draft");
    for _ in 0..3 {
        publisher
            .publish(TaskCommand::AddTask(task.clone()))
            .await
            .expect("publish");
    }

    wait_until(|| !session.tasks().is_empty()).await;
    settle().await;
    assert_eq!(session.tasks().len(), 1);
}

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remote_mutations_produce_remote_notices_once() {
    let hub = LoopbackHub::new();
    let (a, _an) = start_session(&hub, "a");
    let (b, mut b_notices) = start_session(&hub, "b");

    a.coordinator().add_task(draft("Watched")).await.expect("add");
    wait_until(|| b.tasks().len() == 1).await;
    settle().await;

    let notice = b_notices.try_recv().expect("one notice");
    assert_eq!(notice.origin(), Origin::Remote);
    assert!(matches!(notice, TaskNotice::Added { .. }));
    assert!(b_notices.try_recv().is_err(), "no duplicate notice");
}

#[tokio::test]
async fn echo_produces_no_remote_notice_for_originator() {
    let hub = LoopbackHub::new();
    let (a, mut a_notices) = start_session(&hub, "a");

    a.coordinator().add_task(draft("Mine")).await.expect("add");
    settle().await;

    let first = a_notices.try_recv().expect("local notice");
    assert_eq!(first.origin(), Origin::Local);
    assert!(a_notices.try_recv().is_err(), "echo stayed silent");
}
