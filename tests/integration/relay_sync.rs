//! End-to-end synchronization through a real relay server.
//!
//! Starts the axum relay in-process and connects full client sessions over
//! WebSocket transports: the wire codec, registration handshake, broadcast
//! fan-out, and echo path are all live.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use taskboard::notice::TaskNotice;
use taskboard::session::BoardSession;
use taskboard::sync::{ChannelState, SyncChannel};
use taskboard::transport::relay::RelayTransport;
use taskboard_proto::task::{TaskDraft, TaskStatus};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn draft(name: &str) -> TaskDraft {
    TaskDraft::new(name.to_string(), TaskStatus::Pending)
}

async fn start_relay() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = taskboard_relay::relay::start_server("127.0.0.1:0")
        .await
        .expect("failed to start relay server");
    (format!("ws://{addr}/ws"), handle)
}

async fn connect_session(
    url: &str,
    client_id: &str,
) -> (BoardSession<RelayTransport>, mpsc::Receiver<TaskNotice>) {
    let transport = RelayTransport::connect(url, client_id)
        .await
        .expect("relay connect");
    BoardSession::start(transport, 32)
}

/// Polls until `condition` holds, panicking after five seconds.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_on_one_client_appears_on_the_other() {
    let (url, _relay) = start_relay().await;
    let (alice, _an) = connect_session(&url, "alice").await;
    let (bob, _bn) = connect_session(&url, "bob").await;

    let task = alice
        .coordinator()
        .add_task(draft("Cross the wire"))
        .await
        .expect("add");

    wait_until(|| bob.tasks().len() == 1).await;
    assert_eq!(bob.tasks()[0].id, task.id);
    assert_eq!(bob.tasks()[0].name, "Cross the wire");
}

#[tokio::test]
async fn relay_echo_leaves_exactly_one_task() {
    let (url, _relay) = start_relay().await;
    let (alice, _an) = connect_session(&url, "alice").await;

    let task = alice
        .coordinator()
        .add_task(draft("Echoed"))
        .await
        .expect("add");

    // Give the relay time to echo the command back.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let tasks = alice.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, task.id);
}

#[tokio::test]
async fn update_and_delete_propagate_through_relay() {
    let (url, _relay) = start_relay().await;
    let (alice, _an) = connect_session(&url, "alice").await;
    let (bob, _bn) = connect_session(&url, "bob").await;

    let task = alice
        .coordinator()
        .add_task(draft("Lifecycle"))
        .await
        .expect("add");
    wait_until(|| bob.tasks().len() == 1).await;

    let mut updated = bob.tasks()[0].clone();
    updated.status = TaskStatus::Completed;
    bob.coordinator()
        .update_task(updated)
        .await
        .expect("update");
    wait_until(|| alice.tasks()[0].status == TaskStatus::Completed).await;

    alice.coordinator().delete_task(&task.id).await;
    wait_until(|| bob.tasks().is_empty()).await;
    assert!(alice.tasks().is_empty());
}

#[tokio::test]
async fn late_joiner_sees_subsequent_mutations_only() {
    let (url, _relay) = start_relay().await;
    let (alice, _an) = connect_session(&url, "alice").await;

    alice
        .coordinator()
        .add_task(draft("Before join"))
        .await
        .expect("add");
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The relay keeps no state: a late joiner starts from an empty board
    // and only sees mutations published after it connected.
    let (carol, _cn) = connect_session(&url, "carol").await;
    assert!(carol.tasks().is_empty());

    alice
        .coordinator()
        .add_task(draft("After join"))
        .await
        .expect("add");
    wait_until(|| carol.tasks().len() == 1).await;
    assert_eq!(carol.tasks()[0].name, "After join");
}

#[tokio::test]
async fn session_over_connecting_channel_reaches_connected() {
    let (url, _relay) = start_relay().await;

    let channel: SyncChannel<RelayTransport> = SyncChannel::disconnected();
    assert_eq!(channel.state(), ChannelState::Disconnected);
    channel
        .connect(RelayTransport::connect(&url, "late"))
        .await
        .expect("connect");
    assert_eq!(channel.state(), ChannelState::Connected);

    let (session, _notices) = BoardSession::with_channel(channel, 32);
    session
        .coordinator()
        .add_task(draft("Over staged channel"))
        .await
        .expect("add");
    wait_until(|| session.connection_state() == ChannelState::Connected).await;
    assert_eq!(session.tasks().len(), 1);
}

#[tokio::test]
async fn reattach_after_relay_restart_resumes_sync() {
    use std::sync::Arc;
    use taskboard_relay::relay::BoardState;

    let state = Arc::new(BoardState::new());
    let (addr, relay_handle) =
        taskboard_relay::relay::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
            .await
            .expect("start relay");
    let url = format!("ws://{addr}/ws");
    let (alice, _an) = connect_session(&url, "alice").await;
    let (bob, _bn) = connect_session(&url, "bob").await;

    alice
        .coordinator()
        .add_task(draft("Before outage"))
        .await
        .expect("add");
    wait_until(|| bob.tasks().len() == 1).await;

    // Shut the relay down; both sessions observe the disconnect.
    state.close_all_connections().await;
    relay_handle.abort();
    wait_until(|| alice.connection_state() == ChannelState::Disconnected).await;
    wait_until(|| bob.connection_state() == ChannelState::Disconnected).await;

    // Bring up a fresh relay and reattach both sessions. Handlers are
    // untouched — sync resumes without any re-subscription.
    let (new_url, _new_relay) = start_relay().await;
    alice.channel().reattach(
        RelayTransport::connect(&new_url, "alice")
            .await
            .expect("reconnect alice"),
    );
    bob.channel().reattach(
        RelayTransport::connect(&new_url, "bob")
            .await
            .expect("reconnect bob"),
    );

    alice
        .coordinator()
        .add_task(draft("After outage"))
        .await
        .expect("add");
    wait_until(|| bob.tasks().len() == 2).await;
}
