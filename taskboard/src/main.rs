//! Task board CLI: a thin line-oriented front end over the board session.
//!
//! Connects to a relay server for live collaboration, or runs offline over
//! an in-process loopback hub when no relay is configured. Configuration
//! via CLI flags, environment variables, or config file
//! (`~/.config/taskboard/config.toml`).
//!
//! ```bash
//! # Offline mode
//! cargo run --bin taskboard
//!
//! # Connect to a relay
//! cargo run --bin taskboard -- --relay-url ws://127.0.0.1:9100/ws \
//!     --client-id alice
//! ```

use std::io::Write;
use std::path::Path;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use taskboard::config::{CliArgs, ClientConfig};
use taskboard::filter::FilterController;
use taskboard::notice::{Origin, TaskNotice};
use taskboard::session::BoardSession;
use taskboard::sync::SyncChannel;
use taskboard::transport::Transport;
use taskboard::transport::loopback::LoopbackHub;
use taskboard::transport::relay::RelayTransport;
use taskboard_proto::task::{Task, TaskDraft, TaskId, TaskStatus};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("taskboard starting");

    match config.relay_url.clone() {
        Some(relay_url) => {
            let client_id = config
                .client_id
                .clone()
                .unwrap_or_else(|| format!("viewer-{}", std::process::id()));
            let channel: SyncChannel<RelayTransport> = SyncChannel::disconnected();
            println!("connecting to {relay_url} as {client_id}...");
            let connected = channel
                .connect(RelayTransport::connect_with(
                    &relay_url,
                    &client_id,
                    config.connect_timeout,
                    config.register_timeout,
                ))
                .await;
            match connected {
                Ok(()) => {
                    println!("connected via relay");
                    let (session, notices) =
                        BoardSession::with_channel(channel, config.notice_buffer);
                    run_repl(session, notices, &config).await;
                }
                Err(e) => {
                    eprintln!("could not connect to relay: {e}");
                    println!("running in offline mode");
                    run_offline(&config).await;
                }
            }
        }
        None => {
            println!("no relay configured, running in offline mode");
            run_offline(&config).await;
        }
    }

    tracing::info!("taskboard exiting");
    Ok(())
}

/// Runs the REPL over a single-endpoint loopback hub.
async fn run_offline(config: &ClientConfig) {
    let hub = LoopbackHub::new();
    let (session, notices) = BoardSession::start(hub.endpoint("local"), config.notice_buffer);
    run_repl(session, notices, config).await;
}

/// Initialize file-based logging.
///
/// Logs go to a file rather than stdout so they don't interleave with the
/// REPL. Returns a [`WorkerGuard`] that must be held until shutdown to
/// ensure all buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskboard.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Spawns a thread reading stdin lines into a channel the async REPL can
/// select on alongside incoming notices.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.blocking_send(line.trim_end().to_string()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

/// The interactive loop: user commands on one channel, notices on the other.
async fn run_repl<T: Transport + 'static>(
    session: BoardSession<T>,
    mut notices: mpsc::Receiver<TaskNotice>,
    config: &ClientConfig,
) {
    let mut filter = FilterController::new(config.search_debounce);
    let mut lines = spawn_stdin_reader();

    println!("type 'help' for commands");
    prompt();

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                if !handle_command(&session, &mut filter, &line).await {
                    break;
                }
                prompt();
            }
            notice = notices.recv() => {
                let Some(notice) = notice else { break };
                println!();
                print_notice(&notice);
                prompt();
            }
        }
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Handles one command line. Returns `false` when the REPL should exit.
async fn handle_command<T: Transport + 'static>(
    session: &BoardSession<T>,
    filter: &mut FilterController,
    line: &str,
) -> bool {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return true;
    };
    let rest: Vec<&str> = parts.collect();

    match command {
        "add" => {
            if rest.is_empty() {
                println!("usage: add <name>");
                return true;
            }
            let draft = TaskDraft::new(rest.join(" "), TaskStatus::Pending);
            match session.coordinator().add_task(draft).await {
                Ok(task) => println!("added {}", short_id(&task.id)),
                Err(e) => println!("error: {e}"),
            }
        }
        "status" => match (rest.first(), rest.get(1)) {
            (Some(index), Some(status)) => {
                let Ok(status) = status.parse::<TaskStatus>() else {
                    println!("unknown status (pending, in-progress, completed)");
                    return true;
                };
                match lookup(session, index) {
                    Some(mut task) => {
                        task.status = status;
                        match session.coordinator().update_task(task).await {
                            Ok(true) => {}
                            Ok(false) => println!("task vanished before the update applied"),
                            Err(e) => println!("error: {e}"),
                        }
                    }
                    None => println!("no such task"),
                }
            }
            _ => println!("usage: status <n> <pending|in-progress|completed>"),
        },
        "rename" => match rest.split_first() {
            Some((index, name)) if !name.is_empty() => match lookup(session, index) {
                Some(mut task) => {
                    task.name = name.join(" ");
                    match session.coordinator().update_task(task).await {
                        Ok(true) => {}
                        Ok(false) => println!("task vanished before the update applied"),
                        Err(e) => println!("error: {e}"),
                    }
                }
                None => println!("no such task"),
            },
            _ => println!("usage: rename <n> <new name>"),
        },
        "rm" => match rest.first() {
            Some(index) => match lookup(session, index) {
                Some(task) => {
                    if !session.coordinator().delete_task(&task.id).await {
                        println!("task already gone");
                    }
                }
                None => println!("no such task"),
            },
            None => println!("usage: rm <n>"),
        },
        "ls" => print_board(session, filter),
        "search" => filter.set_search_input(rest.join(" ")),
        "filter" => match rest.first().map(|s| s.parse()) {
            Some(Ok(status_filter)) => filter.set_status_filter(status_filter),
            _ => println!("usage: filter <all|pending|in-progress|completed>"),
        },
        "state" => println!(
            "connection: {} · {} tasks",
            session.connection_state(),
            session.tasks().len()
        ),
        "help" => print_help(),
        "quit" | "exit" => return false,
        other => println!("unknown command: {other} (try 'help')"),
    }
    true
}

/// Resolves a 1-based index from the unfiltered snapshot.
fn lookup<T: Transport + 'static>(session: &BoardSession<T>, index: &str) -> Option<Task> {
    let index: usize = index.parse().ok()?;
    session.tasks().get(index.checked_sub(1)?).cloned()
}

/// Prints the tasks passing the committed filter, keeping their positions
/// in the unfiltered collection so indices stay valid for other commands.
fn print_board<T: Transport + 'static>(session: &BoardSession<T>, filter: &FilterController) {
    let state = filter.committed();
    let tasks = session.tasks();
    let mut shown = 0usize;
    for (position, task) in tasks.iter().enumerate() {
        if state.matches(task) {
            println!(
                "{:>3}  {}  {:<12} {}  {}",
                position + 1,
                short_id(&task.id),
                format!("[{}]", task.status),
                format_created_at(task),
                task.name,
            );
            shown += 1;
        }
    }
    if shown == 0 {
        println!("no tasks found");
    } else if shown < tasks.len() {
        println!("({shown} of {} tasks shown)", tasks.len());
    }
}

fn print_notice(notice: &TaskNotice) {
    let origin = match notice.origin() {
        Origin::Local => "",
        Origin::Remote => " (remote)",
    };
    match notice {
        TaskNotice::Added { task, .. } => println!("+ task added: {}{origin}", task.name),
        TaskNotice::Updated { task, .. } => {
            println!("~ task updated: {} [{}]{origin}", task.name, task.status);
        }
        TaskNotice::Deleted { id, .. } => {
            println!("- task deleted: {}{origin}", short_id(id));
        }
    }
}

fn print_help() {
    println!("commands:");
    println!("  add <name>                          create a task");
    println!("  status <n> <pending|in-progress|completed>");
    println!("  rename <n> <new name>               rename a task");
    println!("  rm <n>                              delete a task");
    println!("  ls                                  list tasks (filtered)");
    println!("  search <text>                       debounced name search");
    println!("  filter <all|pending|in-progress|completed>");
    println!("  state                               connection state");
    println!("  quit");
}

/// First eight characters of a task id, for compact display.
fn short_id(id: &TaskId) -> String {
    id.to_string()[..8].to_string()
}

/// Formats a task's creation time as local "HH:MM".
fn format_created_at(task: &Task) -> String {
    use chrono::{Local, TimeZone};
    let ms = task.created_at.as_millis();
    let secs = i64::try_from(ms / 1000).unwrap_or(0);
    let nsecs = u32::try_from((ms % 1000) * 1_000_000).unwrap_or(0);
    match Local.timestamp_opt(secs, nsecs) {
        chrono::LocalResult::Single(dt) => dt.format("%H:%M").to_string(),
        _ => "??:??".to_string(),
    }
}
