//! Task board relay server: broadcast hub for board clients.
//!
//! An axum WebSocket server that fans task mutations out to every
//! connected client. The relay keeps no task state; clients hold the
//! canonical collection and reconcile via idempotent application.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9100
//! cargo run --bin taskboard-relay
//!
//! # Run on custom address
//! cargo run --bin taskboard-relay -- --bind 127.0.0.1:8080
//! ```

use std::sync::Arc;

use clap::Parser;

use taskboard_relay::config::{RelayCliArgs, RelayConfig};
use taskboard_relay::relay::{self, BoardState};

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting taskboard relay server");

    let state = Arc::new(BoardState::with_max_clients(config.max_clients));

    match relay::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}
