//! Relay server core: shared state, WebSocket handler, client registry, and
//! broadcast fan-out.
//!
//! The relay accepts WebSocket connections, registers each client by id,
//! and turns every [`RelayMessage::Command`] into a
//! [`RelayMessage::Event`] delivered to every registered client, the
//! sender included, which is how a client's own mutation echoes back to it.
//! The relay keeps no task state and performs no deduplication; it is a
//! pure fan-out hub.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{RwLock, mpsc};

use taskboard_proto::relay::{self, RelayMessage};
use taskboard_proto::sync::TaskNotification;

/// Default maximum number of simultaneously registered clients.
const DEFAULT_MAX_CLIENTS: usize = 256;

/// Shared relay server state holding the client registry.
pub struct BoardState {
    /// Maps client id to a channel sender for delivering WebSocket messages.
    clients: RwLock<HashMap<String, mpsc::UnboundedSender<Message>>>,
    /// Maximum number of simultaneously registered clients.
    max_clients: usize,
}

impl Default for BoardState {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardState {
    /// Creates a new board state with an empty client registry and the
    /// default client limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_clients(DEFAULT_MAX_CLIENTS)
    }

    /// Creates a new board state with a custom client limit.
    #[must_use]
    pub fn with_max_clients(max_clients: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            max_clients,
        }
    }

    /// Registers a client, storing the sender half of its message channel.
    ///
    /// If the client was already registered, the old sender is replaced and
    /// the old channel is effectively closed (the previous WebSocket writer
    /// task will detect the channel closure and shut down). Returns an
    /// error when the board is full.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the client limit is reached.
    pub async fn register(
        &self,
        client_id: &str,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Result<Option<mpsc::UnboundedSender<Message>>, String> {
        let mut clients = self.clients.write().await;
        if !clients.contains_key(client_id) && clients.len() >= self.max_clients {
            return Err(format!("board full ({} clients)", self.max_clients));
        }
        Ok(clients.insert(client_id.to_string(), sender))
    }

    /// Removes a client from the registry, returning the sender if it existed.
    pub async fn unregister(&self, client_id: &str) -> Option<mpsc::UnboundedSender<Message>> {
        let mut clients = self.clients.write().await;
        clients.remove(client_id)
    }

    /// Removes a client only if the registry still holds this connection's
    /// sender.
    ///
    /// A connection replaced by a duplicate register must not tear down its
    /// replacement's registration when it cleans up.
    pub async fn unregister_connection(
        &self,
        client_id: &str,
        sender: &mpsc::UnboundedSender<Message>,
    ) -> bool {
        let mut clients = self.clients.write().await;
        if clients
            .get(client_id)
            .is_some_and(|current| current.same_channel(sender))
        {
            clients.remove(client_id);
            true
        } else {
            false
        }
    }

    /// Number of currently registered clients.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Sends a WebSocket Close frame to all connected clients.
    ///
    /// Each client's writer task forwards the close frame, which the
    /// client-side reader detects as a disconnect. Useful for graceful
    /// shutdown and testing.
    pub async fn close_all_connections(&self) {
        let clients = self.clients.read().await;
        for (client_id, sender) in clients.iter() {
            tracing::info!(client_id = %client_id, "sending close frame to client");
            let _ = sender.send(Message::Close(None));
        }
    }

    /// Fans an event out to every registered client, the originator
    /// included.
    ///
    /// Clients whose channel is gone are pruned from the registry.
    pub async fn broadcast(&self, from: &str, event: TaskNotification) {
        let msg = RelayMessage::Event {
            from: from.to_string(),
            event,
        };
        let bytes = match relay::encode(&msg) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode event for broadcast");
                return;
            }
        };

        let mut stale = Vec::new();
        {
            let clients = self.clients.read().await;
            for (client_id, sender) in clients.iter() {
                if sender
                    .send(Message::Binary(bytes.clone().into()))
                    .is_err()
                {
                    stale.push(client_id.clone());
                }
            }
        }

        if !stale.is_empty() {
            let mut clients = self.clients.write().await;
            for client_id in stale {
                tracing::info!(client_id = %client_id, "pruning disconnected client");
                clients.remove(&client_id);
            }
        }
    }
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Wait for a `Register` message.
/// 2. Register the client and send `Registered` back.
/// 3. Enter the message loop, broadcasting each command.
/// 4. On disconnect, unregister the client.
pub async fn handle_socket(socket: WebSocket, state: Arc<BoardState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Wait for the Register message.
    let Some(client_id) = wait_for_register(&mut ws_receiver).await else {
        tracing::warn!("connection closed before registration");
        return;
    };

    tracing::info!(client_id = %client_id, "client registering");

    // Create a channel for sending messages to this client's WebSocket writer.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let conn_tx = tx.clone();

    match state.register(&client_id, tx).await {
        Ok(Some(_old_sender)) => {
            tracing::info!(client_id = %client_id, "replaced existing connection (duplicate register)");
            // Old sender is dropped, closing the old channel.
        }
        Ok(None) => {}
        Err(reason) => {
            tracing::warn!(client_id = %client_id, reason = %reason, "registration rejected");
            let err = RelayMessage::Error { reason };
            let _ = send_relay_msg(&mut ws_sender, &err).await;
            return;
        }
    }

    // Send Registered acknowledgment.
    let ack = RelayMessage::Registered {
        client_id: client_id.clone(),
    };
    if let Err(e) = send_relay_msg(&mut ws_sender, &ack).await {
        tracing::error!(client_id = %client_id, error = %e, "failed to send Registered ack");
        state.unregister_connection(&client_id, &conn_tx).await;
        return;
    }

    tracing::info!(client_id = %client_id, "client registered");

    // Spawn a writer task that forwards messages from the channel to the WebSocket.
    let writer_client_id = client_id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(client_id = %writer_client_id, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader loop: process incoming messages from this client.
    let reader_client_id = client_id.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_binary_message(&reader_client_id, &data, &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(client_id = %reader_client_id, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    // Clean up: unregister the client, unless a duplicate register already
    // replaced this connection.
    if state.unregister_connection(&client_id, &conn_tx).await {
        tracing::info!(client_id = %client_id, "client disconnected and unregistered");
    }
}

/// Waits for the first message on the WebSocket, expecting `Register`.
///
/// Returns the client id if a valid `Register` is received, or `None` if
/// the connection closes or an invalid message arrives.
async fn wait_for_register(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<String> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Binary(data) => match relay::decode(&data) {
                Ok(RelayMessage::Register { client_id }) => {
                    if client_id.is_empty() {
                        tracing::warn!("received Register with empty client_id");
                        return None;
                    }
                    return Some(client_id);
                }
                Ok(other) => {
                    tracing::warn!(msg = ?other, "expected Register, got different message");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to decode registration message");
                    return None;
                }
            },
            Message::Close(_) => return None,
            _ => {
                // Skip non-binary frames (ping/pong) during registration.
            }
        }
    }
    None
}

/// Handles a binary WebSocket message from a registered client.
///
/// Malformed frames are logged and skipped; one bad client frame never
/// affects the rest of the board.
async fn handle_binary_message(client_id: &str, data: &[u8], state: &Arc<BoardState>) {
    let msg = match relay::decode(data) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(client_id = %client_id, error = %e, "failed to decode message");
            return;
        }
    };

    match msg {
        RelayMessage::Command(command) => {
            tracing::debug!(client_id = %client_id, ?command, "broadcasting command");
            state.broadcast(client_id, command.into()).await;
        }
        RelayMessage::Register { client_id: new_id } => {
            tracing::warn!(
                client_id = %client_id,
                new_id = %new_id,
                "received duplicate Register from already-registered client"
            );
        }
        other => {
            tracing::warn!(
                client_id = %client_id,
                msg = ?other,
                "unexpected message type from client"
            );
        }
    }
}

/// Encodes and sends a relay message directly on a WebSocket sender.
async fn send_relay_msg(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &RelayMessage,
) -> Result<(), String> {
    let bytes = relay::encode(msg).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts the relay server on the given address and returns the bound
/// address and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(BoardState::new())).await
}

/// Starts the relay server with a pre-configured [`BoardState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<BoardState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<BoardState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
