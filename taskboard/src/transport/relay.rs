//! WebSocket relay transport.
//!
//! Implements the [`Transport`] trait over a WebSocket connection to the
//! relay server. Connecting performs a Register / Registered handshake and
//! spawns a background reader task that feeds decoded notifications into a
//! channel for [`next_event`](Transport::next_event).
//!
//! Reconnection policy lives outside this type: when the connection drops,
//! callers build a fresh `RelayTransport` and hand it to
//! [`SyncChannel::reattach`](crate::sync::SyncChannel::reattach).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use taskboard_proto::relay::{self, RelayMessage};
use taskboard_proto::sync::{TaskCommand, TaskNotification};

use super::{Transport, TransportError, TransportType};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Default timeout for connecting to the relay server.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for waiting for a `Registered` acknowledgment from the server.
const REGISTER_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the channel between the reader task and `next_event`.
const INCOMING_BUFFER: usize = 256;

/// WebSocket relay transport implementing the [`Transport`] trait.
pub struct RelayTransport {
    /// This client's identity on the board.
    client_id: String,
    /// The relay server URL (ws:// or wss://).
    relay_url: String,
    /// Write half of the WebSocket connection (shared for concurrent sends).
    ws_sender: Arc<Mutex<WsSender>>,
    /// Channel of notifications decoded by the background reader task.
    incoming: Mutex<mpsc::Receiver<TaskNotification>>,
    /// Whether the WebSocket connection to the relay is active.
    connected: Arc<AtomicBool>,
    /// Handle to the background reader task (kept alive for the transport's lifetime).
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl RelayTransport {
    /// Connects to a relay server and registers this client, using the
    /// default connect and register timeouts.
    ///
    /// # Errors
    ///
    /// See [`connect_with`](Self::connect_with).
    pub async fn connect(relay_url: &str, client_id: &str) -> Result<Self, TransportError> {
        Self::connect_with(relay_url, client_id, CONNECT_TIMEOUT, REGISTER_TIMEOUT).await
    }

    /// Connects to a relay server and registers this client.
    ///
    /// Steps:
    /// 1. Establishes a WebSocket connection to `relay_url`
    /// 2. Sends a `Register` message with the client id
    /// 3. Waits for a `Registered` acknowledgment
    /// 4. Spawns a background task to read incoming notifications
    ///
    /// # Errors
    ///
    /// - [`TransportError::Timeout`] if connection or registration times out.
    /// - [`TransportError::Unreachable`] if the relay cannot be reached.
    /// - [`TransportError::Io`] for registration rejection or protocol errors.
    pub async fn connect_with(
        relay_url: &str,
        client_id: &str,
        connect_timeout: Duration,
        register_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let (ws_stream, _response) =
            tokio::time::timeout(connect_timeout, connect_async(relay_url))
                .await
                .map_err(|_| {
                    tracing::warn!(url = relay_url, "relay WebSocket connect timed out");
                    TransportError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = relay_url, err = %e, "relay WebSocket connect failed");
                    map_ws_connect_error(relay_url, &e)
                })?;

        let (mut ws_sender, mut ws_reader) = ws_stream.split();

        let register = RelayMessage::Register {
            client_id: client_id.to_string(),
        };
        let register_bytes = relay::encode(&register)?;
        ws_sender
            .send(Message::Binary(register_bytes.into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "failed to send Register message");
                TransportError::Io(std::io::Error::other(format!(
                    "failed to send Register: {e}"
                )))
            })?;

        let ack = tokio::time::timeout(register_timeout, ws_reader.next())
            .await
            .map_err(|_| {
                tracing::warn!(url = relay_url, "relay registration acknowledgment timed out");
                TransportError::Timeout
            })?;

        match ack {
            Some(Ok(Message::Binary(data))) => match relay::decode(&data) {
                Ok(RelayMessage::Registered { client_id: id }) => {
                    tracing::info!(client_id = %id, url = relay_url, "registered with relay server");
                }
                Ok(RelayMessage::Error { reason }) => {
                    tracing::warn!(reason = %reason, "relay registration rejected");
                    return Err(TransportError::Io(std::io::Error::other(format!(
                        "relay registration rejected: {reason}"
                    ))));
                }
                Ok(other) => {
                    tracing::warn!(?other, "unexpected relay response during registration");
                    return Err(TransportError::Io(std::io::Error::other(
                        "unexpected response during registration",
                    )));
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed relay registration response");
                    return Err(TransportError::Io(std::io::Error::other(format!(
                        "malformed registration response: {e}"
                    ))));
                }
            },
            Some(Ok(Message::Close(_))) => {
                tracing::warn!("relay server closed connection during registration");
                return Err(TransportError::ConnectionClosed);
            }
            Some(Ok(_)) => {
                tracing::warn!("unexpected non-binary frame during registration");
                return Err(TransportError::Io(std::io::Error::other(
                    "unexpected non-binary frame during registration",
                )));
            }
            Some(Err(e)) => {
                tracing::warn!(err = %e, "WebSocket error during registration");
                return Err(TransportError::Io(std::io::Error::other(format!(
                    "WebSocket error during registration: {e}"
                ))));
            }
            None => {
                tracing::warn!("relay WebSocket stream ended during registration");
                return Err(TransportError::ConnectionClosed);
            }
        }

        let (tx, rx) = mpsc::channel(INCOMING_BUFFER);
        let connected = Arc::new(AtomicBool::new(true));
        let reader_connected = Arc::clone(&connected);

        let reader_handle = tokio::spawn(reader_loop(ws_reader, tx, reader_connected));

        Ok(Self {
            client_id: client_id.to_string(),
            relay_url: relay_url.to_string(),
            ws_sender: Arc::new(Mutex::new(ws_sender)),
            incoming: Mutex::new(rx),
            connected,
            _reader_handle: reader_handle,
        })
    }

    /// Returns the relay server URL this transport is connected to.
    #[must_use]
    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }

    /// Returns the client id this transport registered with.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl Transport for RelayTransport {
    /// Broadcasts a command via the relay server.
    ///
    /// # Errors
    ///
    /// - [`TransportError::ConnectionClosed`] if the relay connection is down.
    /// - [`TransportError::Codec`] / [`TransportError::Io`] for encoding or
    ///   WebSocket send failures.
    async fn publish(&self, command: TaskCommand) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(TransportError::ConnectionClosed);
        }

        let bytes = relay::encode(&RelayMessage::Command(command))?;

        let mut sender = self.ws_sender.lock().await;
        sender
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "relay publish failed");
                self.connected.store(false, Ordering::Relaxed);
                TransportError::ConnectionClosed
            })?;

        Ok(())
    }

    /// Receives the next notification broadcast by the relay.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] once the relay
    /// connection has been lost (the background reader task has exited).
    async fn next_event(&self) -> Result<TaskNotification, TransportError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Relay
    }
}

/// Background task that reads WebSocket frames and dispatches notifications.
///
/// Malformed frames are logged and skipped; a single bad frame never
/// disconnects the client or stops event processing. Sets `connected` to
/// `false` when the WebSocket closes or errors out.
async fn reader_loop(
    mut ws_reader: WsReader,
    tx: mpsc::Sender<TaskNotification>,
    connected: Arc<AtomicBool>,
) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match relay::decode(&data) {
                Ok(RelayMessage::Event { from, event }) => {
                    tracing::debug!(from = %from, "notification received");
                    if tx.send(event).await.is_err() {
                        // Receiver dropped — transport was dropped, exit.
                        break;
                    }
                }
                Ok(RelayMessage::Error { reason }) => {
                    tracing::warn!(reason = %reason, "relay server error");
                }
                Ok(other) => {
                    tracing::debug!(?other, "unexpected relay message type");
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed relay frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("relay WebSocket closed by server");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Text(_) | Message::Frame(_)) => {
                // Ignore control and non-binary frames.
            }
            Err(e) => {
                tracing::warn!(err = %e, "relay WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::info!("relay reader task exiting");
}

/// Maps a `tokio_tungstenite` connection error to a [`TransportError`].
fn map_ws_connect_error(
    relay_url: &str,
    err: &tokio_tungstenite::tungstenite::Error,
) -> TransportError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => {
            // DNS/network failures surface as io errors.
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused
                || io_err.kind() == std::io::ErrorKind::AddrNotAvailable
            {
                TransportError::Unreachable(relay_url.to_string())
            } else {
                TransportError::Io(std::io::Error::other(format!("connect failed: {io_err}")))
            }
        }
        WsError::Http(response) => TransportError::Io(std::io::Error::other(format!(
            "relay HTTP error: status {}",
            response.status()
        ))),
        other => TransportError::Io(std::io::Error::other(format!(
            "relay connection error: {other}"
        ))),
    }
}
