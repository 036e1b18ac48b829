//! Transport layer abstraction for the task board.
//!
//! Defines the [`Transport`] trait all transports satisfy. Concrete
//! implementations:
//! - [`loopback::LoopbackTransport`] — in-process hub endpoint for tests
//!   and offline mode
//! - [`relay::RelayTransport`] — WebSocket connection to the relay server
//!
//! A transport is a broadcast bus, not a point-to-point link: publishing a
//! command delivers the corresponding notification to every participant,
//! including the publisher. Delivery is at-most-once with best-effort
//! ordering; nothing above this layer compensates with acks or sequence
//! numbers.

pub mod loopback;
pub mod relay;

use std::fmt;

use taskboard_proto::codec::CodecError;
use taskboard_proto::sync::{TaskCommand, TaskNotification};

/// Describes which kind of transport is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// Relay server via WebSocket.
    Relay,
    /// In-process loopback hub.
    Loopback,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relay => write!(f, "Relay"),
            Self::Loopback => write!(f, "Loopback"),
        }
    }
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No transport is currently attached or connected.
    #[error("transport not connected")]
    NotConnected,

    /// The connection has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("transport operation timed out")]
    Timeout,

    /// The relay server is not reachable.
    #[error("relay {0} is unreachable")]
    Unreachable(String),

    /// An underlying I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A wire message could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Async transport trait for broadcasting task mutations.
pub trait Transport: Send + Sync {
    /// Broadcasts a command to every participant.
    ///
    /// Returns `Ok(())` when the command has been handed off to the
    /// underlying transport. This does NOT guarantee delivery; there is
    /// no application-level acknowledgement anywhere in the protocol.
    fn publish(
        &self,
        command: TaskCommand,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next notification from the board.
    ///
    /// Blocks asynchronously until a notification arrives. Echoes of this
    /// endpoint's own commands are delivered like any other notification.
    fn next_event(
        &self,
    ) -> impl std::future::Future<Output = Result<TaskNotification, TransportError>> + Send;

    /// Returns whether this transport currently has a live connection.
    fn is_connected(&self) -> bool;

    /// Returns the type of this transport.
    fn transport_type(&self) -> TransportType;
}
