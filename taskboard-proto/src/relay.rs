//! Relay wire protocol for the task board broadcast hub.
//!
//! Defines the [`RelayMessage`] enum exchanged over WebSocket binary frames
//! between board clients and the relay server. Clients register with a
//! client id, then send [`RelayMessage::Command`] for each local mutation;
//! the server fans each command back out as a [`RelayMessage::Event`] to
//! every registered client, including the sender.

use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError};
use crate::sync::{TaskCommand, TaskNotification};

/// Messages exchanged between board clients and the relay server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayMessage {
    /// Client registers its id with the relay server.
    ///
    /// Must be the first message sent after the WebSocket connection.
    /// The server responds with [`RelayMessage::Registered`] on success.
    Register {
        /// The id of the registering client.
        client_id: String,
    },

    /// Server acknowledges successful registration.
    Registered {
        /// The client id that was registered (echoed back for confirmation).
        client_id: String,
    },

    /// A local mutation the server should broadcast to the board.
    Command(TaskCommand),

    /// A mutation broadcast to every registered client.
    Event {
        /// Registered id of the originating client (server-attested).
        from: String,
        /// The mutation itself.
        event: TaskNotification,
    },

    /// Server reports an error condition.
    Error {
        /// Human-readable error description.
        reason: String,
    },
}

/// Encodes a [`RelayMessage`] into bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError`] if serialization fails.
pub fn encode(msg: &RelayMessage) -> Result<Vec<u8>, CodecError> {
    codec::encode(msg)
}

/// Decodes a [`RelayMessage`] from bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError`] if deserialization fails.
pub fn decode(bytes: &[u8]) -> Result<RelayMessage, CodecError> {
    codec::decode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskDraft, TaskStatus};

    #[test]
    fn round_trip_register() {
        let msg = RelayMessage::Register {
            client_id: "viewer-1".to_string(),
        };
        let bytes = encode(&msg).unwrap();
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn round_trip_event() {
        let task = TaskDraft::new("Ship release".to_string(), TaskStatus::InProgress)
            .into_task()
            .unwrap();
        let msg = RelayMessage::Event {
            from: "viewer-2".to_string(),
            event: TaskNotification::TaskAdded(task),
        };
        let bytes = encode(&msg).unwrap();
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn round_trip_error() {
        let msg = RelayMessage::Error {
            reason: "board full".to_string(),
        };
        let bytes = encode(&msg).unwrap();
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn decode_corrupted_bytes_fails() {
        assert!(decode(&[0xFF, 0xFE, 0xFD, 0xFC]).is_err());
    }

    #[test]
    fn decode_empty_bytes_fails() {
        assert!(decode(&[]).is_err());
    }
}
