//! Task board relay server library.
//!
//! Exposes the broadcast relay for use in tests and embedding. The relay
//! accepts WebSocket connections, registers clients by id, and fans each
//! received command back out to every registered client as a notification.

pub mod config;
pub mod relay;
