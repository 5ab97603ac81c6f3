//! Error types for the reservation crate.
//!
//! Conflicts and unauthorized releases are expected protocol outcomes and are
//! not represented here; only failures a caller must react to are.

use thiserror::Error;

/// Invalid slot identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("slot {0} is out of range (expected 0..8)")]
    OutOfRange(u8),
}

/// Failures reported by the remote call bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("not connected to the room")]
    NotConnected,
    #[error("room {room} is full ({capacity} players)")]
    RoomFull { room: String, capacity: usize },
    #[error("peer {0} is not in the room")]
    UnknownPeer(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Failures surfaced by a coordinator session to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    /// The session has lost its bus connection, left, or was kicked.
    #[error("session is not connected")]
    NotConnected,
    #[error("only the room host may do this")]
    NotHost,
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}
