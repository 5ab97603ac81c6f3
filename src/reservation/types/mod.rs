//! Type definitions for the reservation protocol.
//!
//! This module contains the fundamental identifiers shared by the replica,
//! the presence tracker, the protocol engine and the wire messages.

pub mod owner;
pub mod slot;

pub use owner::OwnerId;
pub use slot::{SLOT_COUNT, SlotId, SlotPosition};
