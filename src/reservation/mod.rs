//! Marker reservation protocol.
//!
//! This module contains the per-client replica, presence tracking, event
//! fan-out and the protocol engine that keeps replicas converged.

pub mod engine;
pub mod events;
pub mod presence;
pub mod replica;
pub mod session;
pub mod state;
pub mod sync;
pub mod types;

// Re-export the main public API
pub use engine::{ClaimOutcome, ReservationEngine};
pub use events::{EventBus, ReservationEvent, Subscription};
pub use presence::{PresenceRecord, PresenceState, PresenceTracker};
pub use replica::{MergePolicy, ReplicaStore, ReserveOutcome};
pub use session::Session;
pub use state::{ConnectionStatus, CoordinatorState};
pub use types::{OwnerId, SLOT_COUNT, SlotId, SlotPosition};
