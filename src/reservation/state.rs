//! Per-session coordinator state.
//!
//! Everything one client knows about the room lives in a single
//! [`CoordinatorState`], created when the session starts and dropped with it.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::reservation::events::EventBus;
use crate::reservation::presence::PresenceTracker;
use crate::reservation::replica::ReplicaStore;
use crate::reservation::types::{OwnerId, SlotId};

/// Lifecycle of the local session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    /// The bus connection dropped underneath us.
    Disconnected,
    /// The room host evicted us.
    Kicked,
    /// We left voluntarily.
    Left,
}

pub struct CoordinatorState {
    self_id: OwnerId,
    events: Arc<EventBus>,
    replica: ReplicaStore,
    presence: PresenceTracker,
    status: RwLock<ConnectionStatus>,
}

impl CoordinatorState {
    pub fn new(self_id: OwnerId) -> Arc<Self> {
        let events = Arc::new(EventBus::new());
        Arc::new(CoordinatorState {
            self_id,
            replica: ReplicaStore::new(Arc::clone(&events)),
            presence: PresenceTracker::new(),
            events,
            status: RwLock::new(ConnectionStatus::Connected),
        })
    }

    pub fn self_id(&self) -> &OwnerId {
        &self.self_id
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn replica(&self) -> &ReplicaStore {
        &self.replica
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Moves to a terminal status. Returns false if the session had already
    /// ended, so terminal transitions happen once.
    pub fn end(&self, status: ConnectionStatus) -> bool {
        let mut current = self.status.write();
        if *current != ConnectionStatus::Connected {
            return false;
        }
        *current = status;
        true
    }

    /// The slot this client holds, if any.
    pub fn my_slot(&self) -> Option<SlotId> {
        self.replica.slots_owned_by(&self.self_id).into_iter().next()
    }
}
