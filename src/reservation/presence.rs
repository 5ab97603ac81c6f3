//! Presence tracking for remote identities.
//!
//! Departed identities are kept as tombstones rather than removed, so a
//! duplicated leave notification is recognised and the reservation cascade
//! runs once per disconnect. Tombstones older than a retention window are
//! pruned; identities are never reused, so a pruned one only matters for
//! messages delayed longer than that window.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;

use crate::reservation::types::OwnerId;

/// Whether a remote identity is still in the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Connected,
    Departed,
}

/// What is known about one remote identity.
#[derive(Debug, Clone)]
pub struct PresenceRecord {
    pub state: PresenceState,
    /// `None` when the leave was observed without a prior join.
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
}

/// Join/leave bookkeeping for every identity seen in the room.
#[derive(Default)]
pub struct PresenceTracker {
    records: RwLock<HashMap<OwnerId, PresenceRecord>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a join. Returns false for an identity already seen.
    pub fn on_join(&self, identity: &OwnerId) -> bool {
        let mut records = self.records.write();
        if records.contains_key(identity) {
            return false;
        }
        records.insert(
            identity.clone(),
            PresenceRecord {
                state: PresenceState::Connected,
                joined_at: Some(Utc::now()),
                left_at: None,
            },
        );
        true
    }

    /// Records a departure. Returns true only the first time for a given
    /// identity; the caller runs the release cascade on true.
    pub fn on_leave(&self, identity: &OwnerId) -> bool {
        let mut records = self.records.write();
        match records.get_mut(identity) {
            Some(record) if record.state == PresenceState::Departed => false,
            Some(record) => {
                record.state = PresenceState::Departed;
                record.left_at = Some(Utc::now());
                true
            }
            None => {
                records.insert(
                    identity.clone(),
                    PresenceRecord {
                        state: PresenceState::Departed,
                        joined_at: None,
                        left_at: Some(Utc::now()),
                    },
                );
                true
            }
        }
    }

    /// Whether the identity joined and has not left.
    pub fn is_connected(&self, identity: &OwnerId) -> bool {
        self.records
            .read()
            .get(identity)
            .is_some_and(|record| record.state == PresenceState::Connected)
    }

    /// Full record for an identity, tombstones included.
    pub fn record(&self, identity: &OwnerId) -> Option<PresenceRecord> {
        self.records.read().get(identity).cloned()
    }

    /// Drops tombstones that departed more than `retention` before `now`.
    /// Returns how many were removed.
    pub fn prune_departed(&self, now: DateTime<Utc>, retention: TimeDelta) -> usize {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, record| match (record.state, record.left_at) {
            (PresenceState::Departed, Some(left_at)) => now - left_at <= retention,
            _ => true,
        });
        before - records.len()
    }

    /// Number of records held, tombstones included.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Currently connected remote identities, sorted.
    pub fn connected(&self) -> Vec<OwnerId> {
        let mut connected: Vec<OwnerId> = self
            .records
            .read()
            .iter()
            .filter(|(_, record)| record.state == PresenceState::Connected)
            .map(|(identity, _)| identity.clone())
            .collect();
        connected.sort();
        connected
    }

    pub fn connected_count(&self) -> usize {
        self.records
            .read()
            .values()
            .filter(|record| record.state == PresenceState::Connected)
            .count()
    }
}
