//! Client-local replica of the slot reservation table.
//!
//! Each connected client owns exactly one [`ReplicaStore`]. Replicas are never
//! shared between clients; they converge only through protocol messages.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam_skiplist::SkipMap;
use parking_lot::Mutex;

use crate::reservation::events::{EventBus, ReservationEvent};
use crate::reservation::types::{OwnerId, SlotId};

/// How incoming pairs are reconciled with locally known owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Adopt a remote pair only when the local slot is empty. A stale remote
    /// snapshot can never evict a fresher local claim.
    PreferLocal,
    /// Remote pairs overwrite local owners.
    PreferRemote,
}

/// Result of [`ReplicaStore::reserve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The slot was free and now belongs to the requester.
    Reserved,
    /// The requester already held the slot.
    AlreadyOwned,
    /// Someone else holds the slot; nothing changed.
    Conflict(OwnerId),
}

impl ReserveOutcome {
    pub fn is_owned(&self) -> bool {
        !matches!(self, ReserveOutcome::Conflict(_))
    }
}

/// The slot → owner table.
///
/// Reads go straight to the lock-free skip map. Mutations are serialised by a
/// writer lock so every check-then-set is atomic with respect to other
/// mutations. Events are published after the lock is released.
pub struct ReplicaStore {
    slots: SkipMap<SlotId, OwnerId>,
    writer: Mutex<()>,
    events: Arc<EventBus>,
}

impl ReplicaStore {
    pub fn new(events: Arc<EventBus>) -> Self {
        ReplicaStore {
            slots: SkipMap::new(),
            writer: Mutex::new(()),
            events,
        }
    }

    /// Gets the owner of a slot, if any.
    pub fn get(&self, slot: SlotId) -> Option<OwnerId> {
        self.slots.get(&slot).map(|entry| entry.value().clone())
    }

    /// Unconditionally assigns a slot. Returns the previous owner.
    pub fn set(&self, slot: SlotId, owner: OwnerId) -> Option<OwnerId> {
        let previous = {
            let _writer = self.writer.lock();
            let previous = self.get(slot);
            self.slots.insert(slot, owner.clone());
            previous
        };

        match &previous {
            Some(existing) if *existing == owner => {}
            Some(existing) => {
                self.publish_released(slot, existing.clone());
                self.publish_claimed(slot, owner);
            }
            None => self.publish_claimed(slot, owner),
        }
        previous
    }

    /// Reserves a slot if it is free or already held by `owner`.
    pub fn reserve(&self, slot: SlotId, owner: &OwnerId) -> ReserveOutcome {
        let outcome = {
            let _writer = self.writer.lock();
            match self.get(slot) {
                Some(existing) if existing == *owner => ReserveOutcome::AlreadyOwned,
                Some(existing) => ReserveOutcome::Conflict(existing),
                None => {
                    self.slots.insert(slot, owner.clone());
                    ReserveOutcome::Reserved
                }
            }
        };

        if outcome == ReserveOutcome::Reserved {
            self.publish_claimed(slot, owner.clone());
        }
        outcome
    }

    /// Frees a slot regardless of owner. Returns the owner it had.
    pub fn clear(&self, slot: SlotId) -> Option<OwnerId> {
        let removed = {
            let _writer = self.writer.lock();
            self.slots.remove(&slot).map(|entry| entry.value().clone())
        };

        if let Some(owner) = &removed {
            self.publish_released(slot, owner.clone());
        }
        removed
    }

    /// Frees a slot only if `owner` is its recorded owner.
    pub fn clear_if_owned(&self, slot: SlotId, owner: &OwnerId) -> bool {
        let cleared = {
            let _writer = self.writer.lock();
            match self.get(slot) {
                Some(existing) if existing == *owner => {
                    self.slots.remove(&slot);
                    true
                }
                _ => false,
            }
        };

        if cleared {
            self.publish_released(slot, owner.clone());
        }
        cleared
    }

    /// Lists the slots currently recorded for `owner`, in slot order.
    pub fn slots_owned_by(&self, owner: &OwnerId) -> Vec<SlotId> {
        self.slots
            .iter()
            .filter(|entry| entry.value() == owner)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Copies the full table.
    pub fn snapshot(&self) -> BTreeMap<SlotId, OwnerId> {
        self.slots
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Folds a partial table into this replica. Returns the slots whose owner
    /// changed. Re-applying the same pairs is a no-op.
    pub fn merge(&self, incoming: &BTreeMap<SlotId, OwnerId>, policy: MergePolicy) -> Vec<SlotId> {
        let mut changes = Vec::new();
        {
            let _writer = self.writer.lock();
            for (slot, owner) in incoming {
                let previous = self.get(*slot);
                let adopt = match (&previous, policy) {
                    (None, _) => true,
                    (Some(existing), MergePolicy::PreferRemote) => existing != owner,
                    (Some(_), MergePolicy::PreferLocal) => false,
                };
                if adopt {
                    self.slots.insert(*slot, owner.clone());
                    changes.push((*slot, previous, owner.clone()));
                }
            }
        }

        for (slot, previous, owner) in &changes {
            if let Some(previous) = previous {
                self.publish_released(*slot, previous.clone());
            }
            self.publish_claimed(*slot, owner.clone());
        }
        changes.into_iter().map(|(slot, _, _)| slot).collect()
    }

    /// Gets the number of occupied slots.
    pub fn occupied_count(&self) -> usize {
        self.slots.len()
    }

    fn publish_claimed(&self, slot_id: SlotId, owner: OwnerId) {
        self.events
            .publish(ReservationEvent::SlotClaimed { slot_id, owner });
    }

    fn publish_released(&self, slot_id: SlotId, owner: OwnerId) {
        self.events
            .publish(ReservationEvent::SlotReleased { slot_id, owner });
    }
}
