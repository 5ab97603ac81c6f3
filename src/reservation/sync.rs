//! Bootstrap sync for newly joined clients.
//!
//! A fresh client broadcasts `sync-reservations-request`; every peer answers
//! the requester directly with its full snapshot. Responses may arrive in any
//! order and any number of times. Each one is merged with
//! [`MergePolicy::PreferLocal`], so the first owner learned for a slot sticks
//! and repeated snapshots change nothing.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::bus::{Bus, CallTarget, RemoteCall};
use crate::error::CoordinatorError;
use crate::reservation::engine::ReservationEngine;
use crate::reservation::presence::PresenceState;
use crate::reservation::replica::MergePolicy;
use crate::reservation::types::{OwnerId, SlotId};

impl<B: Bus> ReservationEngine<B> {
    /// Asks every peer for its reservation table.
    pub fn request_sync(&self) -> Result<(), CoordinatorError> {
        self.ensure_connected()?;
        info!("requesting reservation sync");
        self.broadcast(RemoteCall::SyncReservationsRequest {});
        Ok(())
    }

    pub(crate) fn answer_sync_request(&self, requester: &OwnerId) {
        let reserved_markers = self.state.replica().snapshot();
        debug!(requester = %requester, slots = reserved_markers.len(), "answering sync request");
        self.send_detached(
            RemoteCall::SyncReservationsResponse { reserved_markers },
            CallTarget::Peer(requester.clone()),
        );
    }

    /// Merges one peer's snapshot and returns the slots it filled in.
    ///
    /// Pairs naming an identity already seen departing are dropped, so a
    /// slow snapshot cannot resurrect a released seat. Pairs naming this
    /// client are skipped: only this client's own claim or release decides
    /// those, and a peer may list a claim that is still in flight here.
    pub(crate) fn apply_sync_response(
        &self,
        from: &OwnerId,
        reserved_markers: &BTreeMap<SlotId, OwnerId>,
    ) -> Vec<SlotId> {
        let me = self.self_id();
        let replica = self.state.replica();
        let presence = self.state.presence();
        let mut accepted = BTreeMap::new();

        for (slot, owner) in reserved_markers {
            if owner == me {
                if replica.get(*slot).as_ref() != Some(me) {
                    debug!(slot = %slot, from = %from, "peer lists a claim of ours not held here");
                }
                continue;
            }
            let departed = presence
                .record(owner)
                .is_some_and(|record| record.state == PresenceState::Departed);
            if departed {
                debug!(slot = %slot, owner = %owner, "skipping reservation of departed player");
                continue;
            }
            accepted.insert(*slot, owner.clone());
        }

        let adopted = replica.merge(&accepted, MergePolicy::PreferLocal);
        info!(from = %from, adopted = ?adopted, "merged reservation snapshot");
        adopted
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::bus::{BusEvent, JoinOptions, LocalHub};
    use crate::config::CoordinatorConfig;
    use crate::reservation::state::CoordinatorState;

    fn slot(value: u8) -> SlotId {
        SlotId::new(value).unwrap()
    }

    fn engine(hub: &Arc<LocalHub>) -> ReservationEngine<crate::bus::LocalBus> {
        let connection = hub.join("sync", JoinOptions::default()).unwrap();
        let state = CoordinatorState::new(connection.bus.self_id().clone());
        ReservationEngine::new(state, Arc::new(connection.bus), CoordinatorConfig::default())
    }

    #[tokio::test]
    async fn test_responses_in_any_order_converge() {
        let hub = LocalHub::new();
        let fresh = engine(&hub);
        let from_a = OwnerId::new("a");
        let from_b = OwnerId::new("b");

        let view_a = BTreeMap::from([(slot(3), OwnerId::new("a")), (slot(1), OwnerId::new("b"))]);
        let view_b = BTreeMap::from([(slot(1), OwnerId::new("b")), (slot(7), OwnerId::new("c"))]);

        fresh.apply_sync_response(&from_b, &view_b);
        fresh.apply_sync_response(&from_a, &view_a);
        fresh.apply_sync_response(&from_a, &view_a);

        let reservations = fresh.reservations();
        assert_eq!(reservations.len(), 3);
        assert_eq!(reservations[&slot(3)], OwnerId::new("a"));
        assert_eq!(reservations[&slot(1)], OwnerId::new("b"));
        assert_eq!(reservations[&slot(7)], OwnerId::new("c"));
    }

    #[tokio::test]
    async fn test_departed_owners_are_not_resurrected() {
        let hub = LocalHub::new();
        let fresh = engine(&hub);
        let gone = OwnerId::new("gone");
        fresh.state().presence().on_join(&gone);
        fresh.state().presence().on_leave(&gone);

        let snapshot = BTreeMap::from([(slot(2), gone.clone()), (slot(5), OwnerId::new("d"))]);
        let adopted = fresh.apply_sync_response(&OwnerId::new("a"), &snapshot);

        assert_eq!(adopted, vec![slot(5)]);
        assert_eq!(fresh.owner_of(slot(2)), None);
    }

    #[tokio::test]
    async fn test_own_entries_are_left_to_the_owner() {
        let hub = LocalHub::new();
        let fresh = engine(&hub);
        let mut peer = hub.join("sync", JoinOptions::default()).unwrap();
        let me = fresh.self_id().clone();

        // A peer lists a claim of ours that has not committed here yet.
        let snapshot = BTreeMap::from([(slot(4), me)]);
        assert!(fresh.apply_sync_response(&OwnerId::new("a"), &snapshot).is_empty());
        assert_eq!(fresh.owner_of(slot(4)), None);

        tokio::time::sleep(Duration::from_millis(20)).await;
        while let Ok(event) = peer.events.try_recv() {
            assert!(!matches!(event, BusEvent::Call(_)), "unexpected call: {event:?}");
        }
    }
}
