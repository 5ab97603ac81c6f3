//! Reservation protocol engine.
//!
//! Claims, releases and the handlers for every remote method. There is no
//! coordinator node: each client runs the same engine against its own replica
//! and the replicas converge through the calls exchanged here.
//!
//! # Guarantees
//!
//! - A slot recorded for one owner is never reassigned by this replica until a
//!   release from that owner, a cancel, or their departure has been observed.
//! - Handlers check state before mutating, so duplicated or reordered calls
//!   are harmless.
//! - Two clients racing for the same free slot get no deterministic winner.
//!   When both see each other's claim before committing, both back off; when
//!   neither sees the other's claim, both keep the slot until a later
//!   release or departure corrects it.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use tracing::{debug, info, trace, warn};

use crate::bus::{Bus, BusEvent, CallTarget, IncomingCall, RemoteCall, Reply};
use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use crate::reservation::events::{EventBus, ReservationEvent};
use crate::reservation::presence::PresenceState;
use crate::reservation::replica::ReserveOutcome;
use crate::reservation::state::{ConnectionStatus, CoordinatorState};
use crate::reservation::types::{OwnerId, SlotId, SlotPosition};

/// Result of [`ReservationEngine::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// The slot is held by someone else. `owner` is `None` when the conflict
    /// was reported by a peer rather than found in the local replica.
    Conflict { owner: Option<OwnerId> },
}

impl ClaimOutcome {
    /// True when the claim committed.
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed)
    }
}

/// One client's protocol engine over a bus connection.
pub struct ReservationEngine<B: Bus> {
    pub(crate) state: Arc<CoordinatorState>,
    pub(crate) bus: Arc<B>,
    pub(crate) config: CoordinatorConfig,
}

impl<B: Bus> ReservationEngine<B> {
    /// Creates an engine around shared state and a joined bus.
    pub fn new(state: Arc<CoordinatorState>, bus: Arc<B>, config: CoordinatorConfig) -> Self {
        ReservationEngine { state, bus, config }
    }

    /// Shared coordinator state.
    pub fn state(&self) -> &Arc<CoordinatorState> {
        &self.state
    }

    /// Local event fan-out for UI observers.
    pub fn events(&self) -> &EventBus {
        self.state.events()
    }

    /// Identity this client holds in the room.
    pub fn self_id(&self) -> &OwnerId {
        self.state.self_id()
    }

    /// Whether this client is connected and holds the host role.
    pub fn is_host(&self) -> bool {
        self.state.is_connected() && self.bus.is_host()
    }

    /// False once the session was disconnected, kicked or left.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Members in the room, this client included.
    pub fn player_count(&self) -> usize {
        if self.state.is_connected() {
            self.bus.member_count()
        } else {
            0
        }
    }

    /// Owner of a slot according to the local replica.
    pub fn owner_of(&self, slot: SlotId) -> Option<OwnerId> {
        self.state.replica().get(slot)
    }

    /// True when the slot is free or already ours.
    pub fn is_available(&self, slot: SlotId) -> bool {
        match self.owner_of(slot) {
            Some(owner) if owner != *self.self_id() => {
                debug!(slot = %slot, owner = %owner, "slot unavailable");
                false
            }
            _ => true,
        }
    }

    /// The slot this client currently holds, if any.
    pub fn my_slot(&self) -> Option<SlotId> {
        self.state.my_slot()
    }

    /// Copy of the local replica.
    pub fn reservations(&self) -> std::collections::BTreeMap<SlotId, OwnerId> {
        self.state.replica().snapshot()
    }

    /// Tries to take exclusive ownership of a slot.
    ///
    /// Fails fast without touching the network when the local replica already
    /// records another owner. Otherwise any slot this client held is released,
    /// the claim is broadcast, and the first conflicting answer aborts it.
    /// Transport errors and timeouts fail open: the claim is committed.
    ///
    /// Re-claiming a slot this client already holds never gives it up: a
    /// conflicting answer only means that peer's replica is stale.
    pub async fn claim(&self, slot: SlotId) -> Result<ClaimOutcome, CoordinatorError> {
        self.ensure_connected()?;
        let me = self.self_id().clone();
        let replica = self.state.replica();

        let already_ours = match replica.get(slot) {
            Some(owner) if owner != me => {
                info!(slot = %slot, owner = %owner, "claim refused locally");
                return Ok(ClaimOutcome::Conflict { owner: Some(owner) });
            }
            Some(_) => true,
            None => false,
        };

        for held in replica.slots_owned_by(&me) {
            if held != slot {
                self.release(held)?;
            }
        }

        let call = RemoteCall::MarkerReserved {
            slot_id: slot,
            timestamp: Utc::now().timestamp_millis(),
        };
        let round_trip = self.bus.call(call, CallTarget::Others);

        match tokio::time::timeout(self.config.claim_timeout, round_trip).await {
            Ok(Ok(Reply::Ok)) => {}
            Ok(Ok(Reply::AlreadyReserved)) if already_ours => {
                // The objecting peer is stale; every other replica keeps us.
                warn!(slot = %slot, "peer disputes a slot we already hold, keeping it");
            }
            Ok(Ok(Reply::AlreadyReserved)) => {
                info!(slot = %slot, "claim rejected by a peer");
                self.revert_claim(slot);
                return Ok(ClaimOutcome::Conflict { owner: None });
            }
            Ok(Err(err)) => {
                warn!(slot = %slot, error = %err, "claim round-trip failed, assuming success");
            }
            Err(_) => {
                warn!(
                    slot = %slot,
                    timeout_ms = self.config.claim_timeout.as_millis() as u64,
                    "claim round-trip timed out, assuming success"
                );
            }
        }

        match replica.reserve(slot, &me) {
            ReserveOutcome::Reserved | ReserveOutcome::AlreadyOwned => {
                info!(slot = %slot, "slot claimed");
                Ok(ClaimOutcome::Claimed)
            }
            ReserveOutcome::Conflict(owner) => {
                // A peer's claim was accepted here while ours was in flight.
                info!(slot = %slot, owner = %owner, "claim lost to a concurrent claim");
                self.revert_claim(slot);
                Ok(ClaimOutcome::Conflict { owner: Some(owner) })
            }
        }
    }

    /// Releases a slot held by this client. Returns false (and sends nothing)
    /// when the slot is free or held by someone else.
    pub fn release(&self, slot: SlotId) -> Result<bool, CoordinatorError> {
        self.ensure_connected()?;
        if !self.state.replica().clear_if_owned(slot, self.self_id()) {
            debug!(slot = %slot, "release skipped, slot not ours");
            return Ok(false);
        }
        info!(slot = %slot, "releasing slot");
        self.broadcast(RemoteCall::MarkerReleased { slot_id: slot });
        Ok(true)
    }

    /// Frees every slot recorded for `owner` and returns them.
    ///
    /// For this client's own identity each release is announced to the room.
    /// For anyone else the slots are only cleared locally, since peers honour
    /// a release only from the recorded owner.
    pub fn release_all(&self, owner: &OwnerId) -> Vec<SlotId> {
        let replica = self.state.replica();
        let announce = owner == self.self_id() && self.state.is_connected();
        let mut freed = Vec::new();

        for slot in replica.slots_owned_by(owner) {
            if replica.clear_if_owned(slot, owner) {
                if announce {
                    self.broadcast(RemoteCall::MarkerReleased { slot_id: slot });
                }
                freed.push(slot);
            }
        }

        if !freed.is_empty() {
            info!(owner = %owner, slots = ?freed, "released all slots");
        }
        freed
    }

    /// Announces that this client is visibly standing at a slot. Drives UI
    /// highlighting on peers; ownership is unaffected.
    pub fn confirm(&self, slot: SlotId) -> Result<(), CoordinatorError> {
        self.ensure_connected()?;
        debug!(slot = %slot, "confirming position");
        self.broadcast(RemoteCall::MarkerConfirmed {
            slot_id: slot,
            position: slot.position(),
        });
        Ok(())
    }

    /// Steps away from the confirmed spot. Peers drop this client's
    /// reservation; the local replica does the same.
    pub fn cancel(&self) -> Result<Vec<SlotId>, CoordinatorError> {
        self.ensure_connected()?;
        let me = self.self_id().clone();
        let freed = self.local_release_all(&me);
        self.broadcast(RemoteCall::MarkerCancelled {});
        Ok(freed)
    }

    /// Sends a photo to the canvas. The payload rides on the same bus but is
    /// opaque to the protocol.
    pub fn send_image(
        &self,
        image_data: impl Into<String>,
        position: SlotPosition,
    ) -> Result<(), CoordinatorError> {
        self.ensure_connected()?;
        self.broadcast(RemoteCall::ImageSent {
            image_data: image_data.into(),
            position,
            timestamp: Utc::now().timestamp_millis(),
        });
        Ok(())
    }

    /// Evicts a player from the room. Host only.
    pub fn kick(&self, player: &OwnerId) -> Result<(), CoordinatorError> {
        self.ensure_connected()?;
        if !self.bus.is_host() {
            return Err(CoordinatorError::NotHost);
        }
        info!(player = %player, "kicking player");
        self.broadcast(RemoteCall::KickPlayerRpc {
            player_id: player.clone(),
        });
        Ok(())
    }

    /// Leaves the room voluntarily.
    pub fn leave(&self) {
        if self.state.end(ConnectionStatus::Left) {
            info!(me = %self.self_id(), "leaving room");
            self.bus.leave();
        }
    }

    /// Applies one bus event. Returns false once the session has ended and
    /// the run loop should stop.
    pub fn handle_event(&self, event: BusEvent) -> bool {
        match event {
            BusEvent::Call(incoming) => self.handle_call(incoming),
            BusEvent::PeerJoined(peer) => {
                if self.state.presence().on_join(&peer) {
                    info!(peer = %peer, "player joined");
                    self.events()
                        .publish(ReservationEvent::PresenceJoined { player_id: peer });
                }
                true
            }
            BusEvent::PeerLeft(peer) => {
                self.peer_left(&peer);
                true
            }
            BusEvent::Disconnected => {
                if self.state.end(ConnectionStatus::Disconnected) {
                    warn!("lost connection to the room");
                    self.events().publish(ReservationEvent::ConnectionLost);
                }
                false
            }
        }
    }

    fn handle_call(&self, mut incoming: IncomingCall) -> bool {
        let Some(sender) = incoming.sender.clone() else {
            trace!(method = incoming.call.method(), "ignoring own echo");
            incoming.respond(Reply::Ok);
            return true;
        };

        if self.has_departed(&sender) {
            debug!(method = incoming.call.method(), sender = %sender, "ignoring call from departed player");
            incoming.respond(Reply::Ok);
            return true;
        }

        let mut keep_running = true;
        let reply = match &incoming.call {
            RemoteCall::MarkerReserved { slot_id, .. } => self.on_reserved(*slot_id, &sender),
            RemoteCall::MarkerReleased { slot_id } => {
                if !self.state.replica().clear_if_owned(*slot_id, &sender) {
                    debug!(slot = %slot_id, sender = %sender, "ignoring release from non-owner");
                }
                Reply::Ok
            }
            RemoteCall::MarkerConfirmed { slot_id, position } => {
                self.events().publish(ReservationEvent::SlotConfirmed {
                    slot_id: *slot_id,
                    position: *position,
                    owner: sender.clone(),
                });
                Reply::Ok
            }
            RemoteCall::MarkerCancelled {} => {
                self.local_release_all(&sender);
                self.events()
                    .publish(ReservationEvent::SlotCancelled { owner: sender.clone() });
                Reply::Ok
            }
            RemoteCall::SyncReservationsRequest {} => {
                self.answer_sync_request(&sender);
                Reply::Ok
            }
            RemoteCall::SyncReservationsResponse { reserved_markers } => {
                self.apply_sync_response(&sender, reserved_markers);
                Reply::Ok
            }
            RemoteCall::ImageSent {
                image_data,
                position,
                timestamp,
            } => {
                self.events().publish(ReservationEvent::ImageReceived {
                    image_data: image_data.clone(),
                    position: *position,
                    timestamp: *timestamp,
                    owner: sender.clone(),
                });
                Reply::Ok
            }
            RemoteCall::KickPlayerRpc { player_id } => {
                if player_id == self.self_id() {
                    keep_running = !self.on_kicked(&sender);
                }
                Reply::Ok
            }
        };

        incoming.respond(reply);
        keep_running
    }

    /// Reserve-if-free-or-same-owner, mirrored from the claimer's own check.
    fn on_reserved(&self, slot: SlotId, sender: &OwnerId) -> Reply {
        match self.state.replica().reserve(slot, sender) {
            ReserveOutcome::Reserved | ReserveOutcome::AlreadyOwned => {
                debug!(slot = %slot, owner = %sender, "accepted remote claim");
                Reply::Ok
            }
            ReserveOutcome::Conflict(existing) => {
                info!(slot = %slot, sender = %sender, owner = %existing, "rejecting conflicting claim");
                Reply::AlreadyReserved
            }
        }
    }

    fn peer_left(&self, peer: &OwnerId) {
        if !self.state.presence().on_leave(peer) {
            trace!(peer = %peer, "duplicate leave ignored");
            return;
        }
        let freed = self.local_release_all(peer);
        info!(peer = %peer, released = ?freed, "player left");

        let retention =
            TimeDelta::from_std(self.config.tombstone_retention).unwrap_or(TimeDelta::MAX);
        let pruned = self.state.presence().prune_departed(Utc::now(), retention);
        if pruned > 0 {
            debug!(pruned, "dropped old presence tombstones");
        }
        self.events().publish(ReservationEvent::PresenceLeft {
            player_id: peer.clone(),
        });
    }

    fn on_kicked(&self, by: &OwnerId) -> bool {
        if !self.state.end(ConnectionStatus::Kicked) {
            return false;
        }
        warn!(host = %by, "removed from the room by the host");
        self.bus.leave();
        self.events().publish(ReservationEvent::Kicked);
        true
    }

    fn has_departed(&self, identity: &OwnerId) -> bool {
        self.state
            .presence()
            .record(identity)
            .is_some_and(|record| record.state == PresenceState::Departed)
    }

    fn local_release_all(&self, owner: &OwnerId) -> Vec<SlotId> {
        let replica = self.state.replica();
        replica
            .slots_owned_by(owner)
            .into_iter()
            .filter(|slot| replica.clear_if_owned(*slot, owner))
            .collect()
    }

    fn revert_claim(&self, slot: SlotId) {
        // Peers that already adopted our claim drop it; the rest ignore a
        // release from a non-owner.
        self.broadcast(RemoteCall::MarkerReleased { slot_id: slot });
    }

    pub(crate) fn ensure_connected(&self) -> Result<(), CoordinatorError> {
        if self.state.is_connected() {
            Ok(())
        } else {
            Err(CoordinatorError::NotConnected)
        }
    }

    /// Fire-and-forget call to every other member.
    pub(crate) fn broadcast(&self, call: RemoteCall) {
        self.send_detached(call, CallTarget::Others);
    }

    pub(crate) fn send_detached(&self, call: RemoteCall, target: CallTarget) {
        let bus = Arc::clone(&self.bus);
        let method = call.method();
        tokio::spawn(async move {
            if let Err(err) = bus.call(call, target).await {
                warn!(method, error = %err, "remote call failed");
            }
        });
    }
}
