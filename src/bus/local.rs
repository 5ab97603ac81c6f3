//! In-process bus.
//!
//! [`LocalHub`] relays calls between connections living in the same process.
//! It provides room isolation, join/leave notifications in both directions
//! and a host role held by the longest-standing member. Fault injection lets
//! tests exercise transport failures and at-least-once duplication.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::bus::{Bus, BusEvent, CallTarget, Connection, IncomingCall, JoinOptions};
use crate::bus::message::{RemoteCall, Reply};
use crate::error::BusError;
use crate::reservation::types::OwnerId;

/// Faults applied to every call routed through a hub.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Reject calls with a transport error before delivery.
    pub fail_calls: bool,
    /// Deliver every call twice to each recipient.
    pub duplicate_deliveries: bool,
    /// Accept calls but lose them in transit; callers see no objection.
    pub drop_deliveries: bool,
}

struct Member {
    id: OwnerId,
    events: mpsc::UnboundedSender<BusEvent>,
    echo_self: bool,
}

struct Room {
    /// Join order; the first member is the host.
    members: Vec<Member>,
    capacity: usize,
}

impl Room {
    fn member(&self, id: &OwnerId) -> Option<&Member> {
        self.members.iter().find(|member| member.id == *id)
    }
}

/// Shared relay for every room in the process.
pub struct LocalHub {
    rooms: Mutex<HashMap<String, Room>>,
    next_peer: AtomicU64,
    faults: Mutex<FaultPlan>,
}

impl LocalHub {
    pub fn new() -> Arc<Self> {
        Arc::new(LocalHub {
            rooms: Mutex::new(HashMap::new()),
            next_peer: AtomicU64::new(1),
            faults: Mutex::new(FaultPlan::default()),
        })
    }

    /// Joins (or creates) a room and returns the new connection.
    pub fn join(
        self: &Arc<Self>,
        room_code: &str,
        options: JoinOptions,
    ) -> Result<Connection<LocalBus>, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut rooms = self.rooms.lock();
        let room = rooms.entry(room_code.to_string()).or_insert_with(|| Room {
            members: Vec::new(),
            capacity: options.max_players,
        });

        if room.members.len() >= room.capacity {
            return Err(BusError::RoomFull {
                room: room_code.to_string(),
                capacity: room.capacity,
            });
        }

        let id = OwnerId::new(format!(
            "player_{}",
            self.next_peer.fetch_add(1, Ordering::Relaxed)
        ));

        for member in &room.members {
            let _ = member.events.send(BusEvent::PeerJoined(id.clone()));
            let _ = tx.send(BusEvent::PeerJoined(member.id.clone()));
        }
        room.members.push(Member {
            id: id.clone(),
            events: tx,
            echo_self: options.echo_self,
        });
        info!(room = room_code, peer = %id, members = room.members.len(), "peer joined room");

        Ok(Connection {
            bus: LocalBus {
                hub: Arc::clone(self),
                room: room_code.to_string(),
                id,
            },
            events: rx,
        })
    }

    /// Simulates connectivity loss for one member: it receives
    /// [`BusEvent::Disconnected`] and everyone else sees it leave.
    pub fn disconnect(&self, room_code: &str, id: &OwnerId) -> bool {
        match self.remove_member(room_code, id) {
            Some(member) => {
                let _ = member.events.send(BusEvent::Disconnected);
                true
            }
            None => false,
        }
    }

    pub fn set_faults(&self, plan: FaultPlan) {
        *self.faults.lock() = plan;
    }

    /// Members of a room in join order.
    pub fn members(&self, room_code: &str) -> Vec<OwnerId> {
        self.rooms
            .lock()
            .get(room_code)
            .map(|room| room.members.iter().map(|m| m.id.clone()).collect())
            .unwrap_or_default()
    }

    fn remove_member(&self, room_code: &str, id: &OwnerId) -> Option<Member> {
        let mut rooms = self.rooms.lock();
        let room = rooms.get_mut(room_code)?;
        let index = room.members.iter().position(|m| m.id == *id)?;
        let member = room.members.remove(index);

        for remaining in &room.members {
            let _ = remaining.events.send(BusEvent::PeerLeft(id.clone()));
        }
        if room.members.is_empty() {
            rooms.remove(room_code);
        }
        info!(room = room_code, peer = %id, "peer left room");
        Some(member)
    }

    fn deliver(
        &self,
        room_code: &str,
        sender: &OwnerId,
        call: RemoteCall,
        target: CallTarget,
    ) -> Result<Vec<oneshot::Receiver<Reply>>, BusError> {
        let faults = self.faults.lock().clone();
        let rooms = self.rooms.lock();
        let room = rooms.get(room_code).ok_or(BusError::NotConnected)?;
        let origin = room.member(sender).ok_or(BusError::NotConnected)?;

        if faults.fail_calls {
            return Err(BusError::Transport(format!(
                "injected failure for {}",
                call.method()
            )));
        }

        if faults.drop_deliveries {
            debug!(method = call.method(), from = %sender, "dropping call in transit");
            return Ok(Vec::new());
        }

        let recipients: Vec<&Member> = match &target {
            CallTarget::Others => room.members.iter().filter(|m| m.id != *sender).collect(),
            CallTarget::Peer(id) => vec![
                room.member(id)
                    .ok_or_else(|| BusError::UnknownPeer(id.to_string()))?,
            ],
        };
        let copies = if faults.duplicate_deliveries { 2 } else { 1 };

        debug!(
            method = call.method(),
            from = %sender,
            recipients = recipients.len(),
            "routing call"
        );

        let mut pending = Vec::with_capacity(recipients.len() * copies);
        for member in recipients {
            for _ in 0..copies {
                let (incoming, reply) = IncomingCall::new(call.clone(), Some(sender.clone()));
                if member.events.send(BusEvent::Call(incoming)).is_ok() {
                    pending.push(reply);
                }
            }
        }

        if origin.echo_self {
            let _ = origin
                .events
                .send(BusEvent::Call(IncomingCall::without_reply(call, None)));
        }
        Ok(pending)
    }
}

/// One member's handle on a [`LocalHub`] room.
#[derive(Clone)]
pub struct LocalBus {
    hub: Arc<LocalHub>,
    room: String,
    id: OwnerId,
}

impl LocalBus {
    pub fn room_code(&self) -> &str {
        &self.room
    }
}

#[async_trait]
impl Bus for LocalBus {
    fn self_id(&self) -> &OwnerId {
        &self.id
    }

    fn is_host(&self) -> bool {
        self.hub
            .rooms
            .lock()
            .get(&self.room)
            .and_then(|room| room.members.first())
            .is_some_and(|host| host.id == self.id)
    }

    fn member_count(&self) -> usize {
        self.hub
            .rooms
            .lock()
            .get(&self.room)
            .map_or(0, |room| room.members.len())
    }

    async fn call(&self, call: RemoteCall, target: CallTarget) -> Result<Reply, BusError> {
        let mut pending: FuturesUnordered<_> = self
            .hub
            .deliver(&self.room, &self.id, call, target)?
            .into_iter()
            .collect();

        while let Some(answer) = pending.next().await {
            match answer {
                Ok(Reply::Ok) | Err(_) => continue,
                Ok(conflict) => return Ok(conflict),
            }
        }
        Ok(Reply::Ok)
    }

    fn leave(&self) {
        self.hub.remove_member(&self.room, &self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::types::SlotId;

    fn release(slot: u8) -> RemoteCall {
        RemoteCall::MarkerReleased {
            slot_id: SlotId::new(slot).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_join_notifications_and_host() {
        let hub = LocalHub::new();
        let mut a = hub.join("room", JoinOptions::default()).unwrap();
        let mut b = hub.join("room", JoinOptions::default()).unwrap();

        assert!(a.bus.is_host());
        assert!(!b.bus.is_host());
        assert_eq!(a.bus.member_count(), 2);

        match a.events.recv().await {
            Some(BusEvent::PeerJoined(id)) => assert_eq!(&id, b.bus.self_id()),
            other => panic!("unexpected event: {other:?}"),
        }
        match b.events.recv().await {
            Some(BusEvent::PeerJoined(id)) => assert_eq!(&id, a.bus.self_id()),
            other => panic!("unexpected event: {other:?}"),
        }

        a.bus.leave();
        assert!(b.bus.is_host());
        match b.events.recv().await {
            Some(BusEvent::PeerLeft(id)) => assert_eq!(&id, a.bus.self_id()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rooms_are_isolated_and_capped() {
        let hub = LocalHub::new();
        let options = JoinOptions {
            max_players: 1,
            ..JoinOptions::default()
        };
        let a = hub.join("one", options.clone()).unwrap();
        let other = hub.join("two", options.clone()).unwrap();

        assert!(matches!(
            hub.join("one", options),
            Err(BusError::RoomFull { capacity: 1, .. })
        ));
        assert_eq!(a.bus.member_count(), 1);
        assert_eq!(hub.members("two"), vec![other.bus.self_id().clone()]);
    }

    #[tokio::test]
    async fn test_call_without_peers_resolves_ok() {
        let hub = LocalHub::new();
        let a = hub.join("room", JoinOptions::default()).unwrap();
        assert_eq!(a.bus.call(release(0), CallTarget::Others).await, Ok(Reply::Ok));
    }

    #[tokio::test]
    async fn test_first_conflict_wins() {
        let hub = LocalHub::new();
        let a = hub.join("room", JoinOptions::default()).unwrap();
        let mut b = hub.join("room", JoinOptions::default()).unwrap();

        let responder = tokio::spawn(async move {
            while let Some(event) = b.events.recv().await {
                if let BusEvent::Call(mut incoming) = event {
                    incoming.respond(Reply::AlreadyReserved);
                    break;
                }
            }
        });

        let reply = a.bus.call(release(1), CallTarget::Others).await;
        assert_eq!(reply, Ok(Reply::AlreadyReserved));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let hub = LocalHub::new();
        let a = hub.join("room", JoinOptions::default()).unwrap();
        let mut b = hub.join("room", JoinOptions::default()).unwrap();

        hub.set_faults(FaultPlan {
            fail_calls: true,
            ..FaultPlan::default()
        });
        assert!(matches!(
            a.bus.call(release(2), CallTarget::Others).await,
            Err(BusError::Transport(_))
        ));

        hub.set_faults(FaultPlan {
            duplicate_deliveries: true,
            ..FaultPlan::default()
        });
        // Replies are dropped unanswered, which counts as no objection.
        let _ = b.events.recv().await; // peer joined
        let call = tokio::spawn({
            let bus = a.bus.clone();
            async move { bus.call(release(2), CallTarget::Others).await }
        });
        let mut copies = 0;
        while copies < 2 {
            if let Some(BusEvent::Call(incoming)) = b.events.recv().await {
                assert_eq!(incoming.sender.as_ref(), Some(a.bus.self_id()));
                copies += 1;
            }
        }
        assert_eq!(call.await.unwrap(), Ok(Reply::Ok));
    }

    #[tokio::test]
    async fn test_targeted_call_and_unknown_peer() {
        let hub = LocalHub::new();
        let a = hub.join("room", JoinOptions::default()).unwrap();
        let stranger = OwnerId::new("nobody");

        assert_eq!(
            a.bus.call(release(3), CallTarget::Peer(stranger)).await,
            Err(BusError::UnknownPeer("nobody".to_string()))
        );
    }

    #[tokio::test]
    async fn test_self_echo_has_no_sender() {
        let hub = LocalHub::new();
        let mut a = hub
            .join(
                "room",
                JoinOptions {
                    echo_self: true,
                    ..JoinOptions::default()
                },
            )
            .unwrap();

        a.bus.call(release(4), CallTarget::Others).await.unwrap();
        match a.events.recv().await {
            Some(BusEvent::Call(incoming)) => assert!(incoming.sender.is_none()),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disconnect_notifies_both_sides() {
        let hub = LocalHub::new();
        let mut a = hub.join("room", JoinOptions::default()).unwrap();
        let mut b = hub.join("room", JoinOptions::default()).unwrap();
        let _ = a.events.recv().await;
        let _ = b.events.recv().await;

        assert!(hub.disconnect("room", b.bus.self_id()));
        assert!(!hub.disconnect("room", b.bus.self_id()));

        assert!(matches!(b.events.recv().await, Some(BusEvent::Disconnected)));
        assert!(matches!(a.events.recv().await, Some(BusEvent::PeerLeft(_))));
        assert_eq!(
            b.bus.call(release(5), CallTarget::Others).await,
            Err(BusError::NotConnected)
        );
    }
}
