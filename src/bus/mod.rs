//! Remote call bus interface.
//!
//! The bus is an external collaborator: an at-least-once, unordered,
//! room-scoped broadcast transport. Outgoing calls go through [`Bus::call`];
//! everything arriving from the room is delivered as a [`BusEvent`] on the
//! connection's channel. Each incoming call carries a oneshot reply channel
//! that correlates the handler's answer with the caller's pending future.

pub mod local;
pub mod message;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::BusError;
use crate::reservation::types::OwnerId;

pub use local::{FaultPlan, LocalBus, LocalHub};
pub use message::{RemoteCall, Reply};

/// Who receives a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// Every other member of the room.
    Others,
    /// One specific member.
    Peer(OwnerId),
}

/// A call delivered to this client.
#[derive(Debug)]
pub struct IncomingCall {
    pub call: RemoteCall,
    /// `None` when the call is an echo of this client's own broadcast.
    pub sender: Option<OwnerId>,
    reply: Option<oneshot::Sender<Reply>>,
}

impl IncomingCall {
    /// Creates a call plus the receiver its reply will arrive on.
    pub fn new(call: RemoteCall, sender: Option<OwnerId>) -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let incoming = IncomingCall {
            call,
            sender,
            reply: Some(tx),
        };
        (incoming, rx)
    }

    /// Creates a call nobody waits on.
    pub fn without_reply(call: RemoteCall, sender: Option<OwnerId>) -> Self {
        IncomingCall {
            call,
            sender,
            reply: None,
        }
    }

    /// Sends the handler's answer back to the caller. A caller that stopped
    /// waiting is not an error.
    pub fn respond(&mut self, reply: Reply) {
        if let Some(tx) = self.reply.take() {
            let _ = tx.send(reply);
        }
    }
}

/// Everything a connection can observe from the room.
#[derive(Debug)]
pub enum BusEvent {
    Call(IncomingCall),
    PeerJoined(OwnerId),
    PeerLeft(OwnerId),
    /// This client lost its own connection.
    Disconnected,
}

/// Options accepted when joining a room.
#[derive(Debug, Clone)]
pub struct JoinOptions {
    /// Capacity of the room; only applied by the member that creates it.
    pub max_players: usize,
    /// Deliver this client's own broadcasts back to it with no sender.
    pub echo_self: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        JoinOptions {
            max_players: 9,
            echo_self: false,
        }
    }
}

/// A joined room: the outgoing half and the incoming event stream.
pub struct Connection<B: Bus> {
    pub bus: B,
    pub events: mpsc::UnboundedReceiver<BusEvent>,
}

/// Outgoing half of a bus connection.
#[async_trait]
pub trait Bus: Send + Sync + 'static {
    /// Identity assigned to this connection.
    fn self_id(&self) -> &OwnerId;

    /// Whether this connection currently holds the privileged host role.
    fn is_host(&self) -> bool;

    /// Number of members in the room, including this one.
    fn member_count(&self) -> usize;

    /// Invokes a remote method.
    ///
    /// For [`CallTarget::Others`] this resolves with the first reply that is
    /// not [`Reply::Ok`], or with `Ok` once every recipient has answered or
    /// dropped the call. It resolves immediately when nobody else is present.
    async fn call(&self, call: RemoteCall, target: CallTarget) -> Result<Reply, BusError>;

    /// Leaves the room. Remaining members observe a peer departure.
    fn leave(&self);
}
