//! Wire contract of the reservation protocol.
//!
//! Every remote call is a JSON object `{"method": "...", "payload": {...}}`
//! with camelCase payload fields. Replies are bare strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::reservation::types::{OwnerId, SlotId, SlotPosition};

/// A remote method invocation and its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "method",
    content = "payload",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum RemoteCall {
    /// Claim attempt. Peers answer `already-reserved` if they know another owner.
    MarkerReserved { slot_id: SlotId, timestamp: i64 },
    /// Release notice, honoured only when the sender is the recorded owner.
    MarkerReleased { slot_id: SlotId },
    /// Soft "I am at this spot" announcement.
    MarkerConfirmed {
        slot_id: SlotId,
        position: SlotPosition,
    },
    /// The sender is stepping away from their confirmed spot.
    MarkerCancelled {},
    /// Bootstrap pull from a newly joined client.
    SyncReservationsRequest {},
    /// Bootstrap snapshot pushed back to the requester.
    SyncReservationsResponse {
        reserved_markers: BTreeMap<SlotId, OwnerId>,
    },
    ImageSent {
        image_data: String,
        position: SlotPosition,
        timestamp: i64,
    },
    /// Forced eviction issued by the room host.
    KickPlayerRpc { player_id: OwnerId },
}

impl RemoteCall {
    /// Method name as it appears on the wire.
    pub fn method(&self) -> &'static str {
        match self {
            RemoteCall::MarkerReserved { .. } => "marker-reserved",
            RemoteCall::MarkerReleased { .. } => "marker-released",
            RemoteCall::MarkerConfirmed { .. } => "marker-confirmed",
            RemoteCall::MarkerCancelled {} => "marker-cancelled",
            RemoteCall::SyncReservationsRequest {} => "sync-reservations-request",
            RemoteCall::SyncReservationsResponse { .. } => "sync-reservations-response",
            RemoteCall::ImageSent { .. } => "image-sent",
            RemoteCall::KickPlayerRpc { .. } => "kick-player-rpc",
        }
    }
}

/// A handler's answer to a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reply {
    Ok,
    AlreadyReserved,
}
