//! WebSocket event stream for one hosted player.
//!
//! On connect the client receives a snapshot of the player's replica, then
//! every [`ReservationEvent`] as it is published. The client may also send
//! commands (claim, release, confirm, cancel) and receives a result message
//! for each.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::bus::LocalBus;
use crate::reservation::{
    ClaimOutcome, OwnerId, ReservationEngine, ReservationEvent, SlotId, Subscription,
};
use crate::server::playground::AppState;
use crate::server::routes::{ApiError, player_engine};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Commands a client may send over the socket.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    Claim { slot_id: SlotId },
    Release { slot_id: SlotId },
    Confirm { slot_id: SlotId },
    Cancel,
}

/// Messages sent to the client besides forwarded events.
#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Snapshot {
        player_id: OwnerId,
        reservations: BTreeMap<SlotId, OwnerId>,
    },
    ClaimResult {
        slot_id: SlotId,
        claimed: bool,
        owner: Option<OwnerId>,
    },
    ReleaseResult {
        slot_id: SlotId,
        released: bool,
    },
    Error {
        message: String,
    },
}

/// WebSocket connection handler for a player's event stream
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let engine = player_engine(&state, &id)?;
    Ok(ws.on_upgrade(move |socket| EventStreamSession::new(socket, engine).handle()))
}

pub struct EventStreamSession {
    socket: WebSocket,
    engine: Arc<ReservationEngine<LocalBus>>,
    events: mpsc::UnboundedReceiver<ReservationEvent>,
    _subscription: Subscription,
}

impl EventStreamSession {
    pub fn new(socket: WebSocket, engine: Arc<ReservationEngine<LocalBus>>) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let subscription = engine.events().subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        EventStreamSession {
            socket,
            engine,
            events,
            _subscription: subscription,
        }
    }

    /// Handle the WebSocket connection lifecycle
    pub async fn handle(mut self) {
        let player = self.engine.self_id().clone();
        info!(player = %player, "event stream established");

        let snapshot = ServerMessage::Snapshot {
            player_id: player.clone(),
            reservations: self.engine.reservations(),
        };
        if let Err(e) = self.send_json(&snapshot).await {
            error!(player = %player, error = %e, "failed to send snapshot");
            return;
        }

        loop {
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    if let Err(e) = self.send_json(&event).await {
                        warn!(player = %player, error = %e, "failed to forward event");
                        break;
                    }
                }
                msg = self.socket.recv() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_text_message(&text).await {
                                error!(player = %player, error = %e, "error handling message");
                                break;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if self.socket.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!(player = %player, "event stream closed by client");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(player = %player, error = %e, "websocket error");
                            break;
                        }
                    }
                }
            }
        }

        info!(player = %player, "event stream ended");
    }

    async fn handle_text_message(&mut self, text: &str) -> Result<(), BoxError> {
        let command = match serde_json::from_str::<ClientCommand>(text) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "failed to parse command");
                // Parse errors do not end the stream.
                let reply = ServerMessage::Error {
                    message: e.to_string(),
                };
                return self.send_json(&reply).await;
            }
        };

        let reply = match command {
            ClientCommand::Claim { slot_id } => match self.engine.claim(slot_id).await {
                Ok(ClaimOutcome::Claimed) => ServerMessage::ClaimResult {
                    slot_id,
                    claimed: true,
                    owner: Some(self.engine.self_id().clone()),
                },
                Ok(ClaimOutcome::Conflict { owner }) => ServerMessage::ClaimResult {
                    slot_id,
                    claimed: false,
                    owner,
                },
                Err(e) => error_message(e),
            },
            ClientCommand::Release { slot_id } => match self.engine.release(slot_id) {
                Ok(released) => ServerMessage::ReleaseResult { slot_id, released },
                Err(e) => error_message(e),
            },
            ClientCommand::Confirm { slot_id } => match self.engine.confirm(slot_id) {
                Ok(()) => return Ok(()),
                Err(e) => error_message(e),
            },
            ClientCommand::Cancel => match self.engine.cancel() {
                Ok(_) => return Ok(()),
                Err(e) => error_message(e),
            },
        };
        self.send_json(&reply).await
    }

    async fn send_json<T: Serialize>(&mut self, message: &T) -> Result<(), BoxError> {
        let json = serde_json::to_string(message)?;
        self.socket.send(Message::Text(json)).await?;
        Ok(())
    }
}

fn error_message(error: impl std::fmt::Display) -> ServerMessage {
    ServerMessage::Error {
        message: error.to_string(),
    }
}
