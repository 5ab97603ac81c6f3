//! Shared state of the playground server.
//!
//! The playground hosts many coordinator sessions in one process, all joined
//! to the same in-process room, so the protocol can be driven over HTTP.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::bus::{Bus, JoinOptions, LocalBus, LocalHub};
use crate::config::ServerConfig;
use crate::error::BusError;
use crate::reservation::{OwnerId, ReservationEngine, Session};

/// Shared application state
pub type AppState = Arc<Playground>;

pub struct Playground {
    hub: Arc<LocalHub>,
    config: ServerConfig,
    sessions: RwLock<HashMap<OwnerId, Session<LocalBus>>>,
}

impl Playground {
    pub fn new(config: ServerConfig) -> AppState {
        Arc::new(Playground {
            hub: LocalHub::new(),
            config,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn hub(&self) -> &Arc<LocalHub> {
        &self.hub
    }

    /// Joins a new player to the room and starts its session.
    pub fn join_player(&self) -> Result<Arc<ReservationEngine<LocalBus>>, BusError> {
        let options = JoinOptions {
            max_players: self.config.max_players,
            ..JoinOptions::default()
        };
        let connection = self.hub.join(&self.config.room_code, options)?;
        let id = connection.bus.self_id().clone();
        let session = Session::start(connection, self.config.coordinator.clone());
        let engine = Arc::clone(session.engine());

        self.sessions.write().insert(id.clone(), session);
        info!(player = %id, "player session started");
        Ok(engine)
    }

    pub fn engine(&self, id: &OwnerId) -> Option<Arc<ReservationEngine<LocalBus>>> {
        self.sessions
            .read()
            .get(id)
            .map(|session| Arc::clone(session.engine()))
    }

    /// Ends a player's session. Remaining players observe the departure.
    pub fn remove_player(&self, id: &OwnerId) -> bool {
        let removed = self.sessions.write().remove(id);
        match removed {
            Some(session) => {
                session.leave();
                info!(player = %id, "player session ended");
                true
            }
            None => false,
        }
    }

    pub fn player_ids(&self) -> Vec<OwnerId> {
        let mut ids: Vec<OwnerId> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
