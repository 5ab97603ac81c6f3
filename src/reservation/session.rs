//! Coordinator session lifecycle.
//!
//! A [`Session`] owns one client's protocol engine and the run loop that
//! drains its bus connection. The run loop applies one event at a time, each
//! to completion, so handlers never interleave. Dropping the session leaves
//! the room.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::{Bus, BusEvent, Connection};
use crate::config::CoordinatorConfig;
use crate::reservation::engine::ReservationEngine;
use crate::reservation::state::CoordinatorState;

pub struct Session<B: Bus> {
    engine: Arc<ReservationEngine<B>>,
    run_loop: JoinHandle<()>,
    bootstrap: JoinHandle<()>,
}

impl<B: Bus> Session<B> {
    /// Starts the run loop on a joined connection and schedules the bootstrap
    /// sync request after `config.sync_delay`.
    pub fn start(connection: Connection<B>, config: CoordinatorConfig) -> Self {
        let Connection { bus, events } = connection;
        let state = CoordinatorState::new(bus.self_id().clone());
        let sync_delay = config.sync_delay;
        let engine = Arc::new(ReservationEngine::new(state, Arc::new(bus), config));

        let run_loop = tokio::spawn(run(Arc::clone(&engine), events));
        let bootstrap = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move {
                tokio::time::sleep(sync_delay).await;
                if let Err(err) = engine.request_sync() {
                    warn!(error = %err, "skipping reservation sync");
                }
            }
        });

        Session {
            engine,
            run_loop,
            bootstrap,
        }
    }

    pub fn engine(&self) -> &Arc<ReservationEngine<B>> {
        &self.engine
    }

    /// Whether the run loop is still draining events.
    pub fn is_running(&self) -> bool {
        !self.run_loop.is_finished()
    }

    /// Leaves the room and stops the session.
    pub fn leave(self) {
        drop(self);
    }
}

impl<B: Bus> Drop for Session<B> {
    fn drop(&mut self) {
        self.engine.leave();
        self.bootstrap.abort();
        self.run_loop.abort();
    }
}

async fn run<B: Bus>(engine: Arc<ReservationEngine<B>>, mut events: mpsc::UnboundedReceiver<BusEvent>) {
    while let Some(event) = events.recv().await {
        if !engine.handle_event(event) {
            break;
        }
    }
    debug!(me = %engine.self_id(), "session run loop finished");
}
