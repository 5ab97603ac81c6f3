//! # Marker Reservation
//!
//! Leaderless coordination of seat reservations for a party collage app.
//! Phones scan one of eight printed markers around a shared tablet canvas to
//! claim that seat; every client keeps its own replica of who sits where and
//! the replicas converge through best-effort broadcast calls.
//!
//! ## Features
//!
//! - **Leaderless**: no client holds the source of truth
//! - **Fail-open claims**: transport errors and timeouts never strand a player
//! - **Disconnect cascade**: a departing player's seat is freed exactly once
//! - **Bootstrap sync**: late joiners pull the current table from every peer
//!
//! ## Example
//!
//! ```rust,no_run
//! use marker_reservation::{CoordinatorConfig, JoinOptions, LocalHub, Session, SlotId};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = LocalHub::new();
//! let phone = Session::start(hub.join("party", JoinOptions::default())?, CoordinatorConfig::default());
//!
//! let outcome = phone.engine().claim(SlotId::new(3)?).await?;
//! println!("claimed: {}", outcome.is_claimed());
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod reservation;
pub mod server;

pub use bus::{Bus, BusEvent, CallTarget, Connection, FaultPlan, JoinOptions, LocalBus, LocalHub};
pub use bus::{RemoteCall, Reply};
pub use config::{CoordinatorConfig, ServerConfig};
pub use error::{BusError, ConfigError, CoordinatorError, SlotError};
pub use reservation::{ClaimOutcome, ReservationEngine, ReservationEvent, Session, Subscription};
pub use reservation::{ConnectionStatus, CoordinatorState, MergePolicy, ReplicaStore};
pub use reservation::{OwnerId, SLOT_COUNT, SlotId, SlotPosition};
