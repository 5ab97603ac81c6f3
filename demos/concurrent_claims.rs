//! Contention scenarios for the reservation protocol.
//!
//! This example showcases:
//! - Many phones racing for the same spot
//! - A full room filling the board in parallel
//! - Fail-open claims over a broken transport
//!
//! Run with: cargo run --example concurrent_claims

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use marker_reservation::{
    CoordinatorConfig, FaultPlan, JoinOptions, LocalBus, LocalHub, OwnerId, Session, SlotId,
};

const ROOM: &str = "contention";

fn start_room(
    hub: &Arc<LocalHub>,
    players: usize,
) -> Result<Vec<Session<LocalBus>>, Box<dyn std::error::Error>> {
    let config = CoordinatorConfig::default()
        .with_sync_delay(Duration::ZERO)
        .with_claim_timeout(Duration::from_millis(500));
    let mut sessions = Vec::with_capacity(players);
    for _ in 0..players {
        sessions.push(Session::start(hub.join(ROOM, JoinOptions::default())?, config.clone()));
    }
    Ok(sessions)
}

fn tables(sessions: &[Session<LocalBus>]) -> Vec<BTreeMap<SlotId, OwnerId>> {
    sessions.iter().map(|s| s.engine().reservations()).collect()
}

fn converged(sessions: &[Session<LocalBus>]) -> bool {
    let tables = tables(sessions);
    tables.windows(2).all(|pair| pair[0] == pair[1])
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Concurrent Claims Example ===\n");

    same_spot_race().await?;
    println!();

    fill_the_board().await?;
    println!();

    broken_transport().await?;

    println!("\n=== Example Complete ===");
    Ok(())
}

/// Every phone goes for the same spot at once
async fn same_spot_race() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Same Spot Race ---");

    let hub = LocalHub::new();
    let sessions = start_room(&hub, 8)?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Everyone sees the spot as free before the race.
    let target = SlotId::new(1)?;
    let start = Instant::now();
    let outcomes = join_all(sessions.iter().map(|s| s.engine().claim(target))).await;
    let winners = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Ok(o) if o.is_claimed()))
        .count();

    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("Race finished in {:?}", start.elapsed());
    println!("Phones reporting success: {winners}");
    println!("Owner on the first phone: {:?}", sessions[0].engine().owner_of(target));
    if converged(&sessions) {
        println!("✓ All replicas agree");
    } else {
        // Unaware simultaneous claims may diverge; see the docs on claim.
        println!("✗ Replicas diverged under a truly simultaneous race");
    }
    Ok(())
}

/// A full room picks distinct spots in parallel
async fn fill_the_board() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Fill the Board ---");

    let hub = LocalHub::new();
    let sessions = start_room(&hub, 9)?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let start = Instant::now();
    let claims = sessions
        .iter()
        .skip(1)
        .zip(SlotId::all())
        .map(|(session, slot)| session.engine().claim(slot));
    let outcomes = join_all(claims).await;
    let claimed = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Ok(o) if o.is_claimed()))
        .count();

    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("{claimed} of 8 spots claimed in {:?}", start.elapsed());
    println!(
        "Canvas sees {} occupied spots",
        sessions[0].engine().reservations().len()
    );
    println!("Converged: {}", converged(&sessions));

    println!("Two phones leave; their spots free up everywhere");
    let mut sessions = sessions;
    for session in sessions.split_off(7) {
        session.leave();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!(
        "Canvas now sees {} occupied spots",
        sessions[0].engine().reservations().len()
    );
    Ok(())
}

/// Claims still succeed locally when the transport refuses every call
async fn broken_transport() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Broken Transport ---");

    let hub = LocalHub::new();
    let sessions = start_room(&hub, 2)?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    hub.set_faults(FaultPlan {
        fail_calls: true,
        ..FaultPlan::default()
    });

    let slot = SlotId::new(7)?;
    let outcome = sessions[0].engine().claim(slot).await?;
    println!("Claim over a failing transport: {outcome:?}");
    println!("Local owner: {:?}", sessions[0].engine().owner_of(slot));
    println!("Peer owner:  {:?}", sessions[1].engine().owner_of(slot));

    hub.set_faults(FaultPlan::default());
    Ok(())
}
