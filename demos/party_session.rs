//! A small party in one process.
//!
//! A canvas and three phones join the same room. The phones pick spots
//! around the collage, one of them gets turned away from an occupied spot,
//! and a late joiner catches up through the bootstrap sync.
//!
//! Run with: cargo run --example party_session

use std::time::Duration;

use marker_reservation::{
    ClaimOutcome, CoordinatorConfig, JoinOptions, LocalBus, LocalHub, ReservationEvent, Session,
    SlotId,
};

const ROOM: &str = "NUI-2026-PHOTOCOLLAGE";

fn print_table(name: &str, session: &Session<LocalBus>) {
    let engine = session.engine();
    println!("  {name} ({}) sees:", engine.self_id());
    for slot in SlotId::all() {
        let owner = engine
            .owner_of(slot)
            .map_or_else(|| "-".to_string(), |owner| owner.to_string());
        println!("    {:<14} {}", slot.position().label(), owner);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Party Session Example ===\n");

    let hub = LocalHub::new();
    let config = CoordinatorConfig::default().with_sync_delay(Duration::from_millis(100));

    let canvas = Session::start(hub.join(ROOM, JoinOptions::default())?, config.clone());
    let _log = canvas.engine().events().subscribe(|event| match event {
        ReservationEvent::SlotClaimed { slot_id, owner } => {
            println!("  [canvas] {owner} took {}", slot_id.position().label());
        }
        ReservationEvent::SlotReleased { slot_id, owner } => {
            println!("  [canvas] {owner} left {}", slot_id.position().label());
        }
        ReservationEvent::PresenceJoined { player_id } => {
            println!("  [canvas] {player_id} joined");
        }
        _ => {}
    });

    let alice = Session::start(hub.join(ROOM, JoinOptions::default())?, config.clone());
    let bob = Session::start(hub.join(ROOM, JoinOptions::default())?, config.clone());
    tokio::time::sleep(Duration::from_millis(200)).await;

    println!("\nAlice claims the top-left spot:");
    let outcome = alice.engine().claim(SlotId::new(0)?).await?;
    println!("  -> {outcome:?}");

    println!("\nBob tries the same spot:");
    match bob.engine().claim(SlotId::new(0)?).await? {
        ClaimOutcome::Claimed => println!("  -> claimed (unexpected)"),
        ClaimOutcome::Conflict { owner } => {
            println!("  -> refused, held by {owner:?}");
        }
    }

    println!("\nBob settles for bottom-right and confirms it:");
    let spot = SlotId::new(4)?;
    bob.engine().claim(spot).await?;
    bob.engine().confirm(spot)?;

    println!("\nCarol joins late and syncs:");
    let carol = Session::start(hub.join(ROOM, JoinOptions::default())?, config);
    tokio::time::sleep(Duration::from_millis(300)).await;
    print_table("Carol", &carol);

    println!("\nAlice moves to the right side:");
    alice.engine().claim(SlotId::new(3)?).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("\nBob drops out of the party:");
    bob.leave();
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("\n--- Final tables ---");
    print_table("Canvas", &canvas);
    print_table("Carol", &carol);

    if canvas.engine().reservations() == carol.engine().reservations() {
        println!("\n✓ Canvas and Carol agree on every spot");
    } else {
        println!("\n✗ Tables diverged");
    }

    println!("\n=== Example Complete ===");
    Ok(())
}
