//! Main entry point for the marker reservation playground server.
//!
//! This binary hosts player sessions on an in-process room and exposes them
//! over HTTP using the Axum web framework.

use tracing::info;
use tracing_subscriber::EnvFilter;

use marker_reservation::ServerConfig;
use marker_reservation::server::{Playground, create_router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    let addr = config.bind_addr;

    info!("Starting marker reservation playground...");
    info!(room = %config.room_code, max_players = config.max_players, "room settings");

    let app = create_router(Playground::new(config));

    info!("Server listening on http://{}", addr);
    info!("Available endpoints:");
    info!("  GET    /health                      - Health check");
    info!("  POST   /players                     - Join a new player");
    info!("  DELETE /players/:id                 - Player leaves");
    info!("  GET    /players/:id/reservations    - Player's replica");
    info!("  POST   /players/:id/claim/:slot     - Claim a slot");
    info!("  POST   /players/:id/release/:slot   - Release a slot");
    info!("  POST   /players/:id/confirm/:slot   - Confirm position");
    info!("  POST   /players/:id/cancel          - Step away");
    info!("  POST   /players/:id/kick/:target    - Host kicks a player");
    info!("  GET    /players/:id/ws              - Event stream");

    // Run the server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
