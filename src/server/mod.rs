//! Playground web server.
//!
//! Hosts several coordinator sessions on an in-process room and exposes them
//! over HTTP and WebSocket so the protocol can be exercised from a browser.

pub mod playground;
pub mod routes;
pub mod websocket;

// Re-export main server functionality
pub use playground::{AppState, Playground};
pub use routes::create_router;
