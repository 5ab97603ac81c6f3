//! Owner identity type.
//!
//! This module contains the definition of OwnerId, the opaque per-session
//! identifier the bus assigns to each connected client.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A unique identifier for each connected client (player or canvas).
///
/// The bus assigns one per connection and it stays stable until that connection
/// ends. It doubles as the reservation owner key and as the sender identity on
/// every remote call.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        OwnerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        OwnerId::new(id)
    }
}
