//! Runtime configuration.
//!
//! Values come from `MARKER_*` environment variables and fall back to the
//! defaults the party setup uses: one tablet plus eight phones in a single
//! fixed room.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_ROOM_CODE: &str = "NUI-2026-PHOTOCOLLAGE";
pub const DEFAULT_MAX_PLAYERS: usize = 9;

/// Protocol timing for one coordinator session.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Upper bound on a claim round-trip; on expiry the claim fails open.
    pub claim_timeout: Duration,
    /// Delay between joining and broadcasting the bootstrap sync request.
    pub sync_delay: Duration,
    /// How long departed identities are remembered.
    pub tombstone_retention: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            claim_timeout: Duration::from_millis(3000),
            sync_delay: Duration::from_millis(300),
            tombstone_retention: Duration::from_secs(600),
        }
    }
}

impl CoordinatorConfig {
    pub fn with_claim_timeout(mut self, timeout: Duration) -> Self {
        self.claim_timeout = timeout;
        self
    }

    pub fn with_sync_delay(mut self, delay: Duration) -> Self {
        self.sync_delay = delay;
        self
    }

    pub fn with_tombstone_retention(mut self, retention: Duration) -> Self {
        self.tombstone_retention = retention;
        self
    }
}

/// Settings for the playground server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub room_code: String,
    pub max_players: usize,
    pub coordinator: CoordinatorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            room_code: DEFAULT_ROOM_CODE.to_string(),
            max_players: DEFAULT_MAX_PLAYERS,
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServerConfig::default();

        if let Some(value) = lookup("MARKER_BIND_ADDR") {
            config.bind_addr = parse("MARKER_BIND_ADDR", &value)?;
        }
        if let Some(value) = lookup("MARKER_ROOM_CODE") {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key: "MARKER_ROOM_CODE",
                    value,
                });
            }
            config.room_code = value;
        }
        if let Some(value) = lookup("MARKER_MAX_PLAYERS") {
            config.max_players = parse("MARKER_MAX_PLAYERS", &value)?;
        }
        if let Some(value) = lookup("MARKER_CLAIM_TIMEOUT_MS") {
            let millis: u64 = parse("MARKER_CLAIM_TIMEOUT_MS", &value)?;
            config.coordinator.claim_timeout = Duration::from_millis(millis);
        }
        if let Some(value) = lookup("MARKER_SYNC_DELAY_MS") {
            let millis: u64 = parse("MARKER_SYNC_DELAY_MS", &value)?;
            config.coordinator.sync_delay = Duration::from_millis(millis);
        }
        if let Some(value) = lookup("MARKER_TOMBSTONE_RETENTION_SECS") {
            let secs: u64 = parse("MARKER_TOMBSTONE_RETENTION_SECS", &value)?;
            config.coordinator.tombstone_retention = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}
