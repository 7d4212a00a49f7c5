// Server configuration.
//
// `ServerConfig` is loaded from JSON (every field optional, missing fields
// take the defaults below) and can be overridden from the command line in
// `main.rs`. Durations are stored as milliseconds so the JSON stays plain.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tictactoe_protocol::LISTING_BLOCK_MAX;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to listen on.
    pub bind_address: String,
    /// Listen port. 0 lets the OS pick one.
    pub port: u16,
    /// How long a fresh connection may take to send its display name.
    pub handshake_timeout_ms: u64,
    /// How long a listing creator waits for an opponent before the listing
    /// is discarded. `None` waits forever.
    pub listing_wait_timeout_ms: Option<u64>,
    /// Byte cap for the lobby browse block.
    pub listing_block_max: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".into(),
            port: 7878,
            handshake_timeout_ms: 5000,
            listing_wait_timeout_ms: None,
            listing_block_max: LISTING_BLOCK_MAX,
        }
    }
}

impl ServerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn listing_wait_timeout(&self) -> Option<Duration> {
        self.listing_wait_timeout_ms.map(Duration::from_millis)
    }
}
