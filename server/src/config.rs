//! Runtime configuration for the arena server.

use shared::{DEFAULT_MAX_PLAYERS, DEFAULT_TICK_RATE};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("tick rate must be at least 1 Hz")]
    ZeroTickRate,
    #[error("player cap must be at least 1")]
    ZeroPlayerCap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Interface to bind the listener on
    pub host: String,
    /// TCP port to listen on; 0 picks a free port
    pub port: u16,
    /// Broadcast and simulation cadence in Hz
    pub tick_rate: u32,
    /// Admission cap checked when a connection is accepted
    pub max_players: usize,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port,
            tick_rate: DEFAULT_TICK_RATE,
            max_players: DEFAULT_MAX_PLAYERS,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.max_players == 0 {
            return Err(ConfigError::ZeroPlayerCap);
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }
}
