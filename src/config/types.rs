//! Root configuration struct and per-subsystem sections.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::defaults::{
    default_abandonment_timeout_ms, default_clock_tick_interval_ms, default_cors_origins,
    default_heartbeat_interval_secs, default_heartbeat_timeout_secs, default_lobby_timeout_secs,
    default_max_chat_length, default_max_spectators, default_pending_match_ttl_secs,
    default_port, default_public_base_url, default_queue_ttl_secs,
};
use super::logging::LoggingConfig;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port the HTTP/WebSocket listener binds
    #[serde(default = "default_port")]
    pub port: u16,
    /// Comma-separated CORS origins, or "*"
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
    /// Base URL embedded in connection URLs handed to clients
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub matchmaking: MatchmakingConfig,
    #[serde(default)]
    pub lobby: LobbyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            cors_origins: default_cors_origins(),
            public_base_url: default_public_base_url(),
            game: GameConfig::default(),
            matchmaking: MatchmakingConfig::default(),
            lobby: LobbyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Game-room timer and capacity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Clock tick cadence while a game is playing
    #[serde(default = "default_clock_tick_interval_ms")]
    pub clock_tick_interval_ms: u64,
    /// How long a disconnected player may stay away mid-game
    #[serde(default = "default_abandonment_timeout_ms")]
    pub abandonment_timeout_ms: u64,
    /// Ping cadence for connected players
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Silence threshold after which a connection is force-closed
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
    /// Spectator cap per room
    #[serde(default = "default_max_spectators")]
    pub max_spectators: usize,
    /// Maximum relayed chat message length
    #[serde(default = "default_max_chat_length")]
    pub max_chat_length: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            clock_tick_interval_ms: default_clock_tick_interval_ms(),
            abandonment_timeout_ms: default_abandonment_timeout_ms(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            max_spectators: default_max_spectators(),
            max_chat_length: default_max_chat_length(),
        }
    }
}

impl GameConfig {
    #[must_use]
    pub fn clock_tick_interval(&self) -> Duration {
        Duration::from_millis(self.clock_tick_interval_ms)
    }

    #[must_use]
    pub fn abandonment_timeout(&self) -> Duration {
        Duration::from_millis(self.abandonment_timeout_ms)
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

/// Matchmaking queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchmakingConfig {
    /// Queue entry lifetime
    #[serde(default = "default_queue_ttl_secs")]
    pub queue_ttl_secs: i64,
    /// How long the second half of a pairing waits to be collected
    #[serde(default = "default_pending_match_ttl_secs")]
    pub pending_match_ttl_secs: i64,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            queue_ttl_secs: default_queue_ttl_secs(),
            pending_match_ttl_secs: default_pending_match_ttl_secs(),
        }
    }
}

/// Lobby settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyConfig {
    /// How long a lobby waits for a joiner before cancelling itself
    #[serde(default = "default_lobby_timeout_secs")]
    pub waiting_timeout_secs: u64,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            waiting_timeout_secs: default_lobby_timeout_secs(),
        }
    }
}

impl LobbyConfig {
    #[must_use]
    pub fn waiting_timeout(&self) -> Duration {
        Duration::from_secs(self.waiting_timeout_secs)
    }
}
