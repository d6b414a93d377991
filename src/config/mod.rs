//! Configuration module.
//!
//! Supports JSON configuration files, `ARBITER__`-prefixed environment
//! variable overrides with `__` nesting, and compiled-in defaults.

mod defaults;
pub mod loader;
pub mod logging;
pub mod types;

pub use loader::load;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use types::{Config, GameConfig, LobbyConfig, MatchmakingConfig};
