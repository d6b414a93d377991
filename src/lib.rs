#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Arbiter Server
//!
//! The authoritative real-time game server for a chess platform: game
//! rooms with turn/clock enforcement and reconnect handling, lobbies,
//! an ELO-widening matchmaking queue, and durable match settlement.
//!
//! Chess rule validation is delegated to clients; the server enforces
//! turns, clocks, and lifecycle, and trusts reported positions.

/// Server configuration and environment variables
pub mod config;

/// Game room actors: match lifecycle, clocks, settlement
pub mod game;

/// Lobby actors and the external lobby-list seam
pub mod lobby;

/// Structured logging configuration
pub mod logging;

/// Global matchmaking queue
pub mod matchmaker;

/// Streaming frame and data-model definitions
pub mod protocol;

/// External document-store seam
pub mod store;

/// WebSocket connection handling and HTTP routes
pub mod websocket;
