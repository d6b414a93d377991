use serde::{Deserialize, Serialize};

/// Error codes surfaced to participants in `error` frames.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Move preconditions; reply to sender only, no state mutation
    InvalidMoveFormat,
    NotYourTurn,
    GameNotPlaying,

    // Client declared an unknown terminal result or reason
    InvalidGameEnd,

    // Chat passthrough from the external chat subsystem
    #[serde(rename = "USER_BANNED")]
    UserBanned,
    #[serde(rename = "USER_MUTED")]
    UserMuted,
    ChatTooLong,

    // Frame-level problems
    InvalidFrame,

    // Server faults
    InternalError,
}

impl ErrorCode {
    /// Human-readable default message for this code.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::InvalidMoveFormat => {
                "The move is not valid UCI (expected from-square, to-square, optional promotion)."
            }
            Self::NotYourTurn => "It is not your turn to move.",
            Self::GameNotPlaying => "The game is not in progress.",
            Self::InvalidGameEnd => "Unknown game result or end reason.",
            Self::UserBanned => "You are banned from chat.",
            Self::UserMuted => "You are muted.",
            Self::ChatTooLong => "Chat messages are limited to 500 characters.",
            Self::InvalidFrame => "The frame could not be understood.",
            Self::InternalError => "An internal server error occurred.",
        }
    }
}

/// WebSocket close codes used by the core.
pub mod close_codes {
    /// No pong (or any other frame) within the heartbeat window.
    pub const HEARTBEAT_TIMEOUT: u16 = 1001;
    /// Policy rejection: missing player id, unknown room, third player.
    pub const POLICY_ERROR: u16 = 1002;
    /// Capacity rejection: spectator cap, unauthorised lobby participant.
    pub const CAPACITY_EXCEEDED: u16 = 1008;
}
