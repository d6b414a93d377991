use serde::{Deserialize, Serialize};

use super::error_codes::ErrorCode;
use super::types::{
    ClockSnapshot, EloRatingChange, GameId, GameMode, GameResult, GameState, GameStatus,
    MatchHistoryData, MoveRecord, PlayerColor, PlayerPublicInfo,
};

/// Frames sent from a participant to the server over the streaming channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Heartbeat from the client
    Ping,
    /// Response to a server `ping`
    Pong,
    /// Play a move. The server trusts the client-computed FEN when given.
    Move {
        /// UCI encoding: from-square, to-square, optional promotion letter
        uci: String,
        /// Position after the move, as computed by the client
        #[serde(skip_serializing_if = "Option::is_none")]
        fen: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        san: Option<String>,
        /// Client-side id echoed back in the acknowledgement
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// Resign the game
    Resign,
    /// Chat message relayed to the opponent and spectators
    Chat { message: String },
    /// Signal readiness before both connections exist
    Ready,
    /// Client-declared terminal state. Result and reason arrive as raw
    /// strings so unknown values can answer `invalid_game_end` instead of
    /// failing frame parsing.
    GameEnd {
        result: String,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        fen: Option<String>,
    },
}

/// Ready-state snapshot sent to a player on admission and at game start.
/// Boxed in `ServerFrame` to keep the enum small.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub game_id: GameId,
    pub status: GameStatus,
    pub game_mode: GameMode,
    pub is_unrated: bool,
    pub game_state: GameState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock: Option<ClockSnapshot>,
    pub state_version: u64,
    pub you: PlayerPublicInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opponent: Option<PlayerPublicInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opening_name: Option<String>,
    pub spectator_count: usize,
}

/// Move broadcast payload. Boxed in `ServerFrame` to keep the enum small.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveBroadcastPayload {
    pub record: MoveRecord,
    pub game_state: GameState,
    pub clock: ClockSnapshot,
    pub state_version: u64,
}

/// Snapshot sent to a spectator on admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectatorStatePayload {
    pub game_id: GameId,
    pub status: GameStatus,
    pub game_mode: GameMode,
    pub game_state: GameState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock: Option<ClockSnapshot>,
    pub state_version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub white: Option<PlayerPublicInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub black: Option<PlayerPublicInfo>,
    pub spectator_count: usize,
}

/// Terminal settlement payload carried by `game_ended`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEndedPayload {
    pub result: GameResult,
    pub reason: super::types::GameEndReason,
    pub elo_changes: Vec<EloRatingChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_history: Option<MatchHistoryData>,
}

/// Frames sent from the server to a participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Initial state and opponent snapshot (boxed to reduce enum size)
    Ready(Box<ReadyPayload>),
    /// Both players connected and the clock is running
    GameStart {
        clock: ClockSnapshot,
        state_version: u64,
    },
    /// A move was played (boxed to reduce enum size)
    Move(Box<MoveBroadcastPayload>),
    /// Periodic clock broadcast while playing
    ClockUpdate { clock: ClockSnapshot },
    /// The opponent connected or disconnected
    OpponentStatus {
        connected: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reconnect_timeout_ms: Option<u64>,
    },
    /// Per-client acknowledgement of a move that carried a message id
    Ack { message_id: String, state_version: u64 },
    /// The opponent resigned; `game_ended` follows
    Resign {
        resigned_by: PlayerColor,
        outcome: GameResult,
    },
    /// Relayed chat message
    Chat {
        from: super::types::PlayerId,
        display_name: String,
        message: String,
    },
    /// The opponent signalled readiness
    OpponentReady,
    /// Waiting for the opponent to connect
    Waiting { message: String },
    /// Server heartbeat
    Ping,
    /// Response to a client `ping`
    Pong,
    /// Spectator headcount changed
    SpectatorCount { count: usize },
    /// Snapshot for a newly admitted spectator (boxed to reduce enum size)
    SpectatorState(Box<SpectatorStatePayload>),
    /// Terminal settlement (boxed to reduce enum size); always the last
    /// frame a participant receives from the room
    GameEnded(Box<GameEndedPayload>),
    /// Legacy free-text notification kept for older clients
    System { message: String },
    /// Error surfaced to the offending participant only
    Error { code: ErrorCode, message: String },
}
