use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for game rooms
pub type GameId = Uuid;
/// Unique identifier for lobbies
pub type LobbyId = Uuid;
/// Unique identifier for spectator connections
pub type SpectatorId = Uuid;

/// Stable player identifier issued by the (external) account system.
/// Opaque to the core; never parsed.
pub type PlayerId = String;

/// Time control preset for a match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Bullet,
    Blitz,
    Rapid,
    Classical,
}

impl GameMode {
    /// Initial time per side, in milliseconds.
    #[must_use]
    pub const fn initial_time_ms(self) -> u64 {
        match self {
            Self::Bullet => 60_000,
            Self::Blitz => 180_000,
            Self::Rapid => 600_000,
            Self::Classical => 1_800_000,
        }
    }

    /// Increment credited to the mover after each move, in milliseconds.
    #[must_use]
    pub const fn increment_ms(self) -> u64 {
        match self {
            Self::Bullet => 0,
            Self::Blitz => 1_000,
            Self::Rapid => 5_000,
            Self::Classical => 10_000,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bullet => "bullet",
            Self::Blitz => "blitz",
            Self::Rapid => "rapid",
            Self::Classical => "classical",
        }
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bullet" => Ok(Self::Bullet),
            "blitz" => Ok(Self::Blitz),
            "rapid" => Ok(Self::Rapid),
            "classical" => Ok(Self::Classical),
            other => Err(format!("unknown game mode '{other}'")),
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a game room. Transitions are one-way:
/// waiting -> ready -> playing -> finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    #[default]
    Waiting,
    Ready,
    Playing,
    Finished,
}

impl GameStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished)
    }
}

/// Board side. White always moves first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlayerColor {
    White,
    Black,
}

impl PlayerColor {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }
}

impl FromStr for PlayerColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" | "w" => Ok(Self::White),
            "black" | "b" => Ok(Self::Black),
            other => Err(format!("unknown color '{other}'")),
        }
    }
}

impl fmt::Display for PlayerColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    WhiteWin,
    BlackWin,
    Draw,
}

impl GameResult {
    /// The winning side, if any.
    #[must_use]
    pub const fn winner(self) -> Option<PlayerColor> {
        match self {
            Self::WhiteWin => Some(PlayerColor::White),
            Self::BlackWin => Some(PlayerColor::Black),
            Self::Draw => None,
        }
    }

    /// Result where the given color wins.
    #[must_use]
    pub const fn win_for(color: PlayerColor) -> Self {
        match color {
            PlayerColor::White => Self::WhiteWin,
            PlayerColor::Black => Self::BlackWin,
        }
    }

    /// Score of this result from `color`'s perspective (1, 0.5, 0).
    #[must_use]
    pub fn score_for(self, color: PlayerColor) -> f64 {
        match self.winner() {
            Some(winner) if winner == color => 1.0,
            Some(_) => 0.0,
            None => 0.5,
        }
    }
}

impl FromStr for GameResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white_win" => Ok(Self::WhiteWin),
            "black_win" => Ok(Self::BlackWin),
            "draw" => Ok(Self::Draw),
            other => Err(format!("unknown game result '{other}'")),
        }
    }
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameEndReason {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    ThreefoldRepetition,
    FiftyMoveRule,
    Resignation,
    Timeout,
    OpponentAbandoned,
}

impl GameEndReason {
    /// Reasons a client may declare itself. Everything the server derives
    /// on its own (resignation, timeout, abandonment) is excluded.
    #[must_use]
    pub const fn is_client_declarable(self) -> bool {
        matches!(
            self,
            Self::Checkmate
                | Self::Stalemate
                | Self::InsufficientMaterial
                | Self::ThreefoldRepetition
                | Self::FiftyMoveRule
        )
    }
}

impl FromStr for GameEndReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "checkmate" => Ok(Self::Checkmate),
            "stalemate" => Ok(Self::Stalemate),
            "insufficient_material" => Ok(Self::InsufficientMaterial),
            "threefold_repetition" => Ok(Self::ThreefoldRepetition),
            "fifty_move_rule" => Ok(Self::FiftyMoveRule),
            "resignation" => Ok(Self::Resignation),
            "timeout" => Ok(Self::Timeout),
            "opponent_abandoned" => Ok(Self::OpponentAbandoned),
            other => Err(format!("unknown end reason '{other}'")),
        }
    }
}

/// Whether a match affects ratings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    #[default]
    Ranked,
    Friendly,
}

/// Public identity of a player as carried through matchmaking, lobbies,
/// and connection URLs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerDescriptor {
    pub player_id: PlayerId,
    pub display_name: String,
    pub rating: i32,
    pub is_provisional: bool,
}

/// What a participant sees of a player in ready-state and spectator
/// snapshots. Connection handles never leave the room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerPublicInfo {
    pub player_id: PlayerId,
    pub display_name: String,
    pub rating: i32,
    pub is_provisional: bool,
    pub color: PlayerColor,
    pub connected: bool,
    pub ready: bool,
}

/// Information about a spectator watching a game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectatorInfo {
    pub id: SpectatorId,
    pub display_name: String,
    pub connected_at: DateTime<Utc>,
}

/// One move as stored on the game state (square pair plus promotion).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameMove {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<char>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only move history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRecord {
    pub uci: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub san: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub made_by: PlayerColor,
}

/// The authoritative (client-trusted) game state. The FEN is opaque to
/// the server; only its side-to-move field is ever touched.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GameState {
    pub fen: String,
    pub moves: Vec<GameMove>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GameResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_reason: Option<GameEndReason>,
}

/// Standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

impl GameState {
    #[must_use]
    pub fn at_start() -> Self {
        Self {
            fen: STARTING_FEN.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from_fen(fen: impl Into<String>) -> Self {
        Self {
            fen: fen.into(),
            ..Self::default()
        }
    }
}

/// Wire-level view of the game clock. Remaining time is signed: the tick
/// loop may observe a small overshoot below zero before flagging.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClockSnapshot {
    pub white_remaining_ms: i64,
    pub black_remaining_ms: i64,
    pub white_increment_ms: u64,
    pub black_increment_ms: u64,
    pub current_turn: PlayerColor,
}

/// Rating delta for one player, included in `game_ended`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EloRatingChange {
    pub player_id: PlayerId,
    pub old_rating: i32,
    pub new_rating: i32,
    pub change: i32,
    pub was_provisional: bool,
    pub is_provisional: bool,
}

impl EloRatingChange {
    /// A delta of zero that leaves the player untouched (unrated games,
    /// missing player records at settlement).
    #[must_use]
    pub fn unchanged(player_id: PlayerId, rating: i32, provisional: bool) -> Self {
        Self {
            player_id,
            old_rating: rating,
            new_rating: rating,
            change: 0,
            was_provisional: provisional,
            is_provisional: provisional,
        }
    }
}

/// Per-color rating snapshot captured when the match started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchPlayerSnapshot {
    pub player_id: PlayerId,
    pub display_name: String,
    pub rating_at_start: i32,
    pub provisional_at_start: bool,
}

/// Durable record of a finished match, written per player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchHistoryData {
    pub match_id: GameId,
    pub white: MatchPlayerSnapshot,
    pub black: MatchPlayerSnapshot,
    pub game_mode: GameMode,
    pub match_type: MatchType,
    pub result: GameResult,
    pub result_reason: GameEndReason,
    pub move_history: Vec<MoveRecord>,
    pub final_fen: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pgn: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opening_name: Option<String>,
    pub white_elo_change: EloRatingChange,
    pub black_elo_change: EloRatingChange,
}

/// One waiting player in the matchmaking queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub player_id: PlayerId,
    pub display_name: String,
    pub rating: i32,
    pub is_provisional: bool,
    pub game_mode: GameMode,
    pub joined_at: DateTime<Utc>,
    /// Dynamic window bounds recomputed on every pass.
    pub min_rating: i32,
    pub max_rating: i32,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// The second half of a pairing, parked until that player polls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMatch {
    pub player_id: PlayerId,
    pub game_id: GameId,
    pub connection_url: String,
    pub color: PlayerColor,
    pub opponent: PlayerDescriptor,
    pub game_mode: GameMode,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Which color the lobby creator wants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorPreference {
    White,
    Black,
    #[default]
    Random,
}

/// Creator-chosen lobby options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbySettings {
    #[serde(default)]
    pub player_color: ColorPreference,
    pub game_mode: GameMode,
    #[serde(default)]
    pub private: bool,
    #[serde(default = "default_true")]
    pub allow_spectators: bool,
    #[serde(default)]
    pub max_spectators: Option<u32>,
    #[serde(default = "default_true")]
    pub is_unrated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_fen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_code: Option<String>,
}

const fn default_true() -> bool {
    true
}

/// Lifecycle state of a lobby.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LobbyStatus {
    #[default]
    Waiting,
    Matched,
    Cancelled,
}

/// Full lobby record, persisted on every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyState {
    pub lobby_id: LobbyId,
    pub creator: PlayerDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opponent: Option<PlayerDescriptor>,
    pub settings: LobbySettings,
    pub status: LobbyStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_room_id: Option<GameId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_mode_clock_defaults() {
        assert_eq!(GameMode::Bullet.initial_time_ms(), 60_000);
        assert_eq!(GameMode::Bullet.increment_ms(), 0);
        assert_eq!(GameMode::Blitz.initial_time_ms(), 180_000);
        assert_eq!(GameMode::Blitz.increment_ms(), 1_000);
        assert_eq!(GameMode::Rapid.initial_time_ms(), 600_000);
        assert_eq!(GameMode::Rapid.increment_ms(), 5_000);
        assert_eq!(GameMode::Classical.initial_time_ms(), 1_800_000);
        assert_eq!(GameMode::Classical.increment_ms(), 10_000);
    }

    #[test]
    fn color_opposite_round_trips() {
        assert_eq!(PlayerColor::White.opposite(), PlayerColor::Black);
        assert_eq!(PlayerColor::Black.opposite().opposite(), PlayerColor::Black);
    }

    #[test]
    fn result_scores() {
        assert_eq!(GameResult::WhiteWin.score_for(PlayerColor::White), 1.0);
        assert_eq!(GameResult::WhiteWin.score_for(PlayerColor::Black), 0.0);
        assert_eq!(GameResult::Draw.score_for(PlayerColor::Black), 0.5);
    }

    #[test]
    fn client_declarable_reasons() {
        assert!(GameEndReason::Checkmate.is_client_declarable());
        assert!(GameEndReason::FiftyMoveRule.is_client_declarable());
        assert!(!GameEndReason::Timeout.is_client_declarable());
        assert!(!GameEndReason::OpponentAbandoned.is_client_declarable());
    }

    #[test]
    fn end_reason_parses_wire_names() {
        assert_eq!(
            "insufficient_material".parse::<GameEndReason>(),
            Ok(GameEndReason::InsufficientMaterial)
        );
        assert!("brilliant_sacrifice".parse::<GameEndReason>().is_err());
    }

    #[test]
    fn game_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&GameStatus::Playing).unwrap(),
            "\"playing\""
        );
        assert_eq!(
            serde_json::to_string(&GameResult::WhiteWin).unwrap(),
            "\"white_win\""
        );
    }
}
