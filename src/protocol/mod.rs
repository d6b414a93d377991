//! Wire protocol: streaming frame definitions, shared data model, error
//! codes, and the minimal move/FEN handling the server performs.

pub mod error_codes;
pub mod messages;
pub mod moves;
pub mod types;

pub use error_codes::{close_codes, ErrorCode};

pub use messages::{
    ClientFrame, GameEndedPayload, MoveBroadcastPayload, ReadyPayload, ServerFrame,
    SpectatorStatePayload,
};

pub use moves::{flip_fen_turn, parse_uci, MoveParseError, UciMove};

pub use types::{
    ClockSnapshot, ColorPreference, EloRatingChange, GameEndReason, GameId, GameMode, GameMove,
    GameResult, GameState, GameStatus, LobbyId, LobbySettings, LobbyState, LobbyStatus,
    MatchHistoryData, MatchPlayerSnapshot, MatchType, MoveRecord, PendingMatch, PlayerColor,
    PlayerDescriptor, PlayerId, PlayerPublicInfo, QueueEntry, SpectatorId, SpectatorInfo,
    STARTING_FEN,
};
