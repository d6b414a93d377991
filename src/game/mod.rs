//! Game rooms.
//!
//! One [`GameRoom`] owns a single match end to end: player sessions,
//! spectators, the move/turn/clock invariants, disconnect timers, the
//! heartbeat loop, and end-of-game settlement. Every room runs as its own
//! tokio task consuming a command inbox, so all state mutations are
//! serialized; timers re-enter the same inbox instead of touching state
//! directly.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::lobby::directory::LobbyDirectory;
use crate::protocol::{
    close_codes, ClientFrame, ClockSnapshot, GameId, GameMode, GameState, GameStatus, LobbyId,
    MatchType, MoveRecord, PlayerColor, PlayerDescriptor, PlayerId, PlayerPublicInfo, ServerFrame,
    SpectatorId,
};
use crate::store::{paths, DocumentStore};

mod admission;
pub mod clock;
pub mod elo;
mod frames;
mod settlement;

use clock::ClockState;

/// Inbox depth per room; enough to absorb a burst of frames from both
/// players plus timer ticks without back-pressuring connections.
const ROOM_INBOX_CAPACITY: usize = 256;

/// Delivery to one participant's connection task.
#[derive(Debug, Clone)]
pub enum Outbound {
    Frame(Arc<ServerFrame>),
    /// Force-close the socket with the given close code.
    Close(u16),
}

pub type OutboundSender = mpsc::Sender<Outbound>;

/// Identifies the sender of inbound room traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantKey {
    Player(PlayerId),
    Spectator(SpectatorId),
}

/// How a connection wants to attach to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    Player,
    Spectator,
}

/// Parameters a streaming connection presents on admission (URL query).
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub player_id: Option<PlayerId>,
    pub display_name: Option<String>,
    pub rating: Option<i32>,
    pub is_provisional: bool,
    pub color: Option<PlayerColor>,
    pub mode: ConnectMode,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            player_id: None,
            display_name: None,
            rating: None,
            is_provisional: false,
            color: None,
            mode: ConnectMode::Player,
        }
    }
}

/// Admission rejection; each maps to a WebSocket close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("player id is required")]
    MissingPlayerId,
    #[error("spectator capacity reached")]
    SpectatorCapacity,
    #[error("game already has two players")]
    RoomFull,
    #[error("not a registered participant of this lobby game")]
    NotRegistered,
    #[error("game room is gone")]
    RoomClosed,
}

impl AdmissionError {
    #[must_use]
    pub const fn close_code(self) -> u16 {
        match self {
            Self::MissingPlayerId | Self::RoomFull | Self::RoomClosed => close_codes::POLICY_ERROR,
            Self::SpectatorCapacity | Self::NotRegistered => close_codes::CAPACITY_EXCEEDED,
        }
    }
}

/// Pre-seeded players for a lobby game, keyed by color.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedPlayers {
    #[serde(default)]
    pub white: Option<PlayerDescriptor>,
    #[serde(default)]
    pub black: Option<PlayerDescriptor>,
}

/// Payload of `POST /game/{id}/init` (lobby seeding).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRoomSeed {
    pub game_mode: GameMode,
    #[serde(default)]
    pub is_lobby_mode: bool,
    #[serde(default)]
    pub is_unrated: bool,
    #[serde(default)]
    pub lobby_id: Option<LobbyId>,
    #[serde(default)]
    pub opening_name: Option<String>,
    #[serde(default)]
    pub starting_fen: Option<String>,
    #[serde(default)]
    pub players: SeedPlayers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("game has already started")]
    AlreadyStarted,
    #[error("game room is gone")]
    RoomClosed,
}

/// Read-only view served by `GET /game/{id}/state`.
#[derive(Debug, Clone, Serialize)]
pub struct RoomStateView {
    pub id: GameId,
    pub status: GameStatus,
    pub game_mode: GameMode,
    pub match_type: MatchType,
    pub is_unrated: bool,
    pub state_version: u64,
    pub players: Vec<PlayerPublicInfo>,
    pub spectator_count: usize,
    pub game_state: GameState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock: Option<ClockSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lobby_id: Option<LobbyId>,
}

/// Durable room snapshot written after every authoritative mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RoomSnapshot {
    pub id: GameId,
    pub status: GameStatus,
    pub game_mode: GameMode,
    pub match_type: MatchType,
    pub is_unrated: bool,
    pub is_lobby_mode: bool,
    #[serde(default)]
    pub lobby_id: Option<LobbyId>,
    #[serde(default)]
    pub opening_name: Option<String>,
    pub state_version: u64,
    pub game_state: GameState,
    pub move_history: Vec<MoveRecord>,
    #[serde(default)]
    pub clock: Option<ClockSnapshot>,
    pub players: Vec<SnapshotPlayer>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Player metadata inside a [`RoomSnapshot`]; connection state is not
/// durable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SnapshotPlayer {
    pub player_id: PlayerId,
    pub display_name: String,
    pub rating: i32,
    pub is_provisional: bool,
    pub color: PlayerColor,
}

pub(crate) enum RoomCommand {
    Connect {
        params: ConnectParams,
        outbound: OutboundSender,
        reply: oneshot::Sender<Result<ParticipantKey, AdmissionError>>,
    },
    Frame {
        from: ParticipantKey,
        frame: ClientFrame,
    },
    Closed {
        from: ParticipantKey,
    },
    Init {
        seed: GameRoomSeed,
        reply: oneshot::Sender<Result<(), InitError>>,
    },
    State {
        reply: oneshot::Sender<RoomStateView>,
    },
    ClockTick,
    HeartbeatTick,
    AbandonmentElapsed {
        player_id: PlayerId,
        generation: u64,
    },
}

/// Cheap, cloneable address of a running room.
#[derive(Clone)]
pub struct GameRoomHandle {
    pub id: GameId,
    tx: mpsc::Sender<RoomCommand>,
}

impl GameRoomHandle {
    /// Admit a streaming connection. The returned key identifies the
    /// participant in subsequent `frame`/`closed` calls.
    pub async fn connect(
        &self,
        params: ConnectParams,
        outbound: OutboundSender,
    ) -> Result<ParticipantKey, AdmissionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RoomCommand::Connect {
                params,
                outbound,
                reply,
            })
            .await
            .map_err(|_| AdmissionError::RoomClosed)?;
        rx.await.map_err(|_| AdmissionError::RoomClosed)?
    }

    /// Seed the room from a lobby (`POST /init`).
    pub async fn init(&self, seed: GameRoomSeed) -> Result<(), InitError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RoomCommand::Init { seed, reply })
            .await
            .map_err(|_| InitError::RoomClosed)?;
        rx.await.map_err(|_| InitError::RoomClosed)?
    }

    /// Snapshot of the room for `GET /state`.
    pub async fn state(&self) -> Option<RoomStateView> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RoomCommand::State { reply }).await.ok()?;
        rx.await.ok()
    }

    /// Deliver an inbound frame from a participant.
    pub async fn frame(&self, from: ParticipantKey, frame: ClientFrame) {
        let _ = self.tx.send(RoomCommand::Frame { from, frame }).await;
    }

    /// Report a closed connection.
    pub async fn closed(&self, from: ParticipantKey) {
        let _ = self.tx.send(RoomCommand::Closed { from }).await;
    }
}

/// Shared services a room needs.
#[derive(Clone)]
pub(crate) struct RoomDeps {
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub lobby_list: Arc<dyn LobbyDirectory>,
}

/// A connected (or recently connected) player of one game.
pub(crate) struct PlayerSession {
    pub player_id: PlayerId,
    pub display_name: String,
    pub rating: i32,
    pub is_provisional: bool,
    pub color: PlayerColor,
    pub outbound: Option<OutboundSender>,
    pub last_seen: Instant,
    pub connected: bool,
    pub ready: bool,
}

impl PlayerSession {
    pub fn public_info(&self) -> PlayerPublicInfo {
        PlayerPublicInfo {
            player_id: self.player_id.clone(),
            display_name: self.display_name.clone(),
            rating: self.rating,
            is_provisional: self.is_provisional,
            color: self.color,
            connected: self.connected,
            ready: self.ready,
        }
    }
}

pub(crate) struct SpectatorSession {
    pub display_name: String,
    pub outbound: OutboundSender,
    pub connected_at: DateTime<Utc>,
}

/// The per-game actor. Only its own task touches these fields.
pub(crate) struct GameRoom {
    id: GameId,
    deps: RoomDeps,
    self_tx: mpsc::Sender<RoomCommand>,
    rooms: Arc<DashMap<GameId, GameRoomHandle>>,

    status: GameStatus,
    game_mode: GameMode,
    match_type: MatchType,
    is_unrated: bool,
    is_lobby_mode: bool,
    lobby_id: Option<LobbyId>,
    opening_name: Option<String>,

    players: HashMap<PlayerId, PlayerSession>,
    reserved: HashMap<PlayerColor, PlayerDescriptor>,
    spectators: HashMap<SpectatorId, SpectatorSession>,

    game_state: GameState,
    move_history: Vec<MoveRecord>,
    clock: Option<ClockState>,
    state_version: u64,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,

    clock_loop: Option<CancellationToken>,
    heartbeat_loop: CancellationToken,
    /// Monotone counter per player; an abandonment timer only fires if its
    /// captured generation is still current.
    abandon_generations: HashMap<PlayerId, u64>,
}

impl GameRoom {
    /// Spawn a fresh room and register its handle.
    pub fn spawn(
        id: GameId,
        game_mode: GameMode,
        match_type: MatchType,
        deps: RoomDeps,
        rooms: Arc<DashMap<GameId, GameRoomHandle>>,
    ) -> GameRoomHandle {
        let (tx, rx) = mpsc::channel(ROOM_INBOX_CAPACITY);
        let room = Self {
            id,
            deps,
            self_tx: tx.clone(),
            rooms: rooms.clone(),
            status: GameStatus::Waiting,
            game_mode,
            match_type,
            is_unrated: false,
            is_lobby_mode: false,
            lobby_id: None,
            opening_name: None,
            players: HashMap::new(),
            reserved: HashMap::new(),
            spectators: HashMap::new(),
            game_state: GameState::at_start(),
            move_history: Vec::new(),
            clock: None,
            state_version: 0,
            started_at: None,
            ended_at: None,
            clock_loop: None,
            heartbeat_loop: CancellationToken::new(),
            abandon_generations: HashMap::new(),
        };
        let handle = GameRoomHandle { id, tx };
        rooms.insert(id, handle.clone());
        room.start_heartbeat_loop();
        tokio::spawn(room.run(rx));
        handle
    }

    /// Re-spawn a room from its durable snapshot. Waiting/ready rooms come
    /// back waiting (players must reconnect); playing rooms resume with
    /// the persisted clock and a fresh tick loop.
    pub fn spawn_restored(
        snapshot: RoomSnapshot,
        deps: RoomDeps,
        rooms: Arc<DashMap<GameId, GameRoomHandle>>,
    ) -> GameRoomHandle {
        let (tx, rx) = mpsc::channel(ROOM_INBOX_CAPACITY);
        let status = match snapshot.status {
            GameStatus::Ready => GameStatus::Waiting,
            other => other,
        };
        let players = snapshot
            .players
            .into_iter()
            .map(|p| {
                (
                    p.player_id.clone(),
                    PlayerSession {
                        player_id: p.player_id,
                        display_name: p.display_name,
                        rating: p.rating,
                        is_provisional: p.is_provisional,
                        color: p.color,
                        outbound: None,
                        last_seen: Instant::now(),
                        connected: false,
                        ready: false,
                    },
                )
            })
            .collect();
        let clock = snapshot
            .clock
            .as_ref()
            .map(|snap| ClockState::from_snapshot(snap, Instant::now()));
        let mut room = Self {
            id: snapshot.id,
            deps,
            self_tx: tx.clone(),
            rooms: rooms.clone(),
            status,
            game_mode: snapshot.game_mode,
            match_type: snapshot.match_type,
            is_unrated: snapshot.is_unrated,
            is_lobby_mode: snapshot.is_lobby_mode,
            lobby_id: snapshot.lobby_id,
            opening_name: snapshot.opening_name,
            players,
            reserved: HashMap::new(),
            spectators: HashMap::new(),
            game_state: snapshot.game_state,
            move_history: snapshot.move_history,
            clock,
            state_version: snapshot.state_version,
            started_at: snapshot.started_at,
            ended_at: snapshot.ended_at,
            clock_loop: None,
            heartbeat_loop: CancellationToken::new(),
            abandon_generations: HashMap::new(),
        };
        let handle = GameRoomHandle {
            id: snapshot.id,
            tx,
        };
        rooms.insert(snapshot.id, handle.clone());
        room.start_heartbeat_loop();
        if room.status == GameStatus::Playing {
            room.start_clock_loop();
        }
        tokio::spawn(room.run(rx));
        handle
    }

    async fn run(mut self, mut rx: mpsc::Receiver<RoomCommand>) {
        tracing::debug!(game_id = %self.id, "Game room started");
        while let Some(command) = rx.recv().await {
            self.dispatch(command).await;
            if self.should_shut_down() {
                break;
            }
        }

        // Scoped teardown: every timer dies with the room.
        if let Some(token) = self.clock_loop.take() {
            token.cancel();
        }
        self.heartbeat_loop.cancel();
        self.rooms.remove(&self.id);
        tracing::info!(game_id = %self.id, status = ?self.status, "Game room shut down");
    }

    async fn dispatch(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Connect {
                params,
                outbound,
                reply,
            } => {
                let result = self.handle_connect(params, outbound).await;
                let _ = reply.send(result);
            }
            RoomCommand::Frame { from, frame } => {
                if let ParticipantKey::Player(player_id) = &from {
                    if let Some(session) = self.players.get_mut(player_id) {
                        session.last_seen = Instant::now();
                    }
                }
                self.handle_frame(from, frame).await;
            }
            RoomCommand::Closed { from } => self.handle_closed(from).await,
            RoomCommand::Init { seed, reply } => {
                let result = self.handle_init(seed).await;
                let _ = reply.send(result);
            }
            RoomCommand::State { reply } => {
                let _ = reply.send(self.state_view());
            }
            RoomCommand::ClockTick => self.handle_clock_tick().await,
            RoomCommand::HeartbeatTick => self.handle_heartbeat_tick(),
            RoomCommand::AbandonmentElapsed {
                player_id,
                generation,
            } => self.handle_abandonment_elapsed(player_id, generation).await,
        }
    }

    /// A finished room with nobody attached has nothing left to do.
    fn should_shut_down(&self) -> bool {
        self.status.is_terminal()
            && self.spectators.is_empty()
            && self.players.values().all(|p| !p.connected)
    }

    async fn handle_init(&mut self, seed: GameRoomSeed) -> Result<(), InitError> {
        if self.status != GameStatus::Waiting || !self.players.is_empty() {
            return Err(InitError::AlreadyStarted);
        }

        self.game_mode = seed.game_mode;
        self.is_lobby_mode = seed.is_lobby_mode;
        self.is_unrated = seed.is_unrated;
        if seed.is_lobby_mode {
            self.match_type = MatchType::Friendly;
        }
        self.lobby_id = seed.lobby_id;
        self.opening_name = seed.opening_name;
        if let Some(fen) = seed.starting_fen {
            self.game_state = GameState::from_fen(fen);
        }
        self.reserved.clear();
        if let Some(white) = seed.players.white {
            self.reserved.insert(PlayerColor::White, white);
        }
        if let Some(black) = seed.players.black {
            self.reserved.insert(PlayerColor::Black, black);
        }

        tracing::info!(
            game_id = %self.id,
            game_mode = %self.game_mode,
            is_unrated = self.is_unrated,
            "Game room seeded"
        );
        self.persist_snapshot().await;
        Ok(())
    }

    fn state_view(&self) -> RoomStateView {
        RoomStateView {
            id: self.id,
            status: self.status,
            game_mode: self.game_mode,
            match_type: self.match_type,
            is_unrated: self.is_unrated,
            state_version: self.state_version,
            players: self.players.values().map(PlayerSession::public_info).collect(),
            spectator_count: self.spectators.len(),
            game_state: self.game_state.clone(),
            clock: self.clock.as_ref().map(ClockState::snapshot),
            lobby_id: self.lobby_id,
        }
    }

    // ---- timers ------------------------------------------------------

    fn start_heartbeat_loop(&self) {
        let token = self.heartbeat_loop.clone();
        let tx = self.self_tx.clone();
        let interval = self.deps.config.game.heartbeat_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // first tick completes immediately
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if tx.send(RoomCommand::HeartbeatTick).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    pub(crate) fn start_clock_loop(&mut self) {
        if let Some(previous) = self.clock_loop.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        self.clock_loop = Some(token.clone());
        let tx = self.self_tx.clone();
        let interval = self.deps.config.game.clock_tick_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if tx.send(RoomCommand::ClockTick).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    pub(crate) fn stop_clock_loop(&mut self) {
        if let Some(token) = self.clock_loop.take() {
            token.cancel();
        }
    }

    /// Arm the abandonment timer for a disconnected player. The captured
    /// generation makes late firings harmless.
    pub(crate) fn arm_abandonment_timer(&mut self, player_id: &PlayerId) {
        let generation = self
            .abandon_generations
            .entry(player_id.clone())
            .and_modify(|g| *g += 1)
            .or_insert(1);
        let generation = *generation;
        let tx = self.self_tx.clone();
        let timeout = self.deps.config.game.abandonment_timeout();
        let player_id = player_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx
                .send(RoomCommand::AbandonmentElapsed {
                    player_id,
                    generation,
                })
                .await;
        });
    }

    /// Invalidate any outstanding abandonment timer for this player.
    pub(crate) fn cancel_abandonment_timer(&mut self, player_id: &PlayerId) {
        self.abandon_generations
            .entry(player_id.clone())
            .and_modify(|g| *g += 1)
            .or_insert(1);
    }

    // ---- messaging ---------------------------------------------------

    pub(crate) fn send_to_player(&self, player_id: &PlayerId, frame: Arc<ServerFrame>) {
        if let Some(session) = self.players.get(player_id) {
            if let Some(outbound) = &session.outbound {
                if let Err(err) = outbound.try_send(Outbound::Frame(frame)) {
                    tracing::debug!(
                        game_id = %self.id,
                        player_id = %player_id,
                        error = %err,
                        "Dropped outbound frame"
                    );
                }
            }
        }
    }

    pub(crate) fn send_to_opponent(&self, player_id: &PlayerId, frame: Arc<ServerFrame>) {
        if let Some(opponent) = self.opponent_of(player_id) {
            let opponent_id = opponent.player_id.clone();
            self.send_to_player(&opponent_id, frame);
        }
    }

    pub(crate) fn broadcast_players(&self, frame: &Arc<ServerFrame>) {
        for player_id in self.players.keys() {
            self.send_to_player(player_id, frame.clone());
        }
    }

    pub(crate) fn broadcast_spectators(&self, frame: &Arc<ServerFrame>) {
        for (spectator_id, spectator) in &self.spectators {
            if let Err(err) = spectator.outbound.try_send(Outbound::Frame(frame.clone())) {
                tracing::debug!(
                    game_id = %self.id,
                    spectator_id = %spectator_id,
                    error = %err,
                    "Dropped spectator frame"
                );
            }
        }
    }

    pub(crate) fn broadcast_all(&self, frame: &Arc<ServerFrame>) {
        self.broadcast_players(frame);
        self.broadcast_spectators(frame);
    }

    pub(crate) fn opponent_of(&self, player_id: &PlayerId) -> Option<&PlayerSession> {
        self.players
            .values()
            .find(|session| &session.player_id != player_id)
    }

    pub(crate) fn player_by_color(&self, color: PlayerColor) -> Option<&PlayerSession> {
        self.players.values().find(|session| session.color == color)
    }

    // ---- durability --------------------------------------------------

    pub(crate) fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            id: self.id,
            status: self.status,
            game_mode: self.game_mode,
            match_type: self.match_type,
            is_unrated: self.is_unrated,
            is_lobby_mode: self.is_lobby_mode,
            lobby_id: self.lobby_id,
            opening_name: self.opening_name.clone(),
            state_version: self.state_version,
            game_state: self.game_state.clone(),
            move_history: self.move_history.clone(),
            clock: self.clock.as_ref().map(ClockState::snapshot),
            players: self
                .players
                .values()
                .map(|session| SnapshotPlayer {
                    player_id: session.player_id.clone(),
                    display_name: session.display_name.clone(),
                    rating: session.rating,
                    is_provisional: session.is_provisional,
                    color: session.color,
                })
                .collect(),
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }

    /// Best-effort snapshot write; failures never disturb the event loop.
    pub(crate) async fn persist_snapshot(&self) {
        let snapshot = self.snapshot();
        let data = match serde_json::to_value(&snapshot) {
            Ok(data) => data,
            Err(err) => {
                tracing::error!(game_id = %self.id, error = %err, "Failed to serialize room snapshot");
                return;
            }
        };
        if let Err(err) = self
            .deps
            .store
            .set_document(&paths::game_snapshot(self.id), data, false)
            .await
        {
            tracing::warn!(game_id = %self.id, error = %err, "Failed to persist room snapshot");
        }
    }
}

/// Process-wide registry of running game rooms.
#[derive(Clone)]
pub struct GameRegistry {
    rooms: Arc<DashMap<GameId, GameRoomHandle>>,
    deps: RoomDeps,
}

impl GameRegistry {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn DocumentStore>,
        lobby_list: Arc<dyn LobbyDirectory>,
    ) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            deps: RoomDeps {
                config,
                store,
                lobby_list,
            },
        }
    }

    /// Create a room with a fresh id (matchmaker pairing, lobby seeding).
    pub fn create(&self, game_mode: GameMode, match_type: MatchType) -> GameRoomHandle {
        GameRoom::spawn(
            Uuid::new_v4(),
            game_mode,
            match_type,
            self.deps.clone(),
            self.rooms.clone(),
        )
    }

    /// Create (or return) a room with a caller-chosen id, for lobby
    /// seeding via `POST /game/{id}/init`.
    pub fn get_or_create(&self, id: GameId, game_mode: GameMode) -> GameRoomHandle {
        if let Some(handle) = self.rooms.get(&id) {
            return handle.clone();
        }
        GameRoom::spawn(
            id,
            game_mode,
            MatchType::Friendly,
            self.deps.clone(),
            self.rooms.clone(),
        )
    }

    #[must_use]
    pub fn get(&self, id: GameId) -> Option<GameRoomHandle> {
        self.rooms.get(&id).map(|handle| handle.clone())
    }

    /// Resolve a room, rehydrating an evicted one from its snapshot.
    pub async fn get_or_restore(&self, id: GameId) -> Option<GameRoomHandle> {
        if let Some(handle) = self.get(id) {
            return Some(handle);
        }
        let doc = self
            .deps
            .store
            .get_document(&paths::game_snapshot(id))
            .await
            .ok()
            .flatten()?;
        let snapshot: RoomSnapshot = match serde_json::from_value(doc) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!(game_id = %id, error = %err, "Discarding unreadable room snapshot");
                return None;
            }
        };
        if snapshot.status.is_terminal() {
            return None;
        }
        // Another task may have restored it while we were reading.
        if let Some(handle) = self.get(id) {
            return Some(handle);
        }
        tracing::info!(game_id = %id, "Rehydrating game room from snapshot");
        Some(GameRoom::spawn_restored(
            snapshot,
            self.deps.clone(),
            self.rooms.clone(),
        ))
    }

    #[must_use]
    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }
}
