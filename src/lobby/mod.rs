//! Lobby rooms.
//!
//! A [`LobbyRoom`] is a single pairing slot: one creator waits, one
//! joiner arrives, a game room is seeded, both sides get connection
//! coordinates. Like game rooms, each lobby is a tokio task with a
//! command inbox; the 5-minute waiting timeout re-enters the inbox.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;
use crate::game::{GameRegistry, GameRoomSeed, SeedPlayers};
use crate::protocol::{
    ColorPreference, GameId, GameMode, LobbyId, LobbySettings, LobbyState, LobbyStatus,
    PlayerColor, PlayerDescriptor,
};
use crate::store::{paths, DocumentStore};
use crate::websocket::urls::{game_connection_url, LobbySeedParams};

pub mod directory;

use directory::LobbyDirectory;

const LOBBY_INBOX_CAPACITY: usize = 32;
const CREATOR_CHANNEL_CAPACITY: usize = 16;

/// Frames delivered over the creator's live channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LobbyFrame {
    /// Someone joined; `match_ready` follows once the game room is seeded.
    OpponentJoined { opponent: PlayerDescriptor },
    /// The game room is ready; connect and play.
    MatchReady(MatchReadyPayload),
    /// The lobby was cancelled (explicitly or by timeout).
    LobbyCancelled { reason: String },
}

/// Connection coordinates for one side of a lobby match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchReadyPayload {
    pub lobby_id: LobbyId,
    pub game_room_id: GameId,
    pub connection_url: String,
    pub color: PlayerColor,
    pub opponent: PlayerDescriptor,
    pub game_mode: GameMode,
    pub is_unrated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LobbyError {
    #[error("lobby has not been initialised")]
    NotInitialised,
    #[error("lobby is already initialised")]
    AlreadyInitialised,
    #[error("lobby is not accepting a joiner")]
    NotJoinable,
    #[error("cannot join your own lobby")]
    CannotJoinOwnLobby,
    #[error("only the creator may attach to the lobby channel")]
    NotCreator,
    #[error("failed to allocate the game room")]
    GameCreationFailed,
    #[error("lobby is gone")]
    LobbyClosed,
}

pub type LobbyFrameSender = mpsc::Sender<LobbyFrame>;

enum LobbyCommand {
    Init {
        creator: PlayerDescriptor,
        settings: LobbySettings,
        reply: oneshot::Sender<Result<LobbyState, LobbyError>>,
    },
    Join {
        opponent: PlayerDescriptor,
        reply: oneshot::Sender<Result<MatchReadyPayload, LobbyError>>,
    },
    Cancel {
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },
    State {
        reply: oneshot::Sender<Option<LobbyState>>,
    },
    AttachCreator {
        player_id: String,
        channel: LobbyFrameSender,
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },
    TimeoutElapsed {
        generation: u64,
    },
}

/// Cheap, cloneable address of a running lobby.
#[derive(Clone)]
pub struct LobbyHandle {
    pub id: LobbyId,
    tx: mpsc::Sender<LobbyCommand>,
}

impl LobbyHandle {
    pub async fn init(
        &self,
        creator: PlayerDescriptor,
        settings: LobbySettings,
    ) -> Result<LobbyState, LobbyError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(LobbyCommand::Init {
                creator,
                settings,
                reply,
            })
            .await
            .map_err(|_| LobbyError::LobbyClosed)?;
        rx.await.map_err(|_| LobbyError::LobbyClosed)?
    }

    pub async fn join(
        &self,
        opponent: PlayerDescriptor,
    ) -> Result<MatchReadyPayload, LobbyError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(LobbyCommand::Join { opponent, reply })
            .await
            .map_err(|_| LobbyError::LobbyClosed)?;
        rx.await.map_err(|_| LobbyError::LobbyClosed)?
    }

    pub async fn cancel(&self) -> Result<(), LobbyError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(LobbyCommand::Cancel { reply })
            .await
            .map_err(|_| LobbyError::LobbyClosed)?;
        rx.await.map_err(|_| LobbyError::LobbyClosed)?
    }

    pub async fn state(&self) -> Option<LobbyState> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(LobbyCommand::State { reply }).await.ok()?;
        rx.await.ok().flatten()
    }

    /// Attach the creator's live notification channel.
    pub async fn attach_creator(
        &self,
        player_id: String,
        channel: LobbyFrameSender,
    ) -> Result<(), LobbyError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(LobbyCommand::AttachCreator {
                player_id,
                channel,
                reply,
            })
            .await
            .map_err(|_| LobbyError::LobbyClosed)?;
        rx.await.map_err(|_| LobbyError::LobbyClosed)?
    }
}

#[derive(Clone)]
struct LobbyDeps {
    config: Arc<Config>,
    store: Arc<dyn DocumentStore>,
    lobby_list: Arc<dyn LobbyDirectory>,
    games: GameRegistry,
}

struct LobbyRoom {
    id: LobbyId,
    deps: LobbyDeps,
    self_tx: mpsc::Sender<LobbyCommand>,
    lobbies: Arc<DashMap<LobbyId, LobbyHandle>>,
    state: Option<LobbyState>,
    creator_channel: Option<LobbyFrameSender>,
    /// Bumped whenever the waiting timeout is re-armed or cancelled.
    timeout_generation: u64,
    /// Set once the lobby reached a terminal state and the task may exit.
    done: bool,
}

impl LobbyRoom {
    fn spawn(
        id: LobbyId,
        deps: LobbyDeps,
        lobbies: Arc<DashMap<LobbyId, LobbyHandle>>,
        restored: Option<LobbyState>,
    ) -> LobbyHandle {
        let (tx, rx) = mpsc::channel(LOBBY_INBOX_CAPACITY);
        let mut room = Self {
            id,
            deps,
            self_tx: tx.clone(),
            lobbies: lobbies.clone(),
            state: restored,
            creator_channel: None,
            timeout_generation: 0,
            done: false,
        };
        if let Some(state) = &room.state {
            // Resume the waiting timeout where the previous process left off.
            let elapsed = (Utc::now() - state.created_at)
                .to_std()
                .unwrap_or_default();
            let full = room.deps.config.lobby.waiting_timeout();
            room.arm_timeout(full.saturating_sub(elapsed));
        }
        let handle = LobbyHandle { id, tx };
        lobbies.insert(id, handle.clone());
        tokio::spawn(room.run(rx));
        handle
    }

    async fn run(mut self, mut rx: mpsc::Receiver<LobbyCommand>) {
        tracing::debug!(lobby_id = %self.id, "Lobby started");
        while let Some(command) = rx.recv().await {
            self.dispatch(command).await;
            if self.done {
                break;
            }
        }
        self.lobbies.remove(&self.id);
        tracing::debug!(lobby_id = %self.id, "Lobby shut down");
    }

    async fn dispatch(&mut self, command: LobbyCommand) {
        match command {
            LobbyCommand::Init {
                creator,
                settings,
                reply,
            } => {
                let _ = reply.send(self.handle_init(creator, settings).await);
            }
            LobbyCommand::Join { opponent, reply } => {
                let _ = reply.send(self.handle_join(opponent).await);
            }
            LobbyCommand::Cancel { reply } => {
                let _ = reply.send(self.handle_cancel("cancelled by creator").await);
            }
            LobbyCommand::State { reply } => {
                let _ = reply.send(self.state.clone());
            }
            LobbyCommand::AttachCreator {
                player_id,
                channel,
                reply,
            } => {
                let _ = reply.send(self.handle_attach_creator(&player_id, channel));
            }
            LobbyCommand::TimeoutElapsed { generation } => {
                if generation != self.timeout_generation {
                    return;
                }
                if self
                    .state
                    .as_ref()
                    .is_some_and(|state| state.status == LobbyStatus::Waiting)
                {
                    tracing::info!(lobby_id = %self.id, "Lobby timed out waiting for a joiner");
                    let _ = self.handle_cancel("lobby timed out").await;
                }
            }
        }
    }

    async fn handle_init(
        &mut self,
        creator: PlayerDescriptor,
        settings: LobbySettings,
    ) -> Result<LobbyState, LobbyError> {
        if self.state.is_some() {
            return Err(LobbyError::AlreadyInitialised);
        }

        let state = LobbyState {
            lobby_id: self.id,
            creator,
            opponent: None,
            settings,
            status: LobbyStatus::Waiting,
            created_at: Utc::now(),
            game_room_id: None,
            connection_url: None,
        };
        self.state = Some(state.clone());
        self.persist().await;

        let lobby_list = self.deps.lobby_list.clone();
        let listed = state.clone();
        tokio::spawn(async move {
            if let Err(err) = lobby_list.add_lobby(&listed).await {
                tracing::warn!(lobby_id = %listed.lobby_id, error = %err, "Failed to list lobby");
            }
        });

        self.arm_timeout(self.deps.config.lobby.waiting_timeout());
        tracing::info!(
            lobby_id = %self.id,
            creator = %state.creator.player_id,
            game_mode = %state.settings.game_mode,
            "Lobby created"
        );
        Ok(state)
    }

    async fn handle_join(
        &mut self,
        opponent: PlayerDescriptor,
    ) -> Result<MatchReadyPayload, LobbyError> {
        let Some(state) = self.state.as_ref() else {
            return Err(LobbyError::NotInitialised);
        };
        if state.status != LobbyStatus::Waiting {
            return Err(LobbyError::NotJoinable);
        }
        if state.creator.player_id == opponent.player_id {
            return Err(LobbyError::CannotJoinOwnLobby);
        }

        let creator = state.creator.clone();
        let settings = state.settings.clone();

        self.notify_creator(LobbyFrame::OpponentJoined {
            opponent: opponent.clone(),
        });

        let creator_color = match settings.player_color {
            ColorPreference::White => PlayerColor::White,
            ColorPreference::Black => PlayerColor::Black,
            ColorPreference::Random => {
                if rand::random::<bool>() {
                    PlayerColor::White
                } else {
                    PlayerColor::Black
                }
            }
        };
        let joiner_color = creator_color.opposite();

        let (white, black) = match creator_color {
            PlayerColor::White => (creator.clone(), opponent.clone()),
            PlayerColor::Black => (opponent.clone(), creator.clone()),
        };

        let game = self
            .deps
            .games
            .create(settings.game_mode, crate::protocol::MatchType::Friendly);
        let seed = GameRoomSeed {
            game_mode: settings.game_mode,
            is_lobby_mode: true,
            is_unrated: settings.is_unrated,
            lobby_id: Some(self.id),
            opening_name: settings.opening_name.clone(),
            starting_fen: settings.opening_fen.clone(),
            players: SeedPlayers {
                white: Some(white),
                black: Some(black),
            },
        };
        if game.init(seed).await.is_err() {
            tracing::error!(lobby_id = %self.id, game_id = %game.id, "Failed to seed game room");
            return Err(LobbyError::GameCreationFailed);
        }

        let seed_params = LobbySeedParams {
            is_unrated: settings.is_unrated,
            opening_name: settings.opening_name.clone(),
            opening_fen: settings.opening_fen.clone(),
        };
        let base = &self.deps.config.public_base_url;
        let creator_url =
            game_connection_url(base, game.id, &creator, creator_color, Some(&seed_params));
        let joiner_url =
            game_connection_url(base, game.id, &opponent, joiner_color, Some(&seed_params));

        if let Some(state) = self.state.as_mut() {
            state.opponent = Some(opponent.clone());
            state.status = LobbyStatus::Matched;
            state.game_room_id = Some(game.id);
            state.connection_url = Some(creator_url.clone());
        }
        self.timeout_generation += 1; // cancel the waiting timeout
        self.persist().await;
        self.update_listing();

        self.notify_creator(LobbyFrame::MatchReady(MatchReadyPayload {
            lobby_id: self.id,
            game_room_id: game.id,
            connection_url: creator_url,
            color: creator_color,
            opponent: opponent.clone(),
            game_mode: settings.game_mode,
            is_unrated: settings.is_unrated,
        }));

        tracing::info!(
            lobby_id = %self.id,
            game_id = %game.id,
            joiner = %opponent.player_id,
            "Lobby matched"
        );

        // The lobby's job is done; the game room owns the rest.
        self.done = true;

        Ok(MatchReadyPayload {
            lobby_id: self.id,
            game_room_id: game.id,
            connection_url: joiner_url,
            color: joiner_color,
            opponent: creator,
            game_mode: settings.game_mode,
            is_unrated: settings.is_unrated,
        })
    }

    async fn handle_cancel(&mut self, reason: &str) -> Result<(), LobbyError> {
        let Some(state) = self.state.as_mut() else {
            return Err(LobbyError::NotInitialised);
        };
        if state.status != LobbyStatus::Waiting {
            return Err(LobbyError::NotJoinable);
        }

        state.status = LobbyStatus::Cancelled;
        self.timeout_generation += 1;
        self.persist().await;
        self.notify_creator(LobbyFrame::LobbyCancelled {
            reason: reason.to_string(),
        });

        let lobby_list = self.deps.lobby_list.clone();
        let lobby_id = self.id;
        tokio::spawn(async move {
            if let Err(err) = lobby_list.remove_lobby(lobby_id).await {
                tracing::warn!(%lobby_id, error = %err, "Failed to delist lobby");
            }
        });

        tracing::info!(lobby_id = %self.id, %reason, "Lobby cancelled");
        self.done = true;
        Ok(())
    }

    fn handle_attach_creator(
        &mut self,
        player_id: &str,
        channel: LobbyFrameSender,
    ) -> Result<(), LobbyError> {
        let Some(state) = self.state.as_ref() else {
            return Err(LobbyError::NotInitialised);
        };
        if state.creator.player_id != player_id {
            return Err(LobbyError::NotCreator);
        }
        self.creator_channel = Some(channel);
        Ok(())
    }

    fn notify_creator(&self, frame: LobbyFrame) {
        let Some(channel) = &self.creator_channel else {
            tracing::debug!(lobby_id = %self.id, "No creator channel attached; dropping notification");
            return;
        };
        if let Err(err) = channel.try_send(frame) {
            tracing::debug!(lobby_id = %self.id, error = %err, "Failed to notify creator");
        }
    }

    fn arm_timeout(&mut self, timeout: std::time::Duration) {
        self.timeout_generation += 1;
        let generation = self.timeout_generation;
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(LobbyCommand::TimeoutElapsed { generation }).await;
        });
    }

    fn update_listing(&self) {
        let Some(state) = self.state.clone() else {
            return;
        };
        let lobby_list = self.deps.lobby_list.clone();
        tokio::spawn(async move {
            if let Err(err) = lobby_list.update_lobby(&state).await {
                tracing::warn!(lobby_id = %state.lobby_id, error = %err, "Failed to update lobby listing");
            }
        });
    }

    async fn persist(&self) {
        let Some(state) = &self.state else {
            return;
        };
        let data = match serde_json::to_value(state) {
            Ok(data) => data,
            Err(err) => {
                tracing::error!(lobby_id = %self.id, error = %err, "Failed to serialize lobby state");
                return;
            }
        };
        if let Err(err) = self
            .deps
            .store
            .set_document(&paths::lobby(self.id), data, false)
            .await
        {
            tracing::warn!(lobby_id = %self.id, error = %err, "Failed to persist lobby state");
        }
    }
}

/// Process-wide registry of running lobbies.
#[derive(Clone)]
pub struct LobbyRegistry {
    lobbies: Arc<DashMap<LobbyId, LobbyHandle>>,
    deps: LobbyDeps,
}

impl LobbyRegistry {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn DocumentStore>,
        lobby_list: Arc<dyn LobbyDirectory>,
        games: GameRegistry,
    ) -> Self {
        Self {
            lobbies: Arc::new(DashMap::new()),
            deps: LobbyDeps {
                config,
                store,
                lobby_list,
                games,
            },
        }
    }

    /// Resolve or create the lobby actor with this id (`POST /init`).
    pub fn get_or_create(&self, id: LobbyId) -> LobbyHandle {
        if let Some(handle) = self.lobbies.get(&id) {
            return handle.clone();
        }
        LobbyRoom::spawn(id, self.deps.clone(), self.lobbies.clone(), None)
    }

    #[must_use]
    pub fn get(&self, id: LobbyId) -> Option<LobbyHandle> {
        self.lobbies.get(&id).map(|handle| handle.clone())
    }

    /// Resolve a lobby, rehydrating a waiting one from its snapshot so a
    /// restart resumes the timeout.
    pub async fn get_or_restore(&self, id: LobbyId) -> Option<LobbyHandle> {
        if let Some(handle) = self.get(id) {
            return Some(handle);
        }
        let state = self.persisted_state(id).await?;
        if state.status != LobbyStatus::Waiting {
            return None;
        }
        if let Some(handle) = self.get(id) {
            return Some(handle);
        }
        tracing::info!(lobby_id = %id, "Rehydrating lobby from snapshot");
        Some(LobbyRoom::spawn(
            id,
            self.deps.clone(),
            self.lobbies.clone(),
            Some(state),
        ))
    }

    /// Lobby state for `GET /state`: live actor first, then the store.
    pub async fn state(&self, id: LobbyId) -> Option<LobbyState> {
        if let Some(handle) = self.get(id) {
            if let Some(state) = handle.state().await {
                return Some(state);
            }
        }
        self.persisted_state(id).await
    }

    async fn persisted_state(&self, id: LobbyId) -> Option<LobbyState> {
        let doc = self
            .deps
            .store
            .get_document(&paths::lobby(id))
            .await
            .ok()
            .flatten()?;
        match serde_json::from_value(doc) {
            Ok(state) => Some(state),
            Err(err) => {
                tracing::warn!(lobby_id = %id, error = %err, "Discarding unreadable lobby snapshot");
                None
            }
        }
    }
}
