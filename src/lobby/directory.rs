//! Seam to the external LobbyList service.
//!
//! The core only consumes three of its operations: registering a lobby
//! when it opens, updating it on state changes, and removing it on
//! teardown. Browsing, private-code lookup, and spectator bookkeeping
//! live in the external collaborator.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

use crate::protocol::{LobbyId, LobbyState, LobbyStatus};

#[async_trait]
pub trait LobbyDirectory: Send + Sync {
    /// Register a freshly created lobby.
    async fn add_lobby(&self, state: &LobbyState) -> Result<()>;

    /// Mirror a lobby state change.
    async fn update_lobby(&self, state: &LobbyState) -> Result<()>;

    /// Drop a lobby from the directory (cancel, timeout, or game end).
    async fn remove_lobby(&self, lobby_id: LobbyId) -> Result<()>;
}

/// Process-local directory used in tests and single-node deployments.
#[derive(Debug, Default)]
pub struct InMemoryLobbyList {
    lobbies: DashMap<LobbyId, LobbyState>,
}

impl InMemoryLobbyList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, lobby_id: LobbyId) -> Option<LobbyState> {
        self.lobbies.get(&lobby_id).map(|state| state.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }

    /// Waiting lobbies visible in a public listing.
    #[must_use]
    pub fn open_lobbies(&self, include_private: bool) -> Vec<LobbyState> {
        self.lobbies
            .iter()
            .filter(|entry| entry.status == LobbyStatus::Waiting)
            .filter(|entry| include_private || !entry.settings.private)
            .map(|entry| entry.clone())
            .collect()
    }
}

#[async_trait]
impl LobbyDirectory for InMemoryLobbyList {
    async fn add_lobby(&self, state: &LobbyState) -> Result<()> {
        self.lobbies.insert(state.lobby_id, state.clone());
        Ok(())
    }

    async fn update_lobby(&self, state: &LobbyState) -> Result<()> {
        self.lobbies.insert(state.lobby_id, state.clone());
        Ok(())
    }

    async fn remove_lobby(&self, lobby_id: LobbyId) -> Result<()> {
        self.lobbies.remove(&lobby_id);
        Ok(())
    }
}
