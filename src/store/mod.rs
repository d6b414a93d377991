//! External document-store seam.
//!
//! The platform persists match results, player ratings, and actor
//! snapshots in an external document database. The core only depends on
//! the [`DocumentStore`] trait; the in-memory backend serves tests and
//! single-node deployments.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

mod memory;

pub use memory::InMemoryStore;

/// A single filter applied by [`DocumentStore::query_documents`].
#[derive(Debug, Clone)]
pub struct QueryFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
}

impl QueryFilter {
    #[must_use]
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value,
        }
    }
}

/// One operation inside a [`DocumentStore::batch_write`].
#[derive(Debug, Clone)]
pub enum WriteOp {
    Set {
        path: String,
        data: Value,
        merge: bool,
    },
    Delete {
        path: String,
    },
}

/// Document database abstraction consumed by the core.
///
/// Writes from end-of-game settlement are best-effort: callers log and
/// swallow failures rather than block termination or client messaging.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, `None` if absent.
    async fn get_document(&self, path: &str) -> Result<Option<Value>>;

    /// Write a document. With `merge` the payload is deep-merged into the
    /// existing document; otherwise it replaces it.
    async fn set_document(&self, path: &str, data: Value, merge: bool) -> Result<()>;

    /// Update selected fields of an existing document. With a mask, only
    /// the named top-level fields are written.
    async fn update_document(
        &self,
        path: &str,
        data: Value,
        update_mask: Option<&[String]>,
    ) -> Result<()>;

    /// Remove a document. Deleting a missing document is not an error.
    async fn delete_document(&self, path: &str) -> Result<()>;

    /// List the documents directly under `collection`, filtered.
    /// Returns (document id, document) pairs.
    async fn query_documents(
        &self,
        collection: &str,
        filters: &[QueryFilter],
    ) -> Result<Vec<(String, Value)>>;

    /// Apply a set of writes. The in-memory backend applies them
    /// sequentially; a remote backend may batch them atomically.
    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<()>;
}

/// Well-known document paths used by the core.
pub mod paths {
    use crate::protocol::{GameId, LobbyId};

    /// Per-player copy of a finished match.
    #[must_use]
    pub fn match_history(player_id: &str, match_id: GameId) -> String {
        format!("users/{player_id}/matchHistory/{match_id}")
    }

    /// Ranked rating profile merged at settlement.
    #[must_use]
    pub fn ratings_profile(player_id: &str) -> String {
        format!("users/{player_id}/profile/ratings")
    }

    /// Leaderboard entry mirrored from the rating profile.
    #[must_use]
    pub fn leaderboard_entry(player_id: &str) -> String {
        format!("leaderboards/elo/players/{player_id}")
    }

    /// Game room snapshot written after every authoritative mutation.
    #[must_use]
    pub fn game_snapshot(game_id: GameId) -> String {
        format!("games/{game_id}/state")
    }

    /// Lobby record written on every transition.
    #[must_use]
    pub fn lobby(lobby_id: LobbyId) -> String {
        format!("lobbies/{lobby_id}")
    }

    /// The matchmaker's durable queue + pending-match state.
    pub const MATCHMAKING_STATE: &str = "matchmaking/state";
}
