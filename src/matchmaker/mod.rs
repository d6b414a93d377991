//! Global matchmaking queue.
//!
//! A single process-wide actor holds the waiting pool and the map of
//! pending matches. Because every operation funnels through its inbox, a
//! pairing is observed atomically: once an opponent leaves the queue, no
//! third entry can steal either side. State is loaded lazily from the
//! store and persisted after every mutation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;
use crate::game::GameRegistry;
use crate::protocol::{
    GameId, GameMode, MatchType, PendingMatch, PlayerColor, PlayerDescriptor, PlayerId, QueueEntry,
};
use crate::store::{paths, DocumentStore};
use crate::websocket::urls::game_connection_url;

const MATCHMAKER_INBOX_CAPACITY: usize = 128;

/// Maximum half-width of the acceptance window, in rating points.
const WINDOW_CAP: f64 = 600.0;

/// Dynamic ± rating range accepted by an entry that has waited
/// `age_secs` in the queue. Widens in pieces, capped at 600.
#[must_use]
pub fn rating_window(age_secs: f64) -> i32 {
    let w = age_secs.max(0.0);
    let range = if w < 10.0 {
        150.0
    } else if w < 20.0 {
        150.0 + 10.0 * (w - 10.0)
    } else if w < 25.0 {
        250.0 + 30.0 * (w - 20.0)
    } else {
        400.0 + 40.0 * (w - 25.0)
    };
    range.min(WINDOW_CAP) as i32
}

/// Mutual acceptance: each side's rating lies inside the other's current
/// window, and both want the same time control.
#[must_use]
pub fn mutually_accept(a: &QueueEntry, b: &QueueEntry, now: DateTime<Utc>) -> bool {
    if a.game_mode != b.game_mode {
        return false;
    }
    let window_a = rating_window(age_secs(a, now));
    let window_b = rating_window(age_secs(b, now));
    (a.rating - b.rating).abs() <= window_a && (b.rating - a.rating).abs() <= window_b
}

fn age_secs(entry: &QueueEntry, now: DateTime<Utc>) -> f64 {
    age_secs_at(entry.joined_at, now)
}

fn age_secs_at(joined_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - joined_at).num_milliseconds() as f64 / 1000.0
}

/// `POST /matchmaking/queue/join` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub player_id: PlayerId,
    pub display_name: String,
    pub rating: i32,
    #[serde(default)]
    pub is_provisional: bool,
    pub game_mode: GameMode,
    #[serde(default)]
    pub origin: Option<String>,
}

impl JoinRequest {
    fn descriptor(&self) -> PlayerDescriptor {
        PlayerDescriptor {
            player_id: self.player_id.clone(),
            display_name: self.display_name.clone(),
            rating: self.rating,
            is_provisional: self.is_provisional,
        }
    }
}

/// Successful pairing delivered to one side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedPayload {
    pub game_id: GameId,
    pub connection_url: String,
    pub color: PlayerColor,
    pub opponent: PlayerDescriptor,
    pub game_mode: GameMode,
}

/// Queue placement for an unmatched joiner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedInfo {
    pub position: usize,
    pub estimated_wait_secs: u64,
    pub min_rating: i32,
    pub max_rating: i32,
    pub expires_in_secs: i64,
}

/// `POST /matchmaking/queue/join` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_info: Option<MatchedPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueuedInfo>,
}

/// `GET /matchmaking/queue/status` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatusView {
    pub in_queue: bool,
    pub has_pending_match: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waited_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rating: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<i64>,
}

/// `GET /matchmaking/queue/info` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueInfoView {
    pub total_waiting: usize,
    pub waiting_by_mode: HashMap<String, usize>,
    pub pending_matches: usize,
}

/// Durable matchmaker state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MatchmakerState {
    queue: Vec<QueueEntry>,
    pending: HashMap<PlayerId, PendingMatch>,
}

enum MatchmakerCommand {
    Join {
        request: JoinRequest,
        reply: oneshot::Sender<JoinResponse>,
    },
    Status {
        player_id: PlayerId,
        reply: oneshot::Sender<QueueStatusView>,
    },
    Leave {
        player_id: PlayerId,
        reply: oneshot::Sender<bool>,
    },
    Info {
        reply: oneshot::Sender<QueueInfoView>,
    },
}

/// Cheap, cloneable address of the global matchmaker.
#[derive(Clone)]
pub struct MatchmakerHandle {
    tx: mpsc::Sender<MatchmakerCommand>,
}

impl MatchmakerHandle {
    pub async fn join(&self, request: JoinRequest) -> Option<JoinResponse> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MatchmakerCommand::Join { request, reply })
            .await
            .ok()?;
        rx.await.ok()
    }

    pub async fn status(&self, player_id: PlayerId) -> Option<QueueStatusView> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MatchmakerCommand::Status { player_id, reply })
            .await
            .ok()?;
        rx.await.ok()
    }

    pub async fn leave(&self, player_id: PlayerId) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(MatchmakerCommand::Leave { player_id, reply })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn info(&self) -> Option<QueueInfoView> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(MatchmakerCommand::Info { reply }).await.ok()?;
        rx.await.ok()
    }
}

/// The matchmaker actor.
pub struct Matchmaker {
    config: Arc<Config>,
    store: Arc<dyn DocumentStore>,
    games: GameRegistry,
    state: MatchmakerState,
    loaded: bool,
}

impl Matchmaker {
    /// Spawn the global matchmaker task.
    pub fn spawn(
        config: Arc<Config>,
        store: Arc<dyn DocumentStore>,
        games: GameRegistry,
    ) -> MatchmakerHandle {
        let (tx, rx) = mpsc::channel(MATCHMAKER_INBOX_CAPACITY);
        let matchmaker = Self {
            config,
            store,
            games,
            state: MatchmakerState::default(),
            loaded: false,
        };
        tokio::spawn(matchmaker.run(rx));
        MatchmakerHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<MatchmakerCommand>) {
        while let Some(command) = rx.recv().await {
            // Every public operation: lazy load, prune, proceed.
            self.ensure_loaded().await;
            let pruned = self.prune(Utc::now());
            match command {
                MatchmakerCommand::Join { request, reply } => {
                    let _ = reply.send(self.handle_join(request).await);
                }
                MatchmakerCommand::Status { player_id, reply } => {
                    if pruned {
                        self.persist().await;
                    }
                    let _ = reply.send(self.handle_status(&player_id));
                }
                MatchmakerCommand::Leave { player_id, reply } => {
                    let _ = reply.send(self.handle_leave(&player_id).await);
                }
                MatchmakerCommand::Info { reply } => {
                    if pruned {
                        self.persist().await;
                    }
                    let _ = reply.send(self.handle_info());
                }
            }
        }
    }

    async fn ensure_loaded(&mut self) {
        if self.loaded {
            return;
        }
        self.loaded = true;
        match self.store.get_document(paths::MATCHMAKING_STATE).await {
            Ok(Some(doc)) => match serde_json::from_value::<MatchmakerState>(doc) {
                Ok(state) => {
                    tracing::info!(
                        queued = state.queue.len(),
                        pending = state.pending.len(),
                        "Restored matchmaker state"
                    );
                    self.state = state;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Discarding unreadable matchmaker state");
                }
            },
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "Failed to load matchmaker state");
            }
        }
    }

    /// Drop expired queue entries and pending matches. Returns whether
    /// anything was removed.
    fn prune(&mut self, now: DateTime<Utc>) -> bool {
        let queue_before = self.state.queue.len();
        self.state.queue.retain(|entry| entry.expires_at > now);
        let pending_before = self.state.pending.len();
        self.state
            .pending
            .retain(|_, pending| pending.expires_at > now);

        let removed =
            queue_before - self.state.queue.len() + pending_before - self.state.pending.len();
        if removed > 0 {
            tracing::debug!(removed, "Pruned expired matchmaking entries");
        }
        removed > 0
    }

    async fn handle_join(&mut self, request: JoinRequest) -> JoinResponse {
        let now = Utc::now();

        // A previous pairing may already be waiting for this player.
        if let Some(pending) = self.state.pending.remove(&request.player_id) {
            self.persist().await;
            tracing::info!(
                player_id = %request.player_id,
                game_id = %pending.game_id,
                "Delivered pending match"
            );
            return JoinResponse {
                matched: true,
                match_info: Some(MatchedPayload {
                    game_id: pending.game_id,
                    connection_url: pending.connection_url,
                    color: pending.color,
                    opponent: pending.opponent,
                    game_mode: pending.game_mode,
                }),
                queue: None,
            };
        }

        // Deduplicate: a rejoin replaces any previous entry. Clients poll
        // join, so a same-mode rejoin keeps its original queue age --
        // otherwise the rating window would reset on every poll and never
        // widen.
        let previous_index = self
            .state
            .queue
            .iter()
            .position(|entry| entry.player_id == request.player_id);
        let previous = previous_index.map(|index| self.state.queue.remove(index));
        let retained_age = previous
            .filter(|entry| entry.game_mode == request.game_mode)
            .map(|entry| (entry.joined_at, entry.expires_at));

        let ttl = Duration::seconds(self.config.matchmaking.queue_ttl_secs);
        let (joined_at, expires_at) = retained_age.unwrap_or((now, now + ttl));
        let window = rating_window(age_secs_at(joined_at, now));
        let entry = QueueEntry {
            player_id: request.player_id.clone(),
            display_name: request.display_name.clone(),
            rating: request.rating,
            is_provisional: request.is_provisional,
            game_mode: request.game_mode,
            joined_at,
            min_rating: request.rating - window,
            max_rating: request.rating + window,
            expires_at,
            origin: request.origin.clone(),
        };

        // First mutually accepting entry in queue order wins.
        let opponent_index = self
            .state
            .queue
            .iter()
            .position(|candidate| mutually_accept(&entry, candidate, now));

        if let Some(index) = opponent_index {
            let opponent = self.state.queue.remove(index);
            let response = self.pair(entry, opponent).await;
            self.persist().await;
            return response;
        }

        // No pair: enqueue (rejoins keep their place at the back; queue
        // order is join order of the current entries).
        self.state.queue.push(entry);
        self.persist().await;

        let position = self.state.queue.len();
        let ttl_secs = self.config.matchmaking.queue_ttl_secs;
        JoinResponse {
            matched: false,
            match_info: None,
            queue: Some(QueuedInfo {
                position,
                estimated_wait_secs: (position as u64 * 5).min(ttl_secs.max(0) as u64),
                min_rating: request.rating - window,
                max_rating: request.rating + window,
                expires_in_secs: ttl_secs,
            }),
        }
    }

    /// Build the game room and both sides' coordinates; the caller gets
    /// theirs immediately, the opponent's is parked as a pending match.
    async fn pair(&mut self, caller: QueueEntry, opponent: QueueEntry) -> JoinResponse {
        let game = self.games.create(caller.game_mode, MatchType::Ranked);

        let caller_color = if rand::random::<bool>() {
            PlayerColor::White
        } else {
            PlayerColor::Black
        };
        let opponent_color = caller_color.opposite();

        let caller_descriptor = descriptor_of(&caller);
        let opponent_descriptor = descriptor_of(&opponent);

        let base = &self.config.public_base_url;
        let caller_url =
            game_connection_url(base, game.id, &caller_descriptor, caller_color, None);
        let opponent_url =
            game_connection_url(base, game.id, &opponent_descriptor, opponent_color, None);

        let now = Utc::now();
        let pending_ttl = Duration::seconds(self.config.matchmaking.pending_match_ttl_secs);
        self.state.pending.insert(
            opponent.player_id.clone(),
            PendingMatch {
                player_id: opponent.player_id.clone(),
                game_id: game.id,
                connection_url: opponent_url,
                color: opponent_color,
                opponent: caller_descriptor,
                game_mode: opponent.game_mode,
                created_at: now,
                expires_at: now + pending_ttl,
            },
        );

        tracing::info!(
            game_id = %game.id,
            caller = %caller.player_id,
            opponent = %opponent.player_id,
            game_mode = %caller.game_mode,
            "Paired players"
        );

        JoinResponse {
            matched: true,
            match_info: Some(MatchedPayload {
                game_id: game.id,
                connection_url: caller_url,
                color: caller_color,
                opponent: opponent_descriptor,
                game_mode: caller.game_mode,
            }),
            queue: None,
        }
    }

    fn handle_status(&self, player_id: &str) -> QueueStatusView {
        let now = Utc::now();
        let has_pending_match = self.state.pending.contains_key(player_id);
        let Some((index, entry)) = self
            .state
            .queue
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.player_id == player_id)
        else {
            return QueueStatusView {
                in_queue: false,
                has_pending_match,
                position: None,
                waited_secs: None,
                min_rating: None,
                max_rating: None,
                expires_in_secs: None,
            };
        };

        let window = rating_window(age_secs(entry, now));
        QueueStatusView {
            in_queue: true,
            has_pending_match,
            position: Some(index + 1),
            waited_secs: Some((now - entry.joined_at).num_seconds()),
            min_rating: Some(entry.rating - window),
            max_rating: Some(entry.rating + window),
            expires_in_secs: Some((entry.expires_at - now).num_seconds()),
        }
    }

    async fn handle_leave(&mut self, player_id: &str) -> bool {
        let before = self.state.queue.len();
        self.state
            .queue
            .retain(|entry| entry.player_id != player_id);
        let removed = self.state.queue.len() != before;
        if removed {
            tracing::info!(%player_id, "Player left the queue");
        }
        self.persist().await;
        removed
    }

    fn handle_info(&self) -> QueueInfoView {
        let mut waiting_by_mode: HashMap<String, usize> = HashMap::new();
        for entry in &self.state.queue {
            *waiting_by_mode
                .entry(entry.game_mode.to_string())
                .or_default() += 1;
        }
        QueueInfoView {
            total_waiting: self.state.queue.len(),
            waiting_by_mode,
            pending_matches: self.state.pending.len(),
        }
    }

    async fn persist(&self) {
        let data = match serde_json::to_value(&self.state) {
            Ok(data) => data,
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize matchmaker state");
                return;
            }
        };
        if let Err(err) = self
            .store
            .set_document(paths::MATCHMAKING_STATE, data, false)
            .await
        {
            tracing::warn!(error = %err, "Failed to persist matchmaker state");
        }
    }
}

fn descriptor_of(entry: &QueueEntry) -> PlayerDescriptor {
    PlayerDescriptor {
        player_id: entry.player_id.clone(),
        display_name: entry.display_name.clone(),
        rating: entry.rating,
        is_provisional: entry.is_provisional,
    }
}
