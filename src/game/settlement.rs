//! End-of-game settlement: result recording, rating deltas, match
//! history, and the best-effort writes to the external store.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};

use crate::protocol::{
    EloRatingChange, GameEndReason, GameEndedPayload, GameResult, GameStatus, MatchHistoryData,
    MatchPlayerSnapshot, MatchType, MoveRecord, PlayerColor, ServerFrame,
};
use crate::store::{paths, DocumentStore};

use super::elo::{self, RatedPlayer};
use super::{GameRoom, PlayerSession};

impl GameRoom {
    /// Settle the game. Idempotent: a second invocation with any
    /// arguments is a no-op.
    pub(crate) async fn end_game(&mut self, result: GameResult, reason: GameEndReason) {
        if self.status == GameStatus::Finished {
            return;
        }

        self.status = GameStatus::Finished;
        self.game_state.result = Some(result);
        self.game_state.result_reason = Some(reason);
        self.ended_at = Some(Utc::now());
        self.state_version += 1;

        // Every timer dies here; the heartbeat token is cancelled again at
        // room shutdown, which is harmless.
        self.stop_clock_loop();
        self.heartbeat_loop.cancel();
        let player_ids: Vec<String> = self.players.keys().cloned().collect();
        for player_id in &player_ids {
            self.cancel_abandonment_timer(player_id);
        }

        self.persist_snapshot().await;

        tracing::info!(
            game_id = %self.id,
            ?result,
            ?reason,
            "Game ended"
        );

        let white = self.player_by_color(PlayerColor::White);
        let black = self.player_by_color(PlayerColor::Black);
        let (Some(white), Some(black)) = (white, black) else {
            // A player record went missing; still tell whoever is left.
            let elo_changes = self
                .players
                .values()
                .map(|session| {
                    EloRatingChange::unchanged(
                        session.player_id.clone(),
                        session.rating,
                        session.is_provisional,
                    )
                })
                .collect();
            tracing::error!(
                game_id = %self.id,
                "Player record missing at settlement; sending minimal game_ended"
            );
            self.broadcast_all(&Arc::new(ServerFrame::GameEnded(Box::new(
                GameEndedPayload {
                    result,
                    reason,
                    elo_changes,
                    match_history: None,
                },
            ))));
            return;
        };

        let move_count = self.move_history.len();
        let (white_change, black_change) = if self.is_rated() {
            elo::compute_changes(
                &rated(white),
                &rated(black),
                result,
                move_count,
            )
        } else {
            (
                EloRatingChange::unchanged(
                    white.player_id.clone(),
                    white.rating,
                    white.is_provisional,
                ),
                EloRatingChange::unchanged(
                    black.player_id.clone(),
                    black.rating,
                    black.is_provisional,
                ),
            )
        };

        let history = MatchHistoryData {
            match_id: self.id,
            white: snapshot_of(white),
            black: snapshot_of(black),
            game_mode: self.game_mode,
            match_type: self.match_type,
            result,
            result_reason: reason,
            move_history: self.move_history.clone(),
            final_fen: self.game_state.fen.clone(),
            pgn: Some(build_pgn(&self.move_history, result)),
            started_at: self.started_at.unwrap_or_else(Utc::now),
            ended_at: self.ended_at.unwrap_or_else(Utc::now),
            opening_name: self.opening_name.clone(),
            white_elo_change: white_change.clone(),
            black_elo_change: black_change.clone(),
        };

        // Legacy clients get a plain notification first; game_ended stays
        // the last frame anyone receives from this room. Per-recipient
        // failures are swallowed by try_send, so one slow client never
        // blocks the other.
        self.broadcast_all(&Arc::new(ServerFrame::System {
            message: format!(
                "Game over: {} ({:?})",
                match result {
                    GameResult::WhiteWin => "white wins",
                    GameResult::BlackWin => "black wins",
                    GameResult::Draw => "draw",
                },
                reason
            ),
        }));
        self.broadcast_all(&Arc::new(ServerFrame::GameEnded(Box::new(
            GameEndedPayload {
                result,
                reason,
                elo_changes: vec![white_change, black_change],
                match_history: Some(history.clone()),
            },
        ))));

        // Fire-and-forget persistence; the room terminates regardless.
        let store = self.deps.store.clone();
        let rated_game = self.is_rated();
        tokio::spawn(async move {
            write_settlement(store, history, rated_game).await;
        });

        if self.is_lobby_mode {
            if let Some(lobby_id) = self.lobby_id {
                let lobby_list = self.deps.lobby_list.clone();
                tokio::spawn(async move {
                    if let Err(err) = lobby_list.remove_lobby(lobby_id).await {
                        tracing::warn!(%lobby_id, error = %err, "Failed to remove lobby from list");
                    }
                });
            }
        }
    }

    fn is_rated(&self) -> bool {
        self.match_type == MatchType::Ranked && !self.is_unrated
    }
}

fn rated(session: &PlayerSession) -> RatedPlayer {
    RatedPlayer {
        player_id: session.player_id.clone(),
        rating: session.rating,
        is_provisional: session.is_provisional,
    }
}

fn snapshot_of(session: &PlayerSession) -> MatchPlayerSnapshot {
    MatchPlayerSnapshot {
        player_id: session.player_id.clone(),
        display_name: session.display_name.clone(),
        rating_at_start: session.rating,
        provisional_at_start: session.is_provisional,
    }
}

/// Movetext with move numbers; SAN when the client supplied it, UCI
/// otherwise.
fn build_pgn(history: &[MoveRecord], result: GameResult) -> String {
    let mut out = String::new();
    for (index, record) in history.iter().enumerate() {
        if index % 2 == 0 {
            out.push_str(&format!("{}. ", index / 2 + 1));
        }
        out.push_str(record.san.as_deref().unwrap_or(&record.uci));
        out.push(' ');
    }
    out.push_str(match result {
        GameResult::WhiteWin => "1-0",
        GameResult::BlackWin => "0-1",
        GameResult::Draw => "1/2-1/2",
    });
    out
}

/// Persist a finished match: per-player history copies, and for rated
/// games a read-merge-write of the ratings profile and leaderboard entry.
/// Every step is independent; a failed write is logged and skipped.
async fn write_settlement(store: Arc<dyn DocumentStore>, history: MatchHistoryData, rated: bool) {
    let history_json = match serde_json::to_value(&history) {
        Ok(json) => json,
        Err(err) => {
            tracing::error!(match_id = %history.match_id, error = %err, "Failed to serialize match history");
            return;
        }
    };

    for player_id in [&history.white.player_id, &history.black.player_id] {
        let path = paths::match_history(player_id, history.match_id);
        if let Err(err) = store
            .set_document(&path, history_json.clone(), false)
            .await
        {
            tracing::warn!(%path, error = %err, "Failed to write match history");
        }
    }

    if !rated {
        return;
    }

    for color in [PlayerColor::White, PlayerColor::Black] {
        let (snapshot, change) = match color {
            PlayerColor::White => (&history.white, &history.white_elo_change),
            PlayerColor::Black => (&history.black, &history.black_elo_change),
        };
        let score = history.result.score_for(color);
        if let Err(err) = merge_player_ratings(store.as_ref(), snapshot, change, score).await {
            tracing::warn!(
                player_id = %snapshot.player_id,
                error = %err,
                "Failed to merge player ratings"
            );
        }
    }
}

/// Read-merge-write of one player's rating profile. Last-writer-wins is
/// tolerated for concurrent updates (a player is in at most one active
/// game in practice).
async fn merge_player_ratings(
    store: &dyn DocumentStore,
    snapshot: &MatchPlayerSnapshot,
    change: &EloRatingChange,
    score: f64,
) -> anyhow::Result<()> {
    let profile_path = paths::ratings_profile(&snapshot.player_id);
    let existing = store.get_document(&profile_path).await?.unwrap_or(Value::Null);

    let games_played = existing
        .get("totalGamesPlayed")
        .and_then(Value::as_u64)
        .unwrap_or(0)
        + 1;
    let stored_rating = existing
        .get("eloRating")
        .and_then(Value::as_i64)
        .map_or(snapshot.rating_at_start, |r| r as i32);
    let new_rating = stored_rating + change.change;

    let mut wins = existing.get("wins").and_then(Value::as_u64).unwrap_or(0);
    let mut losses = existing.get("losses").and_then(Value::as_u64).unwrap_or(0);
    let mut draws = existing.get("draws").and_then(Value::as_u64).unwrap_or(0);
    if score > 0.75 {
        wins += 1;
    } else if score < 0.25 {
        losses += 1;
    } else {
        draws += 1;
    }

    // The store's games-played counter is the authoritative source for
    // the provisional flag; the in-match proxy only covered the message.
    let is_provisional = games_played < 20;

    store
        .set_document(
            &profile_path,
            json!({
                "eloRating": new_rating,
                "totalGamesPlayed": games_played,
                "wins": wins,
                "losses": losses,
                "draws": draws,
                "isProvisional": is_provisional,
            }),
            true,
        )
        .await?;

    store
        .set_document(
            &paths::leaderboard_entry(&snapshot.player_id),
            json!({
                "playerId": snapshot.player_id,
                "displayName": snapshot.display_name,
                "eloRating": new_rating,
                "totalGamesPlayed": games_played,
                "isProvisional": is_provisional,
            }),
            true,
        )
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MoveRecord;
    use chrono::Utc;

    fn record(uci: &str, san: Option<&str>, made_by: PlayerColor) -> MoveRecord {
        MoveRecord {
            uci: uci.to_string(),
            san: san.map(str::to_string),
            timestamp: Utc::now(),
            made_by,
        }
    }

    #[test]
    fn pgn_numbers_full_moves() {
        let history = vec![
            record("e2e4", Some("e4"), PlayerColor::White),
            record("e7e5", Some("e5"), PlayerColor::Black),
            record("g1f3", Some("Nf3"), PlayerColor::White),
        ];
        assert_eq!(
            build_pgn(&history, GameResult::WhiteWin),
            "1. e4 e5 2. Nf3 1-0"
        );
    }

    #[test]
    fn pgn_falls_back_to_uci() {
        let history = vec![record("e2e4", None, PlayerColor::White)];
        assert_eq!(build_pgn(&history, GameResult::Draw), "1. e2e4 1/2-1/2");
    }

    #[test]
    fn empty_pgn_is_just_the_result() {
        assert_eq!(build_pgn(&[], GameResult::BlackWin), "0-1");
    }
}
