//! Inbound frame handling and the clock tick.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;

use crate::protocol::{
    flip_fen_turn, parse_uci, ClientFrame, ErrorCode, GameEndReason, GameMove, GameResult,
    GameStatus, MoveBroadcastPayload, MoveRecord, ServerFrame,
};

use super::clock::ClockState;
use super::{GameRoom, ParticipantKey};

impl GameRoom {
    pub(super) async fn handle_frame(&mut self, from: ParticipantKey, frame: ClientFrame) {
        let player_id = match from {
            ParticipantKey::Player(player_id) => player_id,
            ParticipantKey::Spectator(_) => {
                // Spectators never mutate game state; pings keep the
                // connection warm and everything else is dropped.
                return;
            }
        };

        match frame {
            ClientFrame::Ping => {
                self.send_to_player(&player_id, Arc::new(ServerFrame::Pong));
            }
            // Any inbound frame already refreshed last_seen in dispatch.
            ClientFrame::Pong => {}
            ClientFrame::Move {
                uci,
                fen,
                san,
                message_id,
            } => {
                self.handle_move(&player_id, uci, fen, san, message_id).await;
            }
            ClientFrame::Resign => self.handle_resign(&player_id).await,
            ClientFrame::Chat { message } => self.handle_chat(&player_id, message),
            ClientFrame::Ready => self.handle_ready(&player_id),
            ClientFrame::GameEnd {
                result,
                reason,
                fen,
            } => {
                self.handle_client_game_end(&player_id, result, reason, fen)
                    .await;
            }
        }
    }

    fn send_error(&self, player_id: &str, code: ErrorCode) {
        self.send_to_player(
            &player_id.to_string(),
            Arc::new(ServerFrame::Error {
                code,
                message: code.description().to_string(),
            }),
        );
    }

    async fn handle_move(
        &mut self,
        player_id: &str,
        uci: String,
        fen: Option<String>,
        san: Option<String>,
        message_id: Option<String>,
    ) {
        if self.status != GameStatus::Playing {
            self.send_error(player_id, ErrorCode::GameNotPlaying);
            return;
        }

        let parsed = match parse_uci(&uci) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::debug!(game_id = %self.id, %player_id, error = %err, "Rejected move");
                self.send_error(player_id, ErrorCode::InvalidMoveFormat);
                return;
            }
        };

        let Some(mover_color) = self.players.get(player_id).map(|session| session.color) else {
            self.send_error(player_id, ErrorCode::GameNotPlaying);
            return;
        };
        let Some(clock) = self.clock.as_mut() else {
            self.send_error(player_id, ErrorCode::GameNotPlaying);
            return;
        };
        if mover_color != clock.current_turn {
            self.send_error(player_id, ErrorCode::NotYourTurn);
            return;
        }

        let timestamp = Utc::now();
        self.game_state.moves.push(GameMove {
            from: parsed.from.clone(),
            to: parsed.to.clone(),
            promotion: parsed.promotion,
            timestamp,
        });
        let record = MoveRecord {
            uci: uci.trim().to_string(),
            san,
            timestamp,
            made_by: mover_color,
        };
        self.move_history.push(record.clone());
        self.state_version += 1;

        // The client's FEN is authoritative; without one, only the
        // side-to-move field can be maintained.
        self.game_state.fen = match fen {
            Some(fen) => fen,
            None => flip_fen_turn(&self.game_state.fen),
        };

        let now = Instant::now();
        // Clock was checked above; re-borrow after the state mutations.
        if let Some(clock) = self.clock.as_mut() {
            clock.apply_move(now);
        }

        self.persist_snapshot().await;

        if let Some(message_id) = message_id {
            self.send_to_player(
                &player_id.to_string(),
                Arc::new(ServerFrame::Ack {
                    message_id,
                    state_version: self.state_version,
                }),
            );
        }

        let Some(clock_snapshot) = self.clock.as_ref().map(ClockState::snapshot) else {
            return;
        };
        self.broadcast_all(&Arc::new(ServerFrame::Move(Box::new(MoveBroadcastPayload {
            record,
            game_state: self.game_state.clone(),
            clock: clock_snapshot,
            state_version: self.state_version,
        }))));
    }

    async fn handle_resign(&mut self, player_id: &str) {
        if self.status != GameStatus::Playing {
            self.send_error(player_id, ErrorCode::GameNotPlaying);
            return;
        }
        let Some(color) = self.players.get(player_id).map(|session| session.color) else {
            return;
        };

        let outcome = GameResult::win_for(color.opposite());
        // The explicit resign frame precedes game_ended so the opponent UI
        // can distinguish resignation from abandonment.
        self.send_to_opponent(
            &player_id.to_string(),
            Arc::new(ServerFrame::Resign {
                resigned_by: color,
                outcome,
            }),
        );
        tracing::info!(game_id = %self.id, %player_id, "Player resigned");
        self.end_game(outcome, GameEndReason::Resignation).await;
    }

    fn handle_chat(&mut self, player_id: &str, message: String) {
        if message.chars().count() > self.deps.config.game.max_chat_length {
            self.send_error(player_id, ErrorCode::ChatTooLong);
            return;
        }
        let Some(session) = self.players.get(player_id) else {
            return;
        };
        let frame = Arc::new(ServerFrame::Chat {
            from: session.player_id.clone(),
            display_name: session.display_name.clone(),
            message,
        });
        self.send_to_opponent(&player_id.to_string(), frame.clone());
        self.broadcast_spectators(&frame);
    }

    fn handle_ready(&mut self, player_id: &str) {
        if let Some(session) = self.players.get_mut(player_id) {
            session.ready = true;
        }
        self.send_to_opponent(&player_id.to_string(), Arc::new(ServerFrame::OpponentReady));
    }

    /// The server trusts the client's terminal determination; only the
    /// vocabulary is validated.
    async fn handle_client_game_end(
        &mut self,
        player_id: &str,
        result: String,
        reason: String,
        fen: Option<String>,
    ) {
        if self.status != GameStatus::Playing {
            self.send_error(player_id, ErrorCode::GameNotPlaying);
            return;
        }

        let (Ok(result), Ok(reason)) = (
            result.parse::<GameResult>(),
            reason.parse::<GameEndReason>(),
        ) else {
            self.send_error(player_id, ErrorCode::InvalidGameEnd);
            return;
        };
        if !reason.is_client_declarable() {
            self.send_error(player_id, ErrorCode::InvalidGameEnd);
            return;
        }

        if let Some(fen) = fen {
            self.game_state.fen = fen;
        }
        tracing::info!(
            game_id = %self.id,
            %player_id,
            ?result,
            ?reason,
            "Client declared terminal state"
        );
        self.end_game(result, reason).await;
    }

    /// One 100 ms clock tick. Any `end_game` here cancels the loop before
    /// returning, and the status re-check makes late ticks harmless.
    pub(super) async fn handle_clock_tick(&mut self) {
        if self.status != GameStatus::Playing {
            return;
        }
        let Some(clock) = self.clock.as_mut() else {
            return;
        };

        let flagged = clock.current_turn;
        let remaining = clock.elapse(Instant::now());
        if remaining <= 0 {
            self.stop_clock_loop();
            tracing::info!(game_id = %self.id, color = %flagged, "Flag fell");
            self.end_game(
                GameResult::win_for(flagged.opposite()),
                GameEndReason::Timeout,
            )
            .await;
            return;
        }

        let Some(snapshot) = self.clock.as_ref().map(ClockState::snapshot) else {
            return;
        };
        self.broadcast_all(&Arc::new(ServerFrame::ClockUpdate { clock: snapshot }));
    }
}
