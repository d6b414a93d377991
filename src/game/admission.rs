//! Connection admission, disconnects, heartbeats, and game start.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::protocol::{
    close_codes, GameStatus, PlayerColor, ReadyPayload, ServerFrame, SpectatorStatePayload,
};

use super::clock::ClockState;
use super::{
    AdmissionError, ConnectMode, ConnectParams, GameRoom, Outbound, OutboundSender, ParticipantKey,
    PlayerSession, SpectatorSession,
};

impl GameRoom {
    pub(super) async fn handle_connect(
        &mut self,
        params: ConnectParams,
        outbound: OutboundSender,
    ) -> Result<ParticipantKey, AdmissionError> {
        if params.mode == ConnectMode::Spectator {
            return self.admit_spectator(params, outbound);
        }

        let Some(player_id) = params.player_id.clone() else {
            return Err(AdmissionError::MissingPlayerId);
        };

        if self.players.contains_key(&player_id) {
            self.reattach_player(&player_id, outbound);
        } else if let Some(color) = self.reserved_color_for(&player_id) {
            let Some(descriptor) = self.reserved.remove(&color) else {
                return Err(AdmissionError::RoomFull);
            };
            self.players.insert(
                player_id.clone(),
                PlayerSession {
                    player_id: player_id.clone(),
                    display_name: descriptor.display_name,
                    rating: descriptor.rating,
                    is_provisional: descriptor.is_provisional,
                    color,
                    outbound: Some(outbound),
                    last_seen: Instant::now(),
                    connected: true,
                    ready: false,
                },
            );
            tracing::info!(
                game_id = %self.id,
                player_id = %player_id,
                color = %color,
                "Pre-registered player connected"
            );
        } else if self.players.len() < 2 {
            if self.is_lobby_mode && !self.reserved.is_empty() {
                // Lobby games only admit their two registered players.
                return Err(AdmissionError::NotRegistered);
            }
            let color = self.assign_color(params.color);
            self.players.insert(
                player_id.clone(),
                PlayerSession {
                    player_id: player_id.clone(),
                    display_name: params
                        .display_name
                        .clone()
                        .unwrap_or_else(|| player_id.clone()),
                    rating: params.rating.unwrap_or(1200),
                    is_provisional: params.is_provisional,
                    color,
                    outbound: Some(outbound),
                    last_seen: Instant::now(),
                    connected: true,
                    ready: false,
                },
            );
            tracing::info!(
                game_id = %self.id,
                player_id = %player_id,
                color = %color,
                "Player joined"
            );
        } else {
            return Err(AdmissionError::RoomFull);
        }

        self.after_player_admission(&player_id).await;
        Ok(ParticipantKey::Player(player_id))
    }

    fn reserved_color_for(&self, player_id: &str) -> Option<PlayerColor> {
        self.reserved
            .iter()
            .find(|(_, descriptor)| descriptor.player_id == player_id)
            .map(|(color, _)| *color)
    }

    /// URL-provided color wins unless taken; otherwise first player is
    /// white, second is black.
    fn assign_color(&self, requested: Option<PlayerColor>) -> PlayerColor {
        let taken: Vec<PlayerColor> = self.players.values().map(|p| p.color).collect();
        if let Some(color) = requested {
            if !taken.contains(&color) {
                return color;
            }
        }
        if taken.contains(&PlayerColor::White) {
            PlayerColor::Black
        } else {
            PlayerColor::White
        }
    }

    /// Reconnection: identity comes from the existing record; any color
    /// override in the URL is ignored.
    fn reattach_player(&mut self, player_id: &str, outbound: OutboundSender) {
        self.cancel_abandonment_timer(&player_id.to_string());
        if let Some(session) = self.players.get_mut(player_id) {
            session.outbound = Some(outbound);
            session.connected = true;
            session.last_seen = Instant::now();
        }
        tracing::info!(game_id = %self.id, player_id = %player_id, "Player reconnected");
    }

    async fn after_player_admission(&mut self, player_id: &str) {
        let player_id = player_id.to_string();

        // Full snapshot for the joiner, connection transition for the peer.
        if let Some(payload) = self.build_ready_payload(&player_id) {
            self.send_to_player(&player_id, Arc::new(ServerFrame::Ready(Box::new(payload))));
        }
        self.send_to_opponent(
            &player_id,
            Arc::new(ServerFrame::OpponentStatus {
                connected: true,
                reconnect_timeout_ms: None,
            }),
        );

        let both_connected =
            self.players.len() == 2 && self.players.values().all(|session| session.connected);
        if both_connected && matches!(self.status, GameStatus::Waiting | GameStatus::Ready) {
            for session in self.players.values_mut() {
                session.ready = true;
            }
            self.start_game().await;
        } else if self.players.len() < 2 {
            self.send_to_player(
                &player_id,
                Arc::new(ServerFrame::Waiting {
                    message: "Waiting for opponent to connect".to_string(),
                }),
            );
        }
    }

    /// Transition waiting -> ready -> playing in one event-loop turn.
    pub(super) async fn start_game(&mut self) {
        self.status = GameStatus::Ready;
        let now = Instant::now();
        self.clock = Some(ClockState::new(self.game_mode, now));
        self.started_at = Some(Utc::now());
        self.start_clock_loop();

        let player_ids: Vec<String> = self.players.keys().cloned().collect();
        for player_id in &player_ids {
            if let Some(payload) = self.build_ready_payload(player_id) {
                self.send_to_player(player_id, Arc::new(ServerFrame::Ready(Box::new(payload))));
            }
        }

        self.status = GameStatus::Playing;
        let clock = self
            .clock
            .as_ref()
            .map(ClockState::snapshot)
            .unwrap_or_else(|| ClockState::new(self.game_mode, now).snapshot());
        self.broadcast_all(&Arc::new(ServerFrame::GameStart {
            clock,
            state_version: self.state_version,
        }));

        tracing::info!(
            game_id = %self.id,
            game_mode = %self.game_mode,
            "Game started"
        );
        self.persist_snapshot().await;
    }

    pub(super) fn build_ready_payload(&self, player_id: &str) -> Option<ReadyPayload> {
        let session = self.players.get(player_id)?;
        Some(ReadyPayload {
            game_id: self.id,
            status: self.status,
            game_mode: self.game_mode,
            is_unrated: self.is_unrated,
            game_state: self.game_state.clone(),
            clock: self.clock.as_ref().map(ClockState::snapshot),
            state_version: self.state_version,
            you: session.public_info(),
            opponent: self
                .opponent_of(&session.player_id)
                .map(PlayerSession::public_info),
            opening_name: self.opening_name.clone(),
            spectator_count: self.spectators.len(),
        })
    }

    fn admit_spectator(
        &mut self,
        params: ConnectParams,
        outbound: OutboundSender,
    ) -> Result<ParticipantKey, AdmissionError> {
        if self.spectators.len() >= self.deps.config.game.max_spectators {
            return Err(AdmissionError::SpectatorCapacity);
        }

        let spectator_id = Uuid::new_v4();
        let display_name = params
            .display_name
            .or(params.player_id)
            .unwrap_or_else(|| "Spectator".to_string());
        self.spectators.insert(
            spectator_id,
            SpectatorSession {
                display_name,
                outbound: outbound.clone(),
                connected_at: Utc::now(),
            },
        );

        let payload = SpectatorStatePayload {
            game_id: self.id,
            status: self.status,
            game_mode: self.game_mode,
            game_state: self.game_state.clone(),
            clock: self.clock.as_ref().map(ClockState::snapshot),
            state_version: self.state_version,
            white: self
                .player_by_color(PlayerColor::White)
                .map(PlayerSession::public_info),
            black: self
                .player_by_color(PlayerColor::Black)
                .map(PlayerSession::public_info),
            spectator_count: self.spectators.len(),
        };
        let _ = outbound.try_send(Outbound::Frame(Arc::new(ServerFrame::SpectatorState(
            Box::new(payload),
        ))));

        self.broadcast_all(&Arc::new(ServerFrame::SpectatorCount {
            count: self.spectators.len(),
        }));
        tracing::debug!(game_id = %self.id, %spectator_id, "Spectator joined");
        Ok(ParticipantKey::Spectator(spectator_id))
    }

    pub(super) async fn handle_closed(&mut self, from: ParticipantKey) {
        match from {
            ParticipantKey::Spectator(spectator_id) => {
                if self.spectators.remove(&spectator_id).is_some() {
                    self.broadcast_all(&Arc::new(ServerFrame::SpectatorCount {
                        count: self.spectators.len(),
                    }));
                    tracing::debug!(game_id = %self.id, %spectator_id, "Spectator left");
                }
            }
            ParticipantKey::Player(player_id) => {
                let Some(session) = self.players.get_mut(&player_id) else {
                    return;
                };
                if !session.connected {
                    return;
                }
                session.connected = false;
                session.outbound = None;
                tracing::info!(game_id = %self.id, player_id = %player_id, "Player disconnected");

                let reconnect_timeout_ms = self.deps.config.game.abandonment_timeout_ms;
                self.send_to_opponent(
                    &player_id,
                    Arc::new(ServerFrame::OpponentStatus {
                        connected: false,
                        reconnect_timeout_ms: Some(reconnect_timeout_ms),
                    }),
                );

                if matches!(self.status, GameStatus::Ready | GameStatus::Playing) {
                    self.arm_abandonment_timer(&player_id);
                }
            }
        }
    }

    pub(super) async fn handle_abandonment_elapsed(&mut self, player_id: String, generation: u64) {
        // Stale or cancelled timers re-check everything before acting.
        if self.abandon_generations.get(&player_id) != Some(&generation) {
            return;
        }
        if self.status.is_terminal() {
            return;
        }
        let Some(session) = self.players.get(&player_id) else {
            return;
        };
        if session.connected {
            return;
        }

        let winner = session.color.opposite();
        tracing::info!(
            game_id = %self.id,
            player_id = %player_id,
            "Player abandoned the game"
        );
        self.end_game(
            crate::protocol::GameResult::win_for(winner),
            crate::protocol::GameEndReason::OpponentAbandoned,
        )
        .await;
    }

    /// Ping connected players; force-close anyone silent past the
    /// heartbeat window. The close flows back through `handle_closed`.
    pub(super) fn handle_heartbeat_tick(&mut self) {
        let timeout = self.deps.config.game.heartbeat_timeout();
        let now = Instant::now();
        let mut timed_out: Vec<String> = Vec::new();

        for (player_id, session) in &self.players {
            if !session.connected {
                continue;
            }
            if now.saturating_duration_since(session.last_seen) > timeout {
                timed_out.push(player_id.clone());
            } else {
                self.send_to_player(player_id, Arc::new(ServerFrame::Ping));
            }
        }

        for player_id in timed_out {
            tracing::warn!(
                game_id = %self.id,
                player_id = %player_id,
                "Heartbeat timeout, force-closing connection"
            );
            if let Some(session) = self.players.get(&player_id) {
                if let Some(outbound) = &session.outbound {
                    let _ = outbound.try_send(Outbound::Close(close_codes::HEARTBEAT_TIMEOUT));
                }
            }
        }
    }
}
