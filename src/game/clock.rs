//! Per-game clock state.
//!
//! The clock is advanced lazily: `last_update` marks the instant the
//! current turn last consumed time, and every tick or move subtracts the
//! elapsed span from the side to move.

use tokio::time::Instant;

use crate::protocol::{ClockSnapshot, GameMode, PlayerColor};

#[derive(Debug, Clone)]
pub(crate) struct ClockState {
    pub white_remaining_ms: i64,
    pub black_remaining_ms: i64,
    pub white_increment_ms: u64,
    pub black_increment_ms: u64,
    pub current_turn: PlayerColor,
    pub last_update: Instant,
}

impl ClockState {
    /// Fresh clock from the game-mode defaults. White is on turn.
    pub fn new(mode: GameMode, now: Instant) -> Self {
        let initial = mode.initial_time_ms() as i64;
        Self {
            white_remaining_ms: initial,
            black_remaining_ms: initial,
            white_increment_ms: mode.increment_ms(),
            black_increment_ms: mode.increment_ms(),
            current_turn: PlayerColor::White,
            last_update: now,
        }
    }

    /// Restore a persisted clock; the paused span between snapshot and
    /// restore is not charged to anyone.
    pub fn from_snapshot(snapshot: &ClockSnapshot, now: Instant) -> Self {
        Self {
            white_remaining_ms: snapshot.white_remaining_ms,
            black_remaining_ms: snapshot.black_remaining_ms,
            white_increment_ms: snapshot.white_increment_ms,
            black_increment_ms: snapshot.black_increment_ms,
            current_turn: snapshot.current_turn,
            last_update: now,
        }
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            white_remaining_ms: self.white_remaining_ms,
            black_remaining_ms: self.black_remaining_ms,
            white_increment_ms: self.white_increment_ms,
            black_increment_ms: self.black_increment_ms,
            current_turn: self.current_turn,
        }
    }

    pub fn remaining_ms(&self, color: PlayerColor) -> i64 {
        match color {
            PlayerColor::White => self.white_remaining_ms,
            PlayerColor::Black => self.black_remaining_ms,
        }
    }

    fn remaining_ms_mut(&mut self, color: PlayerColor) -> &mut i64 {
        match color {
            PlayerColor::White => &mut self.white_remaining_ms,
            PlayerColor::Black => &mut self.black_remaining_ms,
        }
    }

    fn increment_ms(&self, color: PlayerColor) -> u64 {
        match color {
            PlayerColor::White => self.white_increment_ms,
            PlayerColor::Black => self.black_increment_ms,
        }
    }

    /// Charge the time consumed since `last_update` to the side to move
    /// and return its remaining time. `last_update` is only advanced when
    /// the side survives the charge; a flagged clock stays frozen at the
    /// moment it flagged.
    pub fn elapse(&mut self, now: Instant) -> i64 {
        let elapsed_ms = now.saturating_duration_since(self.last_update).as_millis() as i64;
        let turn = self.current_turn;
        let remaining = self.remaining_ms_mut(turn);
        *remaining -= elapsed_ms;
        let left = *remaining;
        if left > 0 {
            self.last_update = now;
        }
        left
    }

    /// Settle a played move: charge the mover for its thinking time,
    /// credit its increment, flip the turn.
    pub fn apply_move(&mut self, now: Instant) {
        let mover = self.current_turn;
        let elapsed_ms = now.saturating_duration_since(self.last_update).as_millis() as i64;
        let increment = self.increment_ms(mover) as i64;
        let remaining = self.remaining_ms_mut(mover);
        *remaining = *remaining - elapsed_ms + increment;
        self.current_turn = mover.opposite();
        self.last_update = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn new_clock_loads_mode_defaults() {
        let clock = ClockState::new(GameMode::Blitz, Instant::now());
        assert_eq!(clock.white_remaining_ms, 180_000);
        assert_eq!(clock.black_remaining_ms, 180_000);
        assert_eq!(clock.white_increment_ms, 1_000);
        assert_eq!(clock.current_turn, PlayerColor::White);
    }

    #[tokio::test(start_paused = true)]
    async fn elapse_charges_only_the_side_to_move() {
        let mut clock = ClockState::new(GameMode::Blitz, Instant::now());
        tokio::time::advance(Duration::from_millis(2_500)).await;
        let left = clock.elapse(Instant::now());
        assert_eq!(left, 177_500);
        assert_eq!(clock.black_remaining_ms, 180_000);
    }

    #[tokio::test(start_paused = true)]
    async fn apply_move_credits_increment_and_flips_turn() {
        let mut clock = ClockState::new(GameMode::Blitz, Instant::now());
        tokio::time::advance(Duration::from_millis(4_000)).await;
        clock.apply_move(Instant::now());
        // 180_000 - 4_000 + 1_000 increment
        assert_eq!(clock.white_remaining_ms, 177_000);
        assert_eq!(clock.current_turn, PlayerColor::Black);
    }

    #[tokio::test(start_paused = true)]
    async fn flagging_returns_non_positive_remaining() {
        let mut clock = ClockState::new(GameMode::Bullet, Instant::now());
        tokio::time::advance(Duration::from_millis(60_001)).await;
        let left = clock.elapse(Instant::now());
        assert!(left <= 0);
    }

    #[tokio::test(start_paused = true)]
    async fn time_conservation_across_moves() {
        // remaining + consumed == initial + increments
        let start = Instant::now();
        let mut clock = ClockState::new(GameMode::Blitz, start);
        let mut white_consumed = 0_i64;
        let mut white_increments = 0_i64;

        for _ in 0..5 {
            tokio::time::advance(Duration::from_millis(1_200)).await;
            white_consumed += 1_200;
            white_increments += clock.white_increment_ms as i64;
            clock.apply_move(Instant::now()); // white moves
            tokio::time::advance(Duration::from_millis(700)).await;
            clock.apply_move(Instant::now()); // black moves
        }

        assert_eq!(
            clock.white_remaining_ms + white_consumed,
            180_000 + white_increments
        );
    }
}
