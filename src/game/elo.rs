//! ELO rating arithmetic applied at settlement.

use crate::protocol::{EloRatingChange, GameResult, PlayerColor};

/// K-factor: provisional players move faster through the ladder.
#[must_use]
pub fn k_factor(provisional: bool) -> f64 {
    if provisional {
        40.0
    } else {
        20.0
    }
}

/// Expected score of a player rated `rating` against `opponent`.
#[must_use]
pub fn expected_score(rating: i32, opponent: i32) -> f64 {
    1.0 / (1.0 + 10_f64.powf(f64::from(opponent - rating) / 400.0))
}

/// Signed rating delta for one side of a match.
#[must_use]
pub fn rating_delta(rating: i32, opponent: i32, provisional: bool, actual_score: f64) -> i32 {
    let expected = expected_score(rating, opponent);
    (k_factor(provisional) * (actual_score - expected)).round() as i32
}

/// Inputs for one side of the settlement computation.
#[derive(Debug, Clone)]
pub struct RatedPlayer {
    pub player_id: String,
    pub rating: i32,
    pub is_provisional: bool,
}

/// Compute both players' rating changes for a finished game.
///
/// `move_count` stands in for games-played when deciding whether a
/// provisional rating graduates; the store's counter supersedes it during
/// the ranked ratings merge.
#[must_use]
pub fn compute_changes(
    white: &RatedPlayer,
    black: &RatedPlayer,
    result: GameResult,
    move_count: usize,
) -> (EloRatingChange, EloRatingChange) {
    let white_delta = rating_delta(
        white.rating,
        black.rating,
        white.is_provisional,
        result.score_for(PlayerColor::White),
    );
    let black_delta = rating_delta(
        black.rating,
        white.rating,
        black.is_provisional,
        result.score_for(PlayerColor::Black),
    );

    let change_for = |player: &RatedPlayer, delta: i32| EloRatingChange {
        player_id: player.player_id.clone(),
        old_rating: player.rating,
        new_rating: player.rating + delta,
        change: delta,
        was_provisional: player.is_provisional,
        is_provisional: player.is_provisional && move_count < 20,
    };

    (change_for(white, white_delta), change_for(black, black_delta))
}
