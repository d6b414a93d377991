//! Property tests for the pure pieces: ELO arithmetic, the rating
//! window, and UCI parsing.

use chrono::{Duration, Utc};
use proptest::prelude::*;

use arbiter_server::game::elo::{self, RatedPlayer};
use arbiter_server::matchmaker::{mutually_accept, rating_window};
use arbiter_server::protocol::{
    flip_fen_turn, parse_uci, GameMode, GameResult, PlayerColor, QueueEntry,
};

fn rated(id: &str, rating: i32, provisional: bool) -> RatedPlayer {
    RatedPlayer {
        player_id: id.to_string(),
        rating,
        is_provisional: provisional,
    }
}

fn queue_entry(rating: i32, age_secs: i64, now: chrono::DateTime<Utc>) -> QueueEntry {
    let joined_at = now - Duration::seconds(age_secs);
    QueueEntry {
        player_id: format!("p{rating}"),
        display_name: format!("p{rating}"),
        rating,
        is_provisional: false,
        game_mode: GameMode::Blitz,
        joined_at,
        min_rating: rating - 150,
        max_rating: rating + 150,
        expires_at: joined_at + Duration::seconds(30),
        origin: None,
    }
}

proptest! {
    #[test]
    fn elo_deltas_are_bounded_by_k(
        white_rating in 100..3000_i32,
        black_rating in 100..3000_i32,
        white_provisional in any::<bool>(),
        black_provisional in any::<bool>(),
        result_index in 0..3_usize,
        move_count in 0..60_usize,
    ) {
        let result = [GameResult::WhiteWin, GameResult::BlackWin, GameResult::Draw][result_index];
        let (white, black) = elo::compute_changes(
            &rated("w", white_rating, white_provisional),
            &rated("b", black_rating, black_provisional),
            result,
            move_count,
        );

        let white_k = if white_provisional { 40 } else { 20 };
        let black_k = if black_provisional { 40 } else { 20 };
        prop_assert!(white.change.abs() <= white_k);
        prop_assert!(black.change.abs() <= black_k);

        prop_assert_eq!(white.new_rating, white.old_rating + white.change);
        prop_assert_eq!(black.new_rating, black.old_rating + black.change);

        // The winner never loses points, the loser never gains.
        match result {
            GameResult::WhiteWin => {
                prop_assert!(white.change >= 0);
                prop_assert!(black.change <= 0);
            }
            GameResult::BlackWin => {
                prop_assert!(white.change <= 0);
                prop_assert!(black.change >= 0);
            }
            GameResult::Draw => {
                // The higher-rated side can only lose points in a draw.
                if white_rating > black_rating {
                    prop_assert!(white.change <= 0);
                } else if black_rating > white_rating {
                    prop_assert!(black.change <= 0);
                }
            }
        }

        // A provisional flag never appears out of nowhere.
        prop_assert!(!white.is_provisional || white.was_provisional);
        prop_assert!(!black.is_provisional || black.was_provisional);
    }

    #[test]
    fn expected_scores_are_complementary(a in 100..3000_i32, b in 100..3000_i32) {
        let sum = elo::expected_score(a, b) + elo::expected_score(b, a);
        prop_assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rating_window_is_monotone_and_capped(age in 0.0..200.0_f64, delta in 0.0..50.0_f64) {
        let now = rating_window(age);
        let later = rating_window(age + delta);
        prop_assert!(later >= now);
        prop_assert!(now >= 150);
        prop_assert!(now <= 600);
    }

    #[test]
    fn acceptance_matches_the_window_predicate(
        rating_a in 800..2400_i32,
        rating_b in 800..2400_i32,
        age_a in 0..29_i64,
        age_b in 0..29_i64,
    ) {
        let now = Utc::now();
        let a = queue_entry(rating_a, age_a, now);
        let b = queue_entry(rating_b, age_b, now);

        // Acceptance must hold in both directions for the same mode.
        let expected = (rating_a - rating_b).abs() <= rating_window(age_a as f64)
            && (rating_b - rating_a).abs() <= rating_window(age_b as f64);
        prop_assert_eq!(mutually_accept(&a, &b, now), expected);
    }

    #[test]
    fn uci_round_trips_for_valid_squares(
        from_file in 0..8_usize,
        from_rank in 0..8_usize,
        to_file in 0..8_usize,
        to_rank in 0..8_usize,
        promotion in prop::option::of(prop::sample::select(vec!['q', 'r', 'b', 'n'])),
    ) {
        let files = ['a', 'b', 'c', 'd', 'e', 'f', 'g', 'h'];
        let mut uci = format!(
            "{}{}{}{}",
            files[from_file],
            from_rank + 1,
            files[to_file],
            to_rank + 1
        );
        if let Some(piece) = promotion {
            uci.push(piece);
        }

        let parsed = parse_uci(&uci).expect("valid uci");
        prop_assert_eq!(parsed.from, uci[0..2].to_string());
        prop_assert_eq!(parsed.to, uci[2..4].to_string());
        prop_assert_eq!(parsed.promotion, promotion);
    }

    #[test]
    fn wrong_length_uci_never_parses(s in "[a-h1-8]{0,3}") {
        prop_assert!(parse_uci(&s).is_err());
    }

    #[test]
    fn fen_flip_is_an_involution(
        board in "[rnbqkpRNBQKP1-8/]{10,40}",
        turn in prop::sample::select(vec!["w", "b"]),
        rest in "(KQkq|-) - [0-9]{1,2} [0-9]{1,2}",
    ) {
        let fen = format!("{board} {turn} {rest}");
        let flipped = flip_fen_turn(&fen);
        prop_assert_ne!(&flipped, &fen);
        prop_assert_eq!(flip_fen_turn(&flipped), fen);
    }
}

#[test]
fn equal_draw_is_symmetric() {
    let (white, black) = elo::compute_changes(
        &rated("w", 1500, false),
        &rated("b", 1500, false),
        GameResult::Draw,
        10,
    );
    assert_eq!(white.change, 0);
    assert_eq!(black.change, 0);
}

#[test]
fn alternation_invariant_holds_for_colors() {
    // White always moves first and colors alternate.
    let sequence: Vec<PlayerColor> = (0..9)
        .map(|i| {
            if i % 2 == 0 {
                PlayerColor::White
            } else {
                PlayerColor::Black
            }
        })
        .collect();
    for pair in sequence.windows(2) {
        assert_eq!(pair[1], pair[0].opposite());
    }
    assert_eq!(sequence[0], PlayerColor::White);
}
