//! Actor-level game room tests. Rooms are driven directly through their
//! handles with channel-backed connections; tokio's paused clock makes
//! the 100 ms tick loop, the heartbeat, and the abandonment timer fully
//! deterministic.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use arbiter_server::config::Config;
use arbiter_server::game::{
    ConnectMode, ConnectParams, GameRegistry, GameRoomHandle, GameRoomSeed, Outbound,
    ParticipantKey, SeedPlayers,
};
use arbiter_server::lobby::directory::InMemoryLobbyList;
use arbiter_server::protocol::{
    ClientFrame, ErrorCode, GameEndReason, GameMode, GameResult, GameStatus, MatchType,
    PlayerColor, PlayerDescriptor, ServerFrame,
};
use arbiter_server::store::{paths, DocumentStore, InMemoryStore};

/// Generous channel so long paused-time advances never drop frames.
const TEST_CHANNEL_CAPACITY: usize = 8192;

/// Virtual-time budget when waiting for a frame; far beyond any timer in
/// the system so real timers always win the race.
const WAIT_BUDGET: Duration = Duration::from_secs(600);

struct TestEnv {
    store: Arc<InMemoryStore>,
    games: GameRegistry,
}

fn test_env() -> TestEnv {
    let store = Arc::new(InMemoryStore::new());
    let games = GameRegistry::new(
        Arc::new(Config::default()),
        store.clone(),
        Arc::new(InMemoryLobbyList::new()),
    );
    TestEnv { store, games }
}

fn player_params(id: &str, rating: i32, color: Option<PlayerColor>) -> ConnectParams {
    ConnectParams {
        player_id: Some(id.to_string()),
        display_name: Some(id.to_string()),
        rating: Some(rating),
        is_provisional: false,
        color,
        mode: ConnectMode::Player,
    }
}

async fn connect(
    room: &GameRoomHandle,
    params: ConnectParams,
) -> (ParticipantKey, mpsc::Receiver<Outbound>) {
    let (tx, rx) = mpsc::channel(TEST_CHANNEL_CAPACITY);
    let key = room.connect(params, tx).await.expect("admission");
    (key, rx)
}

/// Receive until `pred` matches, answering server pings so the heartbeat
/// never times this participant out. Non-matching frames are dropped.
async fn wait_for_frame<F>(
    rx: &mut mpsc::Receiver<Outbound>,
    room: &GameRoomHandle,
    key: &ParticipantKey,
    mut pred: F,
) -> Arc<ServerFrame>
where
    F: FnMut(&ServerFrame) -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT_BUDGET;
    loop {
        let outbound = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("room closed the channel");
        match outbound {
            Outbound::Frame(frame) => {
                if matches!(frame.as_ref(), ServerFrame::Ping) {
                    room.frame(key.clone(), ClientFrame::Pong).await;
                    continue;
                }
                if pred(frame.as_ref()) {
                    return frame;
                }
            }
            Outbound::Close(_) => {}
        }
    }
}

/// Drain everything currently queued without waiting.
fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Outbound> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}

fn frames_of(items: &[Outbound]) -> Vec<&ServerFrame> {
    items
        .iter()
        .filter_map(|item| match item {
            Outbound::Frame(frame) => Some(frame.as_ref()),
            Outbound::Close(_) => None,
        })
        .collect()
}

async fn start_blitz_game(
    env: &TestEnv,
) -> (
    GameRoomHandle,
    (ParticipantKey, mpsc::Receiver<Outbound>),
    (ParticipantKey, mpsc::Receiver<Outbound>),
) {
    let room = env.games.create(GameMode::Blitz, MatchType::Ranked);
    let white = connect(
        &room,
        player_params("white-player", 1500, Some(PlayerColor::White)),
    )
    .await;
    let black = connect(
        &room,
        player_params("black-player", 1500, Some(PlayerColor::Black)),
    )
    .await;
    (room, white, black)
}

#[tokio::test(start_paused = true)]
async fn both_connections_start_the_game() {
    let env = test_env();
    let (room, (white_key, mut white_rx), (black_key, mut black_rx)) =
        start_blitz_game(&env).await;

    let frame = wait_for_frame(&mut white_rx, &room, &white_key, |frame| {
        matches!(frame, ServerFrame::GameStart { .. })
    })
    .await;
    let ServerFrame::GameStart { clock, .. } = frame.as_ref() else {
        unreachable!();
    };
    assert_eq!(clock.white_remaining_ms, 180_000);
    assert_eq!(clock.current_turn, PlayerColor::White);

    wait_for_frame(&mut black_rx, &room, &black_key, |frame| {
        matches!(frame, ServerFrame::GameStart { .. })
    })
    .await;

    let view = room.state().await.expect("state");
    assert_eq!(view.status, GameStatus::Playing);
    assert_eq!(view.players.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn moves_broadcast_and_alternate() {
    let env = test_env();
    let (room, (white_key, mut white_rx), (black_key, mut black_rx)) =
        start_blitz_game(&env).await;

    room.frame(
        white_key.clone(),
        ClientFrame::Move {
            uci: "e2e4".to_string(),
            fen: None,
            san: Some("e4".to_string()),
            message_id: Some("m1".to_string()),
        },
    )
    .await;

    // Sender gets a per-client ack carrying the new version.
    let ack = wait_for_frame(&mut white_rx, &room, &white_key, |frame| {
        matches!(frame, ServerFrame::Ack { .. })
    })
    .await;
    let ServerFrame::Ack {
        message_id,
        state_version,
    } = ack.as_ref()
    else {
        unreachable!();
    };
    assert_eq!(message_id, "m1");
    assert_eq!(*state_version, 1);

    // Both sides observe the move; turn indicator flipped in the FEN.
    let broadcast = wait_for_frame(&mut black_rx, &room, &black_key, |frame| {
        matches!(frame, ServerFrame::Move(_))
    })
    .await;
    let ServerFrame::Move(payload) = broadcast.as_ref() else {
        unreachable!();
    };
    assert_eq!(payload.record.uci, "e2e4");
    assert_eq!(payload.record.made_by, PlayerColor::White);
    assert_eq!(payload.clock.current_turn, PlayerColor::Black);
    assert!(payload.game_state.fen.contains(" b "));
    assert_eq!(payload.state_version, 1);

    // A reply from black bumps the version strictly.
    room.frame(
        black_key.clone(),
        ClientFrame::Move {
            uci: "e7e5".to_string(),
            fen: None,
            san: None,
            message_id: None,
        },
    )
    .await;
    let broadcast = wait_for_frame(&mut white_rx, &room, &white_key, |frame| {
        matches!(frame, ServerFrame::Move(_))
    })
    .await;
    let ServerFrame::Move(payload) = broadcast.as_ref() else {
        unreachable!();
    };
    assert_eq!(payload.state_version, 2);
    assert_eq!(payload.record.made_by, PlayerColor::Black);

    let view = room.state().await.expect("state");
    assert_eq!(view.game_state.moves.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn move_preconditions_reject_without_mutation() {
    let env = test_env();
    let (room, (white_key, mut white_rx), (black_key, mut black_rx)) =
        start_blitz_game(&env).await;

    // UCI length 3.
    room.frame(
        white_key.clone(),
        ClientFrame::Move {
            uci: "e2e".to_string(),
            fen: None,
            san: None,
            message_id: None,
        },
    )
    .await;
    let error = wait_for_frame(&mut white_rx, &room, &white_key, |frame| {
        matches!(frame, ServerFrame::Error { .. })
    })
    .await;
    assert!(matches!(
        error.as_ref(),
        ServerFrame::Error {
            code: ErrorCode::InvalidMoveFormat,
            ..
        }
    ));

    // Out-of-turn move.
    room.frame(
        black_key.clone(),
        ClientFrame::Move {
            uci: "e7e5".to_string(),
            fen: None,
            san: None,
            message_id: None,
        },
    )
    .await;
    let error = wait_for_frame(&mut black_rx, &room, &black_key, |frame| {
        matches!(frame, ServerFrame::Error { .. })
    })
    .await;
    assert!(matches!(
        error.as_ref(),
        ServerFrame::Error {
            code: ErrorCode::NotYourTurn,
            ..
        }
    ));

    let view = room.state().await.expect("state");
    assert_eq!(view.game_state.moves.len(), 0);
    assert_eq!(view.state_version, 0);
}

#[tokio::test(start_paused = true)]
async fn resignation_notifies_opponent_before_game_ended() {
    let env = test_env();
    let (room, (white_key, mut _white_rx), (black_key, mut black_rx)) =
        start_blitz_game(&env).await;

    wait_for_frame(&mut black_rx, &room, &black_key, |frame| {
        matches!(frame, ServerFrame::GameStart { .. })
    })
    .await;

    room.frame(white_key.clone(), ClientFrame::Resign).await;

    // Black must see the explicit resign frame first, then settlement.
    let frame = wait_for_frame(&mut black_rx, &room, &black_key, |frame| {
        matches!(frame, ServerFrame::Resign { .. } | ServerFrame::GameEnded(_))
    })
    .await;
    let ServerFrame::Resign {
        resigned_by,
        outcome,
    } = frame.as_ref()
    else {
        panic!("expected resign before game_ended, got {frame:?}");
    };
    assert_eq!(*resigned_by, PlayerColor::White);
    assert_eq!(*outcome, GameResult::BlackWin);

    let frame = wait_for_frame(&mut black_rx, &room, &black_key, |frame| {
        matches!(frame, ServerFrame::GameEnded(_))
    })
    .await;
    let ServerFrame::GameEnded(payload) = frame.as_ref() else {
        unreachable!();
    };
    assert_eq!(payload.result, GameResult::BlackWin);
    assert_eq!(payload.reason, GameEndReason::Resignation);
}

#[tokio::test(start_paused = true)]
async fn client_declared_checkmate_settles_with_elo_and_history() {
    let env = test_env();
    let (room, (white_key, mut white_rx), (black_key, mut black_rx)) =
        start_blitz_game(&env).await;
    let game_id = room.id;

    // A couple of real moves before the declared mate.
    room.frame(
        white_key.clone(),
        ClientFrame::Move {
            uci: "e2e4".to_string(),
            fen: None,
            san: Some("e4".to_string()),
            message_id: None,
        },
    )
    .await;
    wait_for_frame(&mut black_rx, &room, &black_key, |frame| {
        matches!(frame, ServerFrame::Move(_))
    })
    .await;
    room.frame(
        black_key.clone(),
        ClientFrame::Move {
            uci: "f7f6".to_string(),
            fen: None,
            san: None,
            message_id: None,
        },
    )
    .await;

    room.frame(
        white_key.clone(),
        ClientFrame::GameEnd {
            result: "white_win".to_string(),
            reason: "checkmate".to_string(),
            fen: None,
        },
    )
    .await;

    for (key, rx) in [(&white_key, &mut white_rx), (&black_key, &mut black_rx)] {
        let frame = wait_for_frame(rx, &room, key, |frame| {
            matches!(frame, ServerFrame::GameEnded(_))
        })
        .await;
        let ServerFrame::GameEnded(payload) = frame.as_ref() else {
            unreachable!();
        };
        assert_eq!(payload.result, GameResult::WhiteWin);
        assert_eq!(payload.reason, GameEndReason::Checkmate);

        // Equal 1500s, K=20: winner +10, loser -10.
        let changes = &payload.elo_changes;
        assert_eq!(changes.len(), 2);
        let white_change = changes
            .iter()
            .find(|c| c.player_id == "white-player")
            .expect("white delta");
        let black_change = changes
            .iter()
            .find(|c| c.player_id == "black-player")
            .expect("black delta");
        assert_eq!(white_change.change, 10);
        assert_eq!(black_change.change, -10);

        let history = payload.match_history.as_ref().expect("history");
        assert_eq!(history.move_history.len(), 2);
        assert_eq!(history.match_type, MatchType::Ranked);
        assert!(history.pgn.as_deref().unwrap_or("").ends_with("1-0"));
    }

    // Fire-and-forget persistence lands under both players' collections.
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    for player in ["white-player", "black-player"] {
        let doc = env
            .store
            .get_document(&paths::match_history(player, game_id))
            .await
            .expect("store read")
            .expect("match history persisted");
        assert_eq!(doc["result"], "white_win");

        let ratings = env
            .store
            .get_document(&paths::ratings_profile(player))
            .await
            .expect("store read")
            .expect("ratings merged");
        assert_eq!(ratings["totalGamesPlayed"], 1);
    }
    let white_ratings = env
        .store
        .get_document(&paths::ratings_profile("white-player"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(white_ratings["eloRating"], 1510);

    // endGame is idempotent: a second declaration produces no second
    // game_ended emission.
    room.frame(
        white_key.clone(),
        ClientFrame::GameEnd {
            result: "white_win".to_string(),
            reason: "checkmate".to_string(),
            fen: None,
        },
    )
    .await;
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    let frames = drain(&mut black_rx);
    let endings = frames_of(&frames)
        .iter()
        .filter(|frame| matches!(frame, ServerFrame::GameEnded(_)))
        .count();
    assert_eq!(endings, 0, "no duplicate game_ended after settlement");
}

#[tokio::test(start_paused = true)]
async fn unknown_terminal_values_reply_invalid_game_end() {
    let env = test_env();
    let (room, (white_key, mut white_rx), _black) = start_blitz_game(&env).await;

    room.frame(
        white_key.clone(),
        ClientFrame::GameEnd {
            result: "alien_win".to_string(),
            reason: "boredom".to_string(),
            fen: None,
        },
    )
    .await;
    let error = wait_for_frame(&mut white_rx, &room, &white_key, |frame| {
        matches!(frame, ServerFrame::Error { .. })
    })
    .await;
    assert!(matches!(
        error.as_ref(),
        ServerFrame::Error {
            code: ErrorCode::InvalidGameEnd,
            ..
        }
    ));

    let view = room.state().await.expect("state");
    assert_eq!(view.status, GameStatus::Playing);
}

#[tokio::test(start_paused = true)]
async fn blitz_clock_runs_out_and_flags_black() {
    let env = test_env();
    let (room, (white_key, mut white_rx), (black_key, mut black_rx)) =
        start_blitz_game(&env).await;

    // White plays immediately; black never moves. Both keep answering
    // pings, so only the clock can end this game.
    room.frame(
        white_key.clone(),
        ClientFrame::Move {
            uci: "e2e4".to_string(),
            fen: None,
            san: None,
            message_id: None,
        },
    )
    .await;

    let frame = wait_for_frame(&mut black_rx, &room, &black_key, |frame| {
        matches!(frame, ServerFrame::GameEnded(_))
    })
    .await;
    let ServerFrame::GameEnded(payload) = frame.as_ref() else {
        unreachable!();
    };
    assert_eq!(payload.result, GameResult::WhiteWin);
    assert_eq!(payload.reason, GameEndReason::Timeout);

    wait_for_frame(&mut white_rx, &room, &white_key, |frame| {
        matches!(frame, ServerFrame::GameEnded(_))
    })
    .await;

    let view = room.state().await.expect("state");
    assert_eq!(view.status, GameStatus::Finished);
    let clock = view.clock.expect("clock");
    assert!(clock.black_remaining_ms <= 0);
}

#[tokio::test(start_paused = true)]
async fn abandonment_fires_after_sixty_seconds() {
    let env = test_env();
    let (room, (white_key, _white_rx), (black_key, mut black_rx)) = start_blitz_game(&env).await;

    room.closed(white_key.clone()).await;

    let frame = wait_for_frame(&mut black_rx, &room, &black_key, |frame| {
        matches!(frame, ServerFrame::OpponentStatus { connected: false, .. })
    })
    .await;
    let ServerFrame::OpponentStatus {
        reconnect_timeout_ms,
        ..
    } = frame.as_ref()
    else {
        unreachable!();
    };
    assert_eq!(*reconnect_timeout_ms, Some(60_000));

    let frame = wait_for_frame(&mut black_rx, &room, &black_key, |frame| {
        matches!(frame, ServerFrame::GameEnded(_))
    })
    .await;
    let ServerFrame::GameEnded(payload) = frame.as_ref() else {
        unreachable!();
    };
    assert_eq!(payload.result, GameResult::BlackWin);
    assert_eq!(payload.reason, GameEndReason::OpponentAbandoned);
}

#[tokio::test(start_paused = true)]
async fn reconnection_at_fifty_nine_seconds_cancels_abandonment() {
    let env = test_env();
    let (room, (white_key, white_rx), (black_key, mut black_rx)) = start_blitz_game(&env).await;
    drop(white_rx);

    room.closed(white_key.clone()).await;
    wait_for_frame(&mut black_rx, &room, &black_key, |frame| {
        matches!(frame, ServerFrame::OpponentStatus { connected: false, .. })
    })
    .await;

    tokio::time::advance(Duration::from_secs(59)).await;
    let _ = drain(&mut black_rx);

    // Reattach; the pending timer must become a no-op.
    let (_key, mut white_rx2) = connect(
        &room,
        player_params("white-player", 1500, Some(PlayerColor::Black)),
    )
    .await;
    let ready = wait_for_frame(&mut white_rx2, &room, &white_key, |frame| {
        matches!(frame, ServerFrame::Ready(_))
    })
    .await;
    let ServerFrame::Ready(payload) = ready.as_ref() else {
        unreachable!();
    };
    // Color override in the URL is ignored on reconnection.
    assert_eq!(payload.you.color, PlayerColor::White);

    tokio::time::advance(Duration::from_secs(10)).await;
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    let frames = drain(&mut black_rx);
    assert!(
        !frames_of(&frames)
            .iter()
            .any(|frame| matches!(frame, ServerFrame::GameEnded(_))),
        "reconnection must cancel the abandonment timer"
    );
    let view = room.state().await.expect("state");
    assert_eq!(view.status, GameStatus::Playing);

    // A second disconnect re-arms it.
    room.closed(white_key.clone()).await;
    let frame = wait_for_frame(&mut black_rx, &room, &black_key, |frame| {
        matches!(frame, ServerFrame::GameEnded(_))
    })
    .await;
    let ServerFrame::GameEnded(payload) = frame.as_ref() else {
        unreachable!();
    };
    assert_eq!(payload.reason, GameEndReason::OpponentAbandoned);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_silence_force_closes_and_leads_to_abandonment() {
    let env = test_env();
    let (room, (white_key, mut white_rx), (black_key, mut black_rx)) =
        start_blitz_game(&env).await;

    // Black answers pings; white goes silent. After >30 s of silence the
    // room force-closes white's connection with the heartbeat code.
    let deadline = tokio::time::Instant::now() + WAIT_BUDGET;
    let close_code = loop {
        let outbound = tokio::time::timeout_at(deadline, white_rx.recv())
            .await
            .expect("timed out waiting for close")
            .expect("channel open");
        match outbound {
            Outbound::Close(code) => break code,
            Outbound::Frame(_) => {
                // Deliberately no pong.
            }
        }
    };
    assert_eq!(close_code, 1001);

    // The pump reports the close; the abandonment path takes over.
    room.closed(white_key.clone()).await;
    let frame = wait_for_frame(&mut black_rx, &room, &black_key, |frame| {
        matches!(frame, ServerFrame::GameEnded(_))
    })
    .await;
    let ServerFrame::GameEnded(payload) = frame.as_ref() else {
        unreachable!();
    };
    assert_eq!(payload.reason, GameEndReason::OpponentAbandoned);
    assert_eq!(payload.result, GameResult::BlackWin);
}

#[tokio::test(start_paused = true)]
async fn moves_after_settlement_get_game_not_playing() {
    let env = test_env();
    let (room, (white_key, mut white_rx), (black_key, _black_rx)) = start_blitz_game(&env).await;

    room.frame(black_key.clone(), ClientFrame::Resign).await;
    wait_for_frame(&mut white_rx, &room, &white_key, |frame| {
        matches!(frame, ServerFrame::GameEnded(_))
    })
    .await;

    room.frame(
        white_key.clone(),
        ClientFrame::Move {
            uci: "e2e4".to_string(),
            fen: None,
            san: None,
            message_id: None,
        },
    )
    .await;
    let error = wait_for_frame(&mut white_rx, &room, &white_key, |frame| {
        matches!(frame, ServerFrame::Error { .. })
    })
    .await;
    assert!(matches!(
        error.as_ref(),
        ServerFrame::Error {
            code: ErrorCode::GameNotPlaying,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn third_player_is_rejected_and_spectators_capped() {
    let store = Arc::new(InMemoryStore::new());
    let mut config = Config::default();
    config.game.max_spectators = 1;
    let games = GameRegistry::new(
        Arc::new(config),
        store.clone(),
        Arc::new(InMemoryLobbyList::new()),
    );

    let room = games.create(GameMode::Rapid, MatchType::Ranked);
    let _white = connect(&room, player_params("w", 1400, None)).await;
    let _black = connect(&room, player_params("b", 1400, None)).await;

    let (tx, _rx) = mpsc::channel(8);
    let err = room
        .connect(player_params("intruder", 1400, None), tx)
        .await
        .expect_err("third player must be rejected");
    assert_eq!(err.close_code(), 1002);

    // Missing player id is a policy error.
    let (tx, _rx) = mpsc::channel(8);
    let err = room
        .connect(
            ConnectParams {
                player_id: None,
                ..ConnectParams::default()
            },
            tx,
        )
        .await
        .expect_err("missing id rejected");
    assert_eq!(err.close_code(), 1002);

    // One spectator fits, the second exceeds the cap.
    let (tx, mut spectator_rx) = mpsc::channel(TEST_CHANNEL_CAPACITY);
    let spectator = ConnectParams {
        player_id: Some("watcher".to_string()),
        display_name: Some("Watcher".to_string()),
        mode: ConnectMode::Spectator,
        ..ConnectParams::default()
    };
    room.connect(spectator.clone(), tx)
        .await
        .expect("first spectator admitted");
    let state_frame = tokio::time::timeout(Duration::from_secs(5), spectator_rx.recv())
        .await
        .expect("spectator snapshot")
        .expect("channel open");
    match state_frame {
        Outbound::Frame(frame) => {
            assert!(matches!(frame.as_ref(), ServerFrame::SpectatorState(_)));
        }
        Outbound::Close(code) => panic!("unexpected close {code}"),
    }

    let (tx, _rx) = mpsc::channel(8);
    let err = room
        .connect(spectator, tx)
        .await
        .expect_err("spectator cap enforced");
    assert_eq!(err.close_code(), 1008);
}

#[tokio::test(start_paused = true)]
async fn lobby_seeded_unrated_game_settles_with_zero_deltas() {
    let env = test_env();
    let room = env.games.create(GameMode::Blitz, MatchType::Friendly);
    room.init(GameRoomSeed {
        game_mode: GameMode::Blitz,
        is_lobby_mode: true,
        is_unrated: true,
        lobby_id: Some(uuid::Uuid::new_v4()),
        opening_name: None,
        starting_fen: None,
        players: SeedPlayers {
            white: Some(PlayerDescriptor {
                player_id: "creator".to_string(),
                display_name: "Creator".to_string(),
                rating: 1600,
                is_provisional: false,
            }),
            black: Some(PlayerDescriptor {
                player_id: "joiner".to_string(),
                display_name: "Joiner".to_string(),
                rating: 1400,
                is_provisional: false,
            }),
        },
    })
    .await
    .expect("seed");

    // Pre-registered slots fill by player id; URL identity is ignored.
    let (creator_key, mut creator_rx) = connect(&room, player_params("creator", 9999, None)).await;
    let (joiner_key, mut joiner_rx) = connect(&room, player_params("joiner", 1, None)).await;

    let ready = wait_for_frame(&mut creator_rx, &room, &creator_key, |frame| {
        matches!(frame, ServerFrame::Ready(_))
    })
    .await;
    let ServerFrame::Ready(payload) = ready.as_ref() else {
        unreachable!();
    };
    assert!(payload.is_unrated);
    assert_eq!(payload.you.color, PlayerColor::White);
    assert_eq!(payload.you.rating, 1600);

    room.frame(creator_key.clone(), ClientFrame::Resign).await;
    let frame = wait_for_frame(&mut joiner_rx, &room, &joiner_key, |frame| {
        matches!(frame, ServerFrame::GameEnded(_))
    })
    .await;
    let ServerFrame::GameEnded(payload) = frame.as_ref() else {
        unreachable!();
    };
    assert!(payload.elo_changes.iter().all(|change| change.change == 0));
}

#[tokio::test(start_paused = true)]
async fn snapshots_allow_rehydrating_a_playing_room() {
    let env = test_env();
    let (room, (white_key, mut white_rx), _black) = start_blitz_game(&env).await;
    let game_id = room.id;

    room.frame(
        white_key.clone(),
        ClientFrame::Move {
            uci: "d2d4".to_string(),
            fen: None,
            san: None,
            message_id: None,
        },
    )
    .await;
    wait_for_frame(&mut white_rx, &room, &white_key, |frame| {
        matches!(frame, ServerFrame::Move(_))
    })
    .await;

    let snapshot = env
        .store
        .get_document(&paths::game_snapshot(game_id))
        .await
        .expect("store read")
        .expect("snapshot persisted");
    assert_eq!(snapshot["status"], "playing");
    assert_eq!(snapshot["state_version"], 1);
    assert_eq!(snapshot["move_history"].as_array().map(Vec::len), Some(1));

    // A second registry sharing the store restores the room on demand.
    let other_games = GameRegistry::new(
        Arc::new(Config::default()),
        env.store.clone(),
        Arc::new(InMemoryLobbyList::new()),
    );
    let restored = other_games
        .get_or_restore(game_id)
        .await
        .expect("rehydrated room");
    let view = restored.state().await.expect("state");
    assert_eq!(view.status, GameStatus::Playing);
    assert_eq!(view.game_state.moves.len(), 1);
    assert_eq!(view.players.len(), 2);
    assert!(view.players.iter().all(|player| !player.connected));
}
