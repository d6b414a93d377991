//! End-to-end tests over the real HTTP/WebSocket surface: a bound axum
//! server, reqwest for the RPC endpoints, tokio-tungstenite for the
//! streaming channels.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use arbiter_server::config::Config;
use arbiter_server::game::GameRegistry;
use arbiter_server::lobby::directory::InMemoryLobbyList;
use arbiter_server::lobby::LobbyRegistry;
use arbiter_server::matchmaker::{JoinResponse, Matchmaker};
use arbiter_server::protocol::{GameStatus, PlayerColor, ServerFrame};
use arbiter_server::store::InMemoryStore;
use arbiter_server::websocket::{create_router, AppState};

/// Bind a full server on an ephemeral port; returns its base HTTP URL.
async fn start_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let mut config = Config::default();
    config.public_base_url = format!("ws://{addr}");
    let config = Arc::new(config);

    let store = Arc::new(InMemoryStore::new());
    let lobby_list = Arc::new(InMemoryLobbyList::new());
    let games = GameRegistry::new(config.clone(), store.clone(), lobby_list.clone());
    let lobbies = LobbyRegistry::new(
        config.clone(),
        store.clone(),
        lobby_list.clone(),
        games.clone(),
    );
    let matchmaker = Matchmaker::spawn(config.clone(), store, games.clone());

    let state = AppState {
        config: config.clone(),
        games,
        lobbies,
        matchmaker,
    };
    let router = create_router(state, "*");

    tokio::spawn(async move {
        if let Err(err) = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            tracing::error!(error = %err, "Test server failed");
        }
    });

    format!("http://{addr}")
}

async fn queue_join(
    client: &reqwest::Client,
    base: &str,
    player_id: &str,
    rating: i32,
) -> JoinResponse {
    client
        .post(format!("{base}/matchmaking/queue/join"))
        .json(&json!({
            "player_id": player_id,
            "display_name": player_id,
            "rating": rating,
            "game_mode": "blitz",
        }))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("join response")
}

/// Read frames until `pred` matches, answering pings.
async fn wait_for_ws_frame<S, F>(socket: &mut S, mut pred: F) -> ServerFrame
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + SinkExt<Message>
        + Unpin,
    F: FnMut(&ServerFrame) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let message = tokio::time::timeout_at(deadline, socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket open")
            .expect("frame ok");
        let Message::Text(text) = message else {
            continue;
        };
        let frame: ServerFrame = serde_json::from_str(&text).expect("valid server frame");
        if matches!(frame, ServerFrame::Ping) {
            let _ = socket.send(Message::Text(r#"{"type":"pong"}"#.into())).await;
            continue;
        }
        if pred(&frame) {
            return frame;
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn matchmade_game_plays_over_websockets() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    // Two close ratings pair on the second join.
    let first = queue_join(&client, &base, "alice", 1500).await;
    assert!(!first.matched);
    let second = queue_join(&client, &base, "bob", 1520).await;
    assert!(second.matched);
    let bob_match = second.match_info.expect("bob match");

    // Alice polls and receives her parked half of the pairing.
    let delivered = queue_join(&client, &base, "alice", 1500).await;
    assert!(delivered.matched);
    let alice_match = delivered.match_info.expect("alice match");
    assert_eq!(alice_match.game_id, bob_match.game_id);

    // Both connect through the URLs the matchmaker handed out.
    let (mut alice_ws, _) = connect_async(alice_match.connection_url.as_str())
        .await
        .expect("alice connects");
    let (mut bob_ws, _) = connect_async(bob_match.connection_url.as_str())
        .await
        .expect("bob connects");

    let frame = wait_for_ws_frame(&mut alice_ws, |frame| {
        matches!(frame, ServerFrame::GameStart { .. })
    })
    .await;
    let ServerFrame::GameStart { clock, .. } = frame else {
        unreachable!();
    };
    assert_eq!(clock.current_turn, PlayerColor::White);
    wait_for_ws_frame(&mut bob_ws, |frame| {
        matches!(frame, ServerFrame::GameStart { .. })
    })
    .await;

    // White opens; both sides observe the broadcast.
    let (white_ws, black_ws) = if alice_match.color == PlayerColor::White {
        (&mut alice_ws, &mut bob_ws)
    } else {
        (&mut bob_ws, &mut alice_ws)
    };
    white_ws
        .send(Message::Text(
            r#"{"type":"move","data":{"uci":"e2e4","san":"e4"}}"#.into(),
        ))
        .await
        .expect("send move");

    let frame = wait_for_ws_frame(black_ws, |frame| matches!(frame, ServerFrame::Move(_))).await;
    let ServerFrame::Move(payload) = frame else {
        unreachable!();
    };
    assert_eq!(payload.record.uci, "e2e4");
    assert_eq!(payload.state_version, 1);

    // Black resigns; both receive the settlement.
    black_ws
        .send(Message::Text(r#"{"type":"resign"}"#.into()))
        .await
        .expect("send resign");
    let frame =
        wait_for_ws_frame(&mut alice_ws, |frame| matches!(frame, ServerFrame::GameEnded(_))).await;
    let ServerFrame::GameEnded(payload) = frame else {
        unreachable!();
    };
    assert_eq!(payload.result.winner(), Some(PlayerColor::White));
    wait_for_ws_frame(&mut bob_ws, |frame| {
        matches!(frame, ServerFrame::GameEnded(_))
    })
    .await;

    // The RPC state view agrees.
    let view: serde_json::Value = client
        .get(format!("{base}/game/{}/state", alice_match.game_id))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("state json");
    assert_eq!(view["status"], "finished");
}

#[tokio::test(flavor = "multi_thread")]
async fn lobby_flow_over_http_and_ws() {
    let base = start_server().await;
    let client = reqwest::Client::new();
    let lobby_id = uuid::Uuid::new_v4();

    // Creator initialises a private blitz lobby.
    let state: serde_json::Value = client
        .post(format!("{base}/lobby/{lobby_id}/init"))
        .json(&json!({
            "creator": {
                "player_id": "creator",
                "display_name": "Creator",
                "rating": 1500,
                "is_provisional": false,
            },
            "settings": {
                "player_color": "random",
                "game_mode": "blitz",
                "private": true,
            },
        }))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("lobby state");
    assert_eq!(state["status"], "waiting");

    // Creator opens the live channel.
    let ws_base = base.replace("http://", "ws://");
    let (mut creator_ws, _) = connect_async(format!(
        "{ws_base}/lobby/{lobby_id}/ws?playerId=creator"
    ))
    .await
    .expect("creator channel");

    // Joiner calls join and gets the symmetric payload.
    let joiner_side: serde_json::Value = client
        .post(format!("{base}/lobby/{lobby_id}/join"))
        .json(&json!({
            "player_id": "joiner",
            "display_name": "Joiner",
            "rating": 1480,
            "is_provisional": false,
        }))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("join payload");
    let game_room_id = joiner_side["game_room_id"].as_str().expect("room id");
    assert!(joiner_side["connection_url"]
        .as_str()
        .expect("url")
        .contains(game_room_id));

    // opponent_joined, then match_ready with the creator's coordinates.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let mut saw_opponent_joined = false;
    let creator_url = loop {
        let message = tokio::time::timeout_at(deadline, creator_ws.next())
            .await
            .expect("timed out waiting for lobby frame")
            .expect("socket open")
            .expect("frame ok");
        let Message::Text(text) = message else {
            continue;
        };
        let frame: serde_json::Value = serde_json::from_str(&text).expect("lobby frame");
        match frame["type"].as_str() {
            Some("opponent_joined") => {
                assert_eq!(frame["data"]["opponent"]["player_id"], "joiner");
                saw_opponent_joined = true;
            }
            Some("match_ready") => {
                assert!(saw_opponent_joined, "opponent_joined must come first");
                assert_eq!(frame["data"]["game_room_id"].as_str(), Some(game_room_id));
                break frame["data"]["connection_url"]
                    .as_str()
                    .expect("creator url")
                    .to_string();
            }
            other => panic!("unexpected lobby frame {other:?}"),
        }
    };

    // Both sides connect and the unrated friendly game starts.
    let (mut creator_game_ws, _) = connect_async(creator_url.as_str())
        .await
        .expect("creator joins");
    let (mut joiner_game_ws, _) = connect_async(
        joiner_side["connection_url"].as_str().expect("joiner url"),
    )
    .await
    .expect("joiner joins");

    wait_for_ws_frame(&mut creator_game_ws, |frame| {
        matches!(frame, ServerFrame::GameStart { .. })
    })
    .await;
    let ready = wait_for_ws_frame(&mut joiner_game_ws, |frame| {
        matches!(frame, ServerFrame::Ready(_))
    })
    .await;
    let ServerFrame::Ready(payload) = ready else {
        unreachable!();
    };
    assert!(payload.is_unrated);
    assert_eq!(payload.status, GameStatus::Waiting);

    // Joiner resigns immediately: friendly games settle with zero deltas.
    joiner_game_ws
        .send(Message::Text(r#"{"type":"resign"}"#.into()))
        .await
        .expect("send resign");
    let frame = wait_for_ws_frame(&mut creator_game_ws, |frame| {
        matches!(frame, ServerFrame::GameEnded(_))
    })
    .await;
    let ServerFrame::GameEnded(payload) = frame else {
        unreachable!();
    };
    assert!(payload.elo_changes.iter().all(|change| change.change == 0));
}

#[tokio::test(flavor = "multi_thread")]
async fn queue_status_and_info_endpoints() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    queue_join(&client, &base, "solo", 1500).await;

    let status: serde_json::Value = client
        .get(format!("{base}/matchmaking/queue/status?playerId=solo"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("status json");
    assert_eq!(status["in_queue"], true);
    assert_eq!(status["position"], 1);

    let info: serde_json::Value = client
        .get(format!("{base}/matchmaking/queue/info"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("info json");
    assert_eq!(info["total_waiting"], 1);

    let removed: serde_json::Value = client
        .post(format!("{base}/matchmaking/queue/leave"))
        .json(&json!({"playerId": "solo"}))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("leave json");
    assert_eq!(removed["removed"], true);
}
