//! HTTP/WebSocket routing surface.
//!
//! WebSocket endpoints and the JSON RPC endpoints of the three actors
//! share one axum router; all handlers translate between HTTP shapes and
//! actor handle calls and hold no state of their own.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::Config;
use crate::game::{ConnectMode, ConnectParams, GameRegistry, GameRoomSeed};
use crate::lobby::{LobbyError, LobbyRegistry};
use crate::matchmaker::{JoinRequest, MatchmakerHandle};
use crate::protocol::{LobbySettings, PlayerColor, PlayerDescriptor};

use super::connection::{handle_game_socket, handle_lobby_socket};

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub games: GameRegistry,
    pub lobbies: LobbyRegistry,
    pub matchmaker: MatchmakerHandle,
}

/// Build the router with CORS configured from the comma-separated origin
/// list ("*" is permissive).
pub fn create_router(state: AppState, cors_origins: &str) -> Router {
    let cors = if cors_origins == "*" {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = cors_origins
            .split(',')
            .filter_map(|origin| origin.trim().parse::<axum::http::HeaderValue>().ok())
            .collect();
        if origins.is_empty() {
            tracing::warn!("No valid CORS origins configured, using permissive CORS");
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    Router::new()
        .route("/health", get(health))
        .route("/game/{id}/ws", get(game_ws))
        .route("/game/{id}/init", post(game_init))
        .route("/game/{id}/state", get(game_state))
        .route("/lobby/{id}/ws", get(lobby_ws))
        .route("/lobby/{id}/init", post(lobby_init))
        .route("/lobby/{id}/join", post(lobby_join))
        .route("/lobby/{id}/state", get(lobby_state))
        .route("/lobby/{id}/cancel", post(lobby_cancel))
        .route("/matchmaking/queue/join", post(queue_join))
        .route("/matchmaking/queue/status", get(queue_status))
        .route("/matchmaking/queue/leave", post(queue_leave))
        .route("/matchmaking/queue/info", get(queue_info))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Connection URL query parameters.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameWsQuery {
    #[serde(default)]
    player_id: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    rating: Option<i32>,
    #[serde(default)]
    is_provisional: Option<bool>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    mode: Option<String>,
}

impl GameWsQuery {
    fn into_params(self) -> ConnectParams {
        ConnectParams {
            player_id: self.player_id,
            display_name: self.display_name,
            rating: self.rating,
            is_provisional: self.is_provisional.unwrap_or(false),
            color: self
                .color
                .as_deref()
                .and_then(|color| color.parse::<PlayerColor>().ok()),
            mode: match self.mode.as_deref() {
                Some("spectator") => ConnectMode::Spectator,
                _ => ConnectMode::Player,
            },
        }
    }
}

async fn game_ws(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<GameWsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(room) = state.games.get_or_restore(id).await else {
        return (StatusCode::NOT_FOUND, "unknown game room").into_response();
    };
    let params = query.into_params();
    ws.on_upgrade(move |socket| handle_game_socket(socket, room, params))
}

async fn game_init(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(seed): Json<GameRoomSeed>,
) -> Response {
    let room = state.games.get_or_create(id, seed.game_mode);
    match room.init(seed).await {
        Ok(()) => (StatusCode::OK, Json(json!({"gameId": id}))).into_response(),
        Err(err) => (StatusCode::CONFLICT, err.to_string()).into_response(),
    }
}

async fn game_state(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let Some(room) = state.games.get_or_restore(id).await else {
        return (StatusCode::NOT_FOUND, "unknown game room").into_response();
    };
    match room.state().await {
        Some(view) => Json(view).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown game room").into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LobbyWsQuery {
    player_id: String,
}

async fn lobby_ws(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LobbyWsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(lobby) = state.lobbies.get_or_restore(id).await else {
        return (StatusCode::NOT_FOUND, "unknown lobby").into_response();
    };
    ws.on_upgrade(move |socket| handle_lobby_socket(socket, lobby, query.player_id))
}

#[derive(Debug, Deserialize)]
struct LobbyInitRequest {
    creator: PlayerDescriptor,
    settings: LobbySettings,
}

async fn lobby_init(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<LobbyInitRequest>,
) -> Response {
    let lobby = state.lobbies.get_or_create(id);
    match lobby.init(request.creator, request.settings).await {
        Ok(lobby_state) => Json(lobby_state).into_response(),
        Err(err) => lobby_error_response(err),
    }
}

async fn lobby_join(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(opponent): Json<PlayerDescriptor>,
) -> Response {
    let Some(lobby) = state.lobbies.get_or_restore(id).await else {
        return (StatusCode::NOT_FOUND, "unknown lobby").into_response();
    };
    match lobby.join(opponent).await {
        Ok(payload) => Json(payload).into_response(),
        Err(err) => lobby_error_response(err),
    }
}

async fn lobby_state(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.lobbies.state(id).await {
        Some(lobby_state) => Json(lobby_state).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown lobby").into_response(),
    }
}

async fn lobby_cancel(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let Some(lobby) = state.lobbies.get_or_restore(id).await else {
        return (StatusCode::NOT_FOUND, "unknown lobby").into_response();
    };
    match lobby.cancel().await {
        Ok(()) => (StatusCode::OK, Json(json!({"cancelled": true}))).into_response(),
        Err(err) => lobby_error_response(err),
    }
}

fn lobby_error_response(err: LobbyError) -> Response {
    let status = match err {
        LobbyError::NotInitialised | LobbyError::LobbyClosed => StatusCode::NOT_FOUND,
        LobbyError::AlreadyInitialised
        | LobbyError::NotJoinable
        | LobbyError::CannotJoinOwnLobby => StatusCode::CONFLICT,
        LobbyError::NotCreator => StatusCode::FORBIDDEN,
        LobbyError::GameCreationFailed => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}

async fn queue_join(
    State(state): State<AppState>,
    Json(request): Json<JoinRequest>,
) -> Response {
    match state.matchmaker.join(request).await {
        Some(response) => Json(response).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "matchmaker unavailable").into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueStatusQuery {
    player_id: String,
}

async fn queue_status(
    State(state): State<AppState>,
    Query(query): Query<QueueStatusQuery>,
) -> Response {
    match state.matchmaker.status(query.player_id).await {
        Some(status) => Json(status).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "matchmaker unavailable").into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueLeaveRequest {
    player_id: String,
}

async fn queue_leave(
    State(state): State<AppState>,
    Json(request): Json<QueueLeaveRequest>,
) -> Response {
    let removed = state.matchmaker.leave(request.player_id).await;
    Json(json!({"removed": removed})).into_response()
}

async fn queue_info(State(state): State<AppState>) -> Response {
    match state.matchmaker.info().await {
        Some(info) => Json(info).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "matchmaker unavailable").into_response(),
    }
}
