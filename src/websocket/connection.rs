//! Per-connection socket pumps.
//!
//! Each WebSocket is split into a send task draining the room's outbound
//! channel and a receive loop feeding parsed frames into the room inbox.
//! The room never touches the socket; dropping the outbound sender (or an
//! explicit `Outbound::Close`) is how it ends a connection.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::game::{ConnectParams, GameRoomHandle, Outbound, ParticipantKey};
use crate::lobby::{LobbyFrame, LobbyHandle};
use crate::protocol::{close_codes, ClientFrame, ErrorCode, ServerFrame};

const OUTBOUND_CAPACITY: usize = 64;

/// Drive one participant connection against a game room.
pub async fn handle_game_socket(socket: WebSocket, room: GameRoomHandle, params: ConnectParams) {
    let (outbound_tx, outbound_rx) = mpsc::channel::<Outbound>(OUTBOUND_CAPACITY);

    let key = match room.connect(params, outbound_tx.clone()).await {
        Ok(key) => key,
        Err(err) => {
            tracing::debug!(game_id = %room.id, error = %err, "Admission rejected");
            close_socket(socket, err.close_code(), &err.to_string()).await;
            return;
        }
    };

    pump_game_socket(socket, room, key, outbound_tx, outbound_rx).await;
}

async fn pump_game_socket(
    socket: WebSocket,
    room: GameRoomHandle,
    key: ParticipantKey,
    outbound_tx: mpsc::Sender<Outbound>,
    mut outbound_rx: mpsc::Receiver<Outbound>,
) {
    let (mut sender, mut receiver) = socket.split();

    // Room -> client.
    let send_task = tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            match outbound {
                Outbound::Frame(frame) => {
                    let text = match serde_json::to_string(frame.as_ref()) {
                        Ok(text) => text,
                        Err(err) => {
                            tracing::error!(error = %err, "Failed to serialize server frame");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close(code) => {
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: "closed by server".into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    // Client -> room.
    let room_for_receive = room.clone();
    let key_for_receive = key.clone();
    let receive_task = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            let message = match message {
                Ok(message) => message,
                Err(err) => {
                    tracing::debug!(game_id = %room_for_receive.id, error = %err, "WebSocket error");
                    break;
                }
            };
            match message {
                Message::Text(text) => {
                    let frame: ClientFrame = match serde_json::from_str(&text) {
                        Ok(frame) => frame,
                        Err(err) => {
                            tracing::debug!(
                                game_id = %room_for_receive.id,
                                error = %err,
                                "Rejected unparseable frame"
                            );
                            let _ = outbound_tx.try_send(Outbound::Frame(Arc::new(
                                ServerFrame::Error {
                                    code: ErrorCode::InvalidFrame,
                                    message: ErrorCode::InvalidFrame.description().to_string(),
                                },
                            )));
                            continue;
                        }
                    };
                    room_for_receive
                        .frame(key_for_receive.clone(), frame)
                        .await;
                }
                // A transport-level pong counts as liveness.
                Message::Pong(_) | Message::Ping(_) => {
                    room_for_receive
                        .frame(key_for_receive.clone(), ClientFrame::Pong)
                        .await;
                }
                Message::Close(_) => break,
                Message::Binary(_) => {
                    // This protocol is JSON text frames only.
                }
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = receive_task => {}
    }

    room.closed(key).await;
}

/// Drive the creator's lobby notification channel.
pub async fn handle_lobby_socket(socket: WebSocket, lobby: LobbyHandle, player_id: String) {
    let (frame_tx, mut frame_rx) = mpsc::channel::<LobbyFrame>(OUTBOUND_CAPACITY);

    if let Err(err) = lobby.attach_creator(player_id, frame_tx).await {
        tracing::debug!(lobby_id = %lobby.id, error = %err, "Lobby channel rejected");
        close_socket(socket, close_codes::CAPACITY_EXCEEDED, &err.to_string()).await;
        return;
    }

    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!(error = %err, "Failed to serialize lobby frame");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // The creator only listens on this channel; drain until close.
    let receive_task = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = receive_task => {}
    }
}

async fn close_socket(mut socket: WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await;
}
