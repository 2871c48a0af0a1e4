use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{
    broadcast::{encode_frame, Broadcaster, ConnectionId, RoomHub, UPDATE_USERS},
    error::{AppError, Result},
    services::membership,
    state::AppState,
};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
pub struct SocketQuery {
    pub token: String,
}

/// Frames a client may send.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "camelCase")]
enum ClientFrame {
    JoinRoom { hash: String },
    LeaveRoom,
}

#[derive(Serialize)]
struct SocketError<'a> {
    error: String,
    kind: &'a str,
}

/// Upgrades to a socket once the access token in the query string checks out.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<SocketQuery>,
) -> Result<Response> {
    let identity = state.auth.verify(&params.token).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, identity.user_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: uuid::Uuid) {
    let hub = Arc::clone(&state.hub);
    let (connection, rx) = hub.register(user_id);
    tracing::info!(connection = %connection, "🔌 Socket connected for user {}", user_id);

    let (ws_tx, mut ws_rx) = socket.split();
    let writer = tokio::spawn(write_loop(ws_tx, rx, connection.clone()));

    let reader_connection = connection.clone();
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    handle_frame(&state, &reader_connection, user_id, text.as_str()).await;
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    hub.unregister(&connection);
    tracing::info!(connection = %connection, "🔌 Socket disconnected");
}

/// Forwards queued frames to the socket and pings it periodically.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<String>,
    connection: ConnectionId,
) {
    let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    ping_interval.tick().await;

    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(text) = frame else { break };
                if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                tracing::trace!(connection = %connection, "Sent ping");
            }
        }
    }
}

async fn handle_frame(state: &AppState, connection: &ConnectionId, user_id: uuid::Uuid, text: &str) {
    let frame = match sonic_rs::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(connection = %connection, "Ignoring malformed frame: {}", e);
            send_error(&state.hub, connection, &AppError::BadRequest("malformed frame".to_string()));
            return;
        }
    };

    match frame {
        ClientFrame::JoinRoom { hash } => {
            if let Err(e) = join_room(state, connection, user_id, &hash).await {
                send_error(&state.hub, connection, &e);
            }
        }
        ClientFrame::LeaveRoom => state.hub.leave_room(connection),
    }
}

/// Subscribes a member's socket to a room and sends it the current roster.
async fn join_room(state: &AppState, connection: &ConnectionId, user_id: uuid::Uuid, hash: &str) -> Result<()> {
    membership::require_membership(state, user_id, hash).await?;
    state.hub.join_room(connection, hash);

    let roster = membership::get_roster(state, hash).await?;
    if let Some(frame) = encode_frame(UPDATE_USERS, &roster) {
        state.hub.send_to(connection, frame);
    }
    Ok(())
}

fn send_error(hub: &RoomHub, connection: &ConnectionId, err: &AppError) {
    let payload = SocketError {
        error: err.to_string(),
        kind: err.kind(),
    };
    if let Some(frame) = encode_frame("error", &payload) {
        hub.send_to(connection, frame);
    }
}
