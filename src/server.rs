use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::error::RoomError;
use crate::registry::Registry;
use crate::room::{ConnId, Outbound};
use crate::types::{ClientMsg, PlayerList};

pub const DEFAULT_HOST_NICKNAME: &str = "Host";

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/room/{room_id}/players", get(room_players))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Admission parameters ─────────────────────────────────────────

/// Validated handshake parameters of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub room_id: String,
    pub nickname: String,
    pub is_host: bool,
}

impl Admission {
    /// `None` when the connection must be closed without joining: no
    /// `roomId`, or a player without a nickname.
    pub fn from_query(params: &HashMap<String, String>) -> Option<Self> {
        let room_id = params.get("roomId").map(|s| s.trim()).filter(|s| !s.is_empty())?;
        let is_host = params.get("isHost").is_some_and(|v| v == "true");
        let nickname = params.get("nickname").map(|s| s.trim()).unwrap_or("");

        let nickname = match (nickname.is_empty(), is_host) {
            (false, _) => nickname.to_string(),
            (true, true) => DEFAULT_HOST_NICKNAME.to_string(),
            (true, false) => return None,
        };

        Some(Self {
            room_id: room_id.to_string(),
            nickname,
            is_host,
        })
    }
}

// ─── Routes ───────────────────────────────────────────────────────

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let admission = Admission::from_query(&params);
    ws.on_upgrade(move |socket| handle_socket(socket, state, admission))
}

async fn room_players(
    Path(room_id): Path<String>,
    State(state): State<AppState>,
) -> Json<PlayerList> {
    tracing::debug!("Player list requested for room {}", room_id);
    let list = match state.registry.get(&room_id) {
        Some(room) => room.snapshot().await.unwrap_or_else(|_| PlayerList::unknown_room()),
        None => PlayerList::unknown_room(),
    };
    Json(list)
}

// ─── Connection lifecycle ─────────────────────────────────────────

async fn handle_socket(mut socket: WebSocket, state: AppState, admission: Option<Admission>) {
    let Some(admission) = admission else {
        tracing::warn!("Rejecting connection with missing roomId or nickname");
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    let conn_id = Uuid::new_v4();
    tracing::info!(
        "WebSocket connected: {} ({} joining room {}, host: {})",
        conn_id,
        admission.nickname,
        admission.room_id,
        admission.is_host
    );

    let (sink, mut stream) = socket.split();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_outbound(sink, out_rx, conn_id));

    let room = state.registry.get_or_create_room(&admission.room_id);
    if let Err(e) = room
        .admit(conn_id, admission.nickname.clone(), admission.is_host, out_tx)
        .await
    {
        tracing::warn!("Connection {} not admitted to room {}: {}", conn_id, admission.room_id, e);
        // The writer flushes the room's error payload and close request.
        let _ = writer.await;
        return;
    }

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!("WebSocket error on {}: {}", conn_id, e);
                break;
            }
        };

        let Some(msg) = parse_client_msg(text.as_str()) else {
            continue;
        };
        if let Err(RoomError::Unavailable(room_id)) = room.send_message(conn_id, msg).await {
            tracing::debug!("Room {} is closed, dropping message from {}", room_id, conn_id);
        }
    }

    tracing::info!("WebSocket disconnected: {}", conn_id);
    let _ = room.disconnect(conn_id).await;
    writer.abort();
}

/// Drains a connection's outbound queue into its socket.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    conn_id: ConnId,
) {
    while let Some(out) = rx.recv().await {
        match out {
            Outbound::Text(text) => {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::warn!("Send to {} failed: {}", conn_id, e);
                    return;
                }
            }
            Outbound::Close => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
        }
    }
}

/// Decodes an inbound payload. Malformed JSON and unknown `type`s are
/// logged and dropped.
fn parse_client_msg(text: &str) -> Option<ClientMsg> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Invalid message: {}", e);
            return None;
        }
    };
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_string();

    match serde_json::from_value::<ClientMsg>(value) {
        Ok(ClientMsg::Unknown) => {
            tracing::info!("Unhandled message type: {:?}", kind);
            None
        }
        Ok(msg) => Some(msg),
        Err(e) => {
            tracing::warn!("Invalid {:?} message: {}", kind, e);
            None
        }
    }
}
