//! End-to-end tests over a real listener.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::{SinkExt, StreamExt};
use gameroom::config::GameConfig;
use gameroom::server::{self, AppState};
use gameroom::types::PlayerList;
use gameroom::Registry;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> SocketAddr {
    let registry = Registry::new(GameConfig::default());
    let app = server::router(AppState { registry });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn open(addr: SocketAddr, query: &str) -> Ws {
    let url = format!("ws://{addr}/ws?{query}");
    let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws
}

/// Next JSON payload, or `None` once the server closes the socket.
async fn recv(ws: &mut Ws) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for the server");
        match frame {
            Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(text.as_str()).unwrap()),
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

async fn recv_type(ws: &mut Ws, kind: &str) -> Value {
    loop {
        let msg = recv(ws).await.expect("socket closed early");
        if msg["type"] == kind {
            return msg;
        }
    }
}

async fn send(ws: &mut Ws, msg: Value) {
    ws.send(Message::Text(msg.to_string().into())).await.unwrap();
}

#[tokio::test]
async fn host_then_player_then_start() {
    let addr = spawn_server().await;

    let mut host = open(addr, "roomId=123456&isHost=true").await;
    let list = recv_type(&mut host, "playerListUpdate").await;
    assert_eq!(list["data"], json!([]));
    assert_eq!(list["waitingForPlayers"], true);

    let mut alice = open(addr, "roomId=123456&nickname=Alice").await;
    let list = recv_type(&mut host, "playerListUpdate").await;
    assert_eq!(list["data"][0]["nickname"], "Alice");
    assert_eq!(list["data"][0]["isHost"], false);

    send(&mut host, json!({ "type": "hostStartGame", "numPairs": 8, "gameTime": 60 })).await;
    recv_type(&mut alice, "gameStarted").await;
    let data = recv_type(&mut alice, "gameData").await;
    assert_eq!(data["cards"].as_array().unwrap().len(), 16);
    assert_eq!(data["gameTime"], 60);

    send(&mut alice, json!({ "type": "flipCard", "score": 20 })).await;
    let update = recv_type(&mut host, "scoreUpdate").await;
    assert_eq!(update, json!({ "type": "scoreUpdate", "nickname": "Alice", "score": 20 }));
}

#[tokio::test]
async fn second_host_receives_error_and_is_closed() {
    let addr = spawn_server().await;
    let mut host = open(addr, "roomId=123456&isHost=true&nickname=Boss").await;
    recv_type(&mut host, "playerListUpdate").await;

    let mut impostor = open(addr, "roomId=123456&isHost=true").await;
    assert_eq!(
        recv(&mut impostor).await,
        Some(json!({ "type": "error", "message": "Host already exists in this room." }))
    );
    assert_eq!(recv(&mut impostor).await, None);

    // The original host still drives the room.
    send(&mut host, json!({ "type": "hostStartGame", "numPairs": 2, "gameTime": 30 })).await;
    recv_type(&mut host, "gameStarted").await;
}

#[tokio::test]
async fn missing_handshake_parameters_close_silently() {
    let addr = spawn_server().await;

    let mut no_room = open(addr, "nickname=Alice").await;
    assert_eq!(recv(&mut no_room).await, None);

    let mut no_nickname = open(addr, "roomId=123456").await;
    assert_eq!(recv(&mut no_nickname).await, None);
}

#[tokio::test]
async fn garbage_frames_do_not_disturb_the_room() {
    let addr = spawn_server().await;
    let mut alice = open(addr, "roomId=r&nickname=Alice").await;
    recv_type(&mut alice, "playerListUpdate").await;

    ws_send_raw(&mut alice, "{not json").await;
    send(&mut alice, json!({ "type": "somethingElse" })).await;
    send(&mut alice, json!({ "type": "join" })).await;

    let list = recv(&mut alice).await.unwrap();
    assert_eq!(list["type"], "playerListUpdate");
}

async fn ws_send_raw(ws: &mut Ws, text: &str) {
    ws.send(Message::Text(text.into())).await.unwrap();
}

#[tokio::test]
async fn player_list_endpoint() {
    let registry = Registry::new(GameConfig::default());
    let app = server::router(AppState {
        registry: registry.clone(),
    });

    let response = app
        .clone()
        .oneshot(Request::get("/api/room/nowhere/players").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let list: PlayerList = serde_json::from_slice(&body).unwrap();
    assert_eq!(list, PlayerList::unknown_room());
    assert!(registry.get("nowhere").is_none());

    registry.get_or_create_room("known");
    let response = app
        .oneshot(Request::get("/api/room/known/players").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let list: PlayerList = serde_json::from_slice(&body).unwrap();
    assert!(list.data.is_empty());
    assert!(list.waiting_for_players);
    assert!(!list.game_ended);
}
