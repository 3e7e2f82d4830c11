//! A room: one host slot, its players, and the round state machine.
//!
//! Every room runs as its own tokio task that owns the [`Room`] value and
//! consumes [`RoomCommand`]s one at a time, so all mutation of a room is
//! serialized in arrival order. Connections talk to it through a
//! [`RoomHandle`].

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Weak;
use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use crate::cards;
use crate::config::GameConfig;
use crate::error::RoomError;
use crate::registry::Registry;
use crate::types::*;

/// Identity of one transport connection.
pub type ConnId = Uuid;

/// What a room asks a connection's writer to do.
#[derive(Debug, Clone)]
pub enum Outbound {
    Text(Utf8Bytes),
    Close,
}

/// Addressing handle for a connection. Closed once its writer is gone.
pub type ClientSender = mpsc::UnboundedSender<Outbound>;

pub const TIME_UP: &str = "Time's up!";
pub const HOST_CLOSED: &str = "Host closed the game";
pub const GAME_COMPLETED: &str = "Game completed";

#[derive(Debug)]
pub struct Client {
    pub conn_id: ConnId,
    pub room_id: String,
    pub nickname: String,
    pub is_host: bool,
    pub score: i64,
    sender: ClientSender,
}

impl Client {
    fn info(&self) -> PlayerInfo {
        PlayerInfo {
            nickname: self.nickname.clone(),
            id: self.conn_id.to_string(),
            is_host: self.is_host,
            score: self.score,
        }
    }
}

/// Commands a connection (or the room's own timer) sends to a room task.
pub enum RoomCommand {
    Admit {
        conn_id: ConnId,
        nickname: String,
        is_host: bool,
        sender: ClientSender,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Message {
        conn_id: ConnId,
        msg: ClientMsg,
    },
    Disconnect {
        conn_id: ConnId,
    },
    TimerExpired,
    Snapshot {
        reply: oneshot::Sender<PlayerList>,
    },
}

/// Cheap, cloneable way to reach a running room.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    room_id: String,
    cmd_tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    fn unavailable(&self) -> RoomError {
        RoomError::Unavailable(self.room_id.clone())
    }

    /// Runs the admission protocol for a new connection.
    ///
    /// On rejection the room has already sent the error payload and a close
    /// request down `sender`.
    pub async fn admit(
        &self,
        conn_id: ConnId,
        nickname: String,
        is_host: bool,
        sender: ClientSender,
    ) -> Result<(), RoomError> {
        let (reply, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(RoomCommand::Admit {
                conn_id,
                nickname,
                is_host,
                sender,
                reply,
            })
            .await
            .map_err(|_| self.unavailable())?;
        reply_rx.await.map_err(|_| self.unavailable())?
    }

    pub async fn send_message(&self, conn_id: ConnId, msg: ClientMsg) -> Result<(), RoomError> {
        self.cmd_tx
            .send(RoomCommand::Message { conn_id, msg })
            .await
            .map_err(|_| self.unavailable())
    }

    pub async fn disconnect(&self, conn_id: ConnId) -> Result<(), RoomError> {
        self.cmd_tx
            .send(RoomCommand::Disconnect { conn_id })
            .await
            .map_err(|_| self.unavailable())
    }

    /// Host (if any) followed by the players, with the lifecycle flags.
    pub async fn snapshot(&self) -> Result<PlayerList, RoomError> {
        let (reply, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(RoomCommand::Snapshot { reply })
            .await
            .map_err(|_| self.unavailable())?;
        reply_rx.await.map_err(|_| self.unavailable())
    }
}

/// Single-shot countdown that posts [`RoomCommand::TimerExpired`] back to
/// its room. Cancelled explicitly or by being dropped.
#[derive(Debug)]
struct GameTimer {
    cancel: watch::Sender<bool>,
}

impl GameTimer {
    fn arm(after: Duration, room_tx: mpsc::WeakSender<RoomCommand>) -> Self {
        let (cancel, mut cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(after) => {
                    if let Some(tx) = room_tx.upgrade() {
                        let _ = tx.send(RoomCommand::TimerExpired).await;
                    }
                }
                _ = cancel_rx.changed() => {}
            }
        });
        Self { cancel }
    }

    fn cancel(self) {
        let _ = self.cancel.send(true);
    }
}

pub struct Room {
    id: String,
    clients: HashMap<ConnId, Client>,
    host: Option<Client>,
    phase: GamePhase,
    cards: Vec<Card>,
    game_time: u64,
    timer: Option<GameTimer>,
    players_ready: HashMap<String, bool>,
    total_players: usize,
    config: GameConfig,
    self_tx: mpsc::WeakSender<RoomCommand>,
    registry: Weak<Registry>,
}

/// Spawns the task for a fresh room and returns its handle.
pub fn spawn(id: String, config: GameConfig, registry: Weak<Registry>) -> RoomHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let room = Room::new(id.clone(), config, cmd_tx.downgrade(), registry);
    tokio::spawn(room_task(room, cmd_rx));
    RoomHandle { room_id: id, cmd_tx }
}

async fn room_task(mut room: Room, mut cmd_rx: mpsc::Receiver<RoomCommand>) {
    while let Some(cmd) = cmd_rx.recv().await {
        if room.handle(cmd).is_break() {
            break;
        }
    }
    tracing::info!("Room {} task ended", room.id);
}

impl Room {
    fn new(
        id: String,
        config: GameConfig,
        self_tx: mpsc::WeakSender<RoomCommand>,
        registry: Weak<Registry>,
    ) -> Self {
        Self {
            id,
            clients: HashMap::new(),
            host: None,
            phase: GamePhase::Waiting,
            cards: Vec::new(),
            game_time: 0,
            timer: None,
            players_ready: HashMap::new(),
            total_players: 0,
            config,
            self_tx,
            registry,
        }
    }

    /// Applies one command. `Break` means the room has been closed.
    fn handle(&mut self, cmd: RoomCommand) -> ControlFlow<()> {
        match cmd {
            RoomCommand::Admit {
                conn_id,
                nickname,
                is_host,
                sender,
                reply,
            } => {
                let result = self.admit(conn_id, nickname, is_host, sender);
                let _ = reply.send(result);
            }
            RoomCommand::Message { conn_id, msg } => return self.route(conn_id, msg),
            RoomCommand::Disconnect { conn_id } => self.disconnect(conn_id),
            RoomCommand::TimerExpired => {
                self.end_game(TIME_UP);
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
        ControlFlow::Continue(())
    }

    // ─── Admission ────────────────────────────────────────────────────

    fn admit(
        &mut self,
        conn_id: ConnId,
        nickname: String,
        is_host: bool,
        sender: ClientSender,
    ) -> Result<(), RoomError> {
        let client = Client {
            conn_id,
            room_id: self.id.clone(),
            nickname,
            is_host,
            score: 0,
            sender,
        };

        if is_host {
            if let Some(existing) = &self.host {
                tracing::warn!(
                    "Room {}: host {} already present, rejecting {}",
                    self.id,
                    existing.nickname,
                    client.nickname
                );
                let err = RoomError::HostExists;
                send_to(&client.sender, &ServerMsg::Error {
                    message: err.to_string(),
                });
                let _ = client.sender.send(Outbound::Close);
                return Err(err);
            }
            tracing::info!("Room {}: host {} registered", self.id, client.nickname);
            self.host = Some(client);
        } else {
            let nickname = client.nickname.clone();
            match self.replace_identity(client) {
                Some(stale) => {
                    tracing::info!("Room {}: player {} reconnected", self.id, nickname);
                    let _ = stale.sender.send(Outbound::Close);
                }
                None => tracing::info!(
                    "Room {}: player {} registered (total players: {})",
                    self.id,
                    nickname,
                    self.clients.len()
                ),
            }
        }

        self.broadcast_player_list();
        Ok(())
    }

    /// Maps `client` into the room, evicting any player with the same
    /// nickname. The evicted client is returned so its connection can be
    /// closed; its score carries over.
    fn replace_identity(&mut self, mut client: Client) -> Option<Client> {
        let stale_id = self
            .clients
            .values()
            .find(|c| c.nickname == client.nickname)
            .map(|c| c.conn_id);
        let stale = stale_id.and_then(|id| self.clients.remove(&id));
        if let Some(stale) = &stale {
            client.score = stale.score;
        }
        self.clients.insert(client.conn_id, client);
        stale
    }

    fn disconnect(&mut self, conn_id: ConnId) {
        if self.host.as_ref().is_some_and(|h| h.conn_id == conn_id) {
            if let Some(host) = self.host.take() {
                tracing::info!(
                    "Room {}: host {} disconnected ({})",
                    self.id,
                    host.nickname,
                    self.phase
                );
            }
        } else if let Some(client) = self.clients.remove(&conn_id) {
            tracing::info!(
                "Room {}: player {} left (total players: {})",
                self.id,
                client.nickname,
                self.clients.len()
            );
        } else {
            tracing::debug!(
                "Room {}: connection {} closed after being superseded",
                self.id,
                conn_id
            );
        }

        self.broadcast_player_list();
    }

    // ─── Message routing ──────────────────────────────────────────────

    fn client(&self, conn_id: ConnId) -> Option<&Client> {
        self.host
            .as_ref()
            .filter(|h| h.conn_id == conn_id)
            .or_else(|| self.clients.get(&conn_id))
    }

    fn client_mut(&mut self, conn_id: ConnId) -> Option<&mut Client> {
        match &mut self.host {
            Some(host) if host.conn_id == conn_id => Some(host),
            _ => self.clients.get_mut(&conn_id),
        }
    }

    fn is_host(&self, conn_id: ConnId) -> bool {
        self.host.as_ref().is_some_and(|h| h.conn_id == conn_id)
    }

    fn reply_error(&self, conn_id: ConnId, err: &RoomError) {
        if let Some(client) = self.client(conn_id) {
            send_to(&client.sender, &ServerMsg::Error {
                message: err.to_string(),
            });
        }
    }

    fn route(&mut self, conn_id: ConnId, msg: ClientMsg) -> ControlFlow<()> {
        let Some(nickname) = self.client(conn_id).map(|c| c.nickname.clone()) else {
            tracing::debug!("Room {}: dropping message from unmapped connection {}", self.id, conn_id);
            return ControlFlow::Continue(());
        };
        tracing::debug!("Room {}: {:?} from {}", self.id, msg, nickname);

        match msg {
            ClientMsg::Join => {
                tracing::info!("Room {}: {} confirmed join", self.id, nickname);
                self.broadcast_player_list();
            }
            ClientMsg::HostStartGame {
                num_pairs,
                game_time,
            } => {
                if let Err(err) = self.start_game(conn_id, num_pairs, game_time) {
                    tracing::warn!("Room {}: start rejected for {}: {}", self.id, nickname, err);
                    self.reply_error(conn_id, &err);
                }
            }
            ClientMsg::FlipCard { score } => self.update_score(conn_id, score),
            ClientMsg::HostCloseGame => {
                if !self.is_host(conn_id) {
                    tracing::warn!("Room {}: non-host {} tried to close the game", self.id, nickname);
                    self.reply_error(conn_id, &RoomError::NotHostClose);
                    return ControlFlow::Continue(());
                }
                self.close();
                return ControlFlow::Break(());
            }
            ClientMsg::GameOver { all_pairs_found } => self.player_finished(conn_id, all_pairs_found),
            ClientMsg::Unknown => {
                tracing::debug!("Room {}: ignoring unknown message from {}", self.id, nickname);
            }
        }
        ControlFlow::Continue(())
    }

    // ─── State machine ────────────────────────────────────────────────

    fn start_game(
        &mut self,
        conn_id: ConnId,
        num_pairs: Option<i64>,
        game_time: Option<i64>,
    ) -> Result<(), RoomError> {
        if !self.is_host(conn_id) {
            return Err(RoomError::NotHostStart);
        }

        let (num_pairs, game_time) = match (num_pairs, game_time) {
            (Some(n), Some(t))
                if n > 0
                    && t > 0
                    && n as u64 <= self.config.max_pairs
                    && t as u64 <= self.config.max_game_time =>
            {
                (n as usize, t as u64)
            }
            _ => return Err(RoomError::InvalidParameters),
        };

        match self.phase {
            GamePhase::InProgress => return Err(RoomError::AlreadyStarted),
            GamePhase::Ended => return Err(RoomError::NotWaiting),
            GamePhase::Waiting => {}
        }

        self.cards = cards::generate_cards(num_pairs);
        self.game_time = game_time;
        self.total_players = self.clients.len();
        self.players_ready.clear();
        self.phase = GamePhase::InProgress;

        self.broadcast(&ServerMsg::GameStarted);
        self.broadcast(&ServerMsg::GameData {
            cards: self.cards.clone(),
            game_time: self.game_time,
        });
        self.broadcast_player_list();

        self.cancel_timer();
        self.timer = Some(GameTimer::arm(
            Duration::from_secs(game_time),
            self.self_tx.clone(),
        ));

        tracing::info!(
            "Room {}: game started with {} pairs, {} seconds, {} players",
            self.id,
            num_pairs,
            game_time,
            self.total_players
        );
        Ok(())
    }

    /// IN_PROGRESS -> ENDED. Returns false (and does nothing) if the round
    /// is not running, so a late timer and an explicit end cannot both fire.
    fn end_game(&mut self, reason: &str) -> bool {
        if self.phase != GamePhase::InProgress {
            tracing::debug!("Room {}: end ({}) ignored in phase {}", self.id, reason, self.phase);
            return false;
        }

        self.cancel_timer();
        self.phase = GamePhase::Ended;

        let final_results = self.final_results();
        tracing::info!(
            "Room {}: game ended ({}), {} of {} starting players ranked",
            self.id,
            reason,
            final_results.len(),
            self.total_players
        );
        self.broadcast(&ServerMsg::GameEnded {
            reason: reason.to_string(),
            final_results,
        });
        self.broadcast_player_list();
        true
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    /// Host-initiated teardown: end the round, drop out of the store, and
    /// tell everyone still connected.
    fn close(&mut self) {
        tracing::info!("Room {}: host is closing the room", self.id);
        self.end_game(HOST_CLOSED);
        self.cancel_timer();

        if let Some(registry) = self.registry.upgrade() {
            registry.remove_room(&self.id);
        }
        self.broadcast(&ServerMsg::RoomClosed {
            reason: HOST_CLOSED.to_string(),
        });
    }

    // ─── Scores ───────────────────────────────────────────────────────

    /// Client-reported scores are trusted as sent.
    fn update_score(&mut self, conn_id: ConnId, score: Option<i64>) {
        let room_id = self.id.clone();
        let Some(client) = self.client_mut(conn_id) else {
            return;
        };
        let Some(score) = score else {
            tracing::warn!("Room {}: invalid score from {}", room_id, client.nickname);
            return;
        };

        client.score = score;
        let update = ServerMsg::ScoreUpdate {
            nickname: client.nickname.clone(),
            score,
        };
        self.broadcast(&update);
        self.broadcast_player_list();
    }

    fn player_finished(&mut self, conn_id: ConnId, all_pairs_found: bool) {
        if self.phase != GamePhase::InProgress {
            tracing::debug!("Room {}: gameOver outside of a running round", self.id);
            return;
        }

        if let Some(client) = self.clients.get(&conn_id) {
            tracing::info!("Room {}: {} finished with {}", self.id, client.nickname, client.score);
            self.players_ready.insert(client.nickname.clone(), true);
        }

        let everyone_done = self
            .clients
            .values()
            .all(|c| self.players_ready.get(&c.nickname).copied().unwrap_or(false));

        if all_pairs_found || everyone_done {
            self.end_game(GAME_COMPLETED);
        } else {
            self.broadcast_player_list();
        }
    }

    fn final_results(&self) -> Vec<FinalResult> {
        let mut players: Vec<(&Client, bool)> = self
            .clients
            .values()
            .map(|c| (c, self.players_ready.get(&c.nickname).copied().unwrap_or(false)))
            .collect();
        players.sort_by(|(a, a_done), (b, b_done)| {
            b.score
                .cmp(&a.score)
                .then(b_done.cmp(a_done))
                .then_with(|| a.nickname.cmp(&b.nickname))
        });

        let total_players = players.len();
        players
            .into_iter()
            .enumerate()
            .map(|(i, (c, finished))| FinalResult {
                nickname: c.nickname.clone(),
                score: c.score,
                finished,
                rank: i + 1,
                total_players,
            })
            .collect()
    }

    // ─── Broadcasting ─────────────────────────────────────────────────

    fn players(&self) -> Vec<PlayerInfo> {
        let mut players: Vec<PlayerInfo> = self.clients.values().map(Client::info).collect();
        players.sort_by(|a, b| a.nickname.cmp(&b.nickname));
        players
    }

    fn player_list(&self, data: Vec<PlayerInfo>) -> PlayerList {
        PlayerList {
            data,
            waiting_for_players: self.phase.waiting_for_players(),
            game_started: self.phase.game_started(),
            game_ended: self.phase.game_ended(),
        }
    }

    fn snapshot(&self) -> PlayerList {
        let mut data: Vec<PlayerInfo> = self.host.iter().map(Client::info).collect();
        data.extend(self.players());
        self.player_list(data)
    }

    fn broadcast_player_list(&self) {
        let list = self.player_list(self.players());
        self.broadcast(&ServerMsg::PlayerListUpdate(list));
    }

    /// Serializes once, then delivers to the host and every open player
    /// connection. A failed delivery is logged and skipped; membership only
    /// changes through `disconnect`.
    fn broadcast(&self, msg: &ServerMsg) {
        let text = match serde_json::to_string(msg) {
            Ok(json) => Utf8Bytes::from(json),
            Err(e) => {
                tracing::error!("Room {}: failed to encode {:?}: {}", self.id, msg, e);
                return;
            }
        };

        for client in self.host.iter().chain(self.clients.values()) {
            if client.sender.is_closed() {
                continue;
            }
            if client.sender.send(Outbound::Text(text.clone())).is_err() {
                tracing::warn!("Room {}: could not deliver to {}", self.id, client.nickname);
            }
        }
    }
}

fn send_to(sender: &ClientSender, msg: &ServerMsg) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            let _ = sender.send(Outbound::Text(json.into()));
        }
        Err(e) => tracing::error!("Failed to encode {:?}: {}", msg, e),
    }
}
