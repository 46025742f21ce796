//! Server network layer handling TCP connections and lobby coordination

use crate::client_manager::{ClientManager, ClientWriter};
use crate::game::{GameOutcome, GameSession};
use log::{debug, error, info, warn};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tetri_shared::connection::{FrameReader, FrameWriter};
use tetri_shared::protocol::{MessageBuilder, MessageParser};
use tetri_shared::winlist::build_winlist;
use tetri_shared::{
    GameOptions, Protocol, ProtocolError, ProtocolMessage, Special, DEFAULT_MAX_USERS,
};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;

pub const SERVER_FULL_REASON: &str = "Server is full!";
pub const NAME_TAKEN_REASON: &str = "Nickname already exists on server!";

/// Points added to the winner's score at the end of a game
const WIN_POINTS: i64 = 1;

/// Runtime settings for a [`Server`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Dialect spoken on every connection; must not be `Unspecified`
    pub protocol: Protocol,
    pub max_users: usize,
    /// Silence after which a client is dropped
    pub client_timeout: Duration,
    /// Period of the empty keep-alive frame sent to every player
    pub heartbeat_interval: Duration,
    pub game_options: GameOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::TetriNet,
            max_users: DEFAULT_MAX_USERS,
            client_timeout: Duration::from_secs(120),
            heartbeat_interval: Duration::from_secs(30),
            game_options: GameOptions::default(),
        }
    }
}

/// Why a client left the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Left,
    TimedOut,
    Kicked,
    ServerShutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DisconnectReason::Left => "connection closed",
            DisconnectReason::TimedOut => "timed out",
            DisconnectReason::Kicked => "kicked",
            DisconnectReason::ServerShutdown => "server shutdown",
        };
        f.write_str(text)
    }
}

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    ClientConnected {
        stream: TcpStream,
        addr: SocketAddr,
    },
    MessageReceived {
        client_id: i32,
        message: ProtocolMessage,
    },
    InvalidMessage {
        client_id: i32,
        error: ProtocolError,
    },
    ClientDisconnected {
        client_id: i32,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: i32,
    },
    Shutdown,
}

/// Messages sent from the main loop to the sender task
///
/// Recipients are resolved when a message is queued, so a client removed
/// afterwards still gets everything queued for it before the close.
pub enum GameMessage {
    SendMessage {
        client_id: i32,
        writer: ClientWriter,
        message: String,
    },
    BroadcastMessage {
        recipients: Vec<(i32, ClientWriter)>,
        message: String,
    },
    CloseConnection {
        client_id: i32,
        writer: ClientWriter,
    },
}

/// Main server coordinating connections and the game session
pub struct Server {
    listener: Arc<TcpListener>,
    clients: Arc<RwLock<ClientManager>>,
    session: GameSession,
    builder: MessageBuilder,
    config: ServerConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if config.protocol == Protocol::Unspecified {
            return Err("server protocol must be TetriNET or TetriFast".into());
        }
        if !config.game_options.is_valid() {
            return Err("game options are out of range".into());
        }

        let listener = Arc::new(TcpListener::bind(addr).await?);
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            clients: Arc::new(RwLock::new(ClientManager::new(
                config.max_users,
                config.client_timeout,
            ))),
            session: GameSession::new(config.game_options.clone()),
            builder: MessageBuilder::new(config.protocol),
            config,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle for stopping the server from another task
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that accepts incoming connections
    async fn spawn_connection_listener(&self) {
        let listener = Arc::clone(&self.listener);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                        }
                        if let Err(e) = server_tx.send(ServerMessage::ClientConnected { stream, addr })
                        {
                            error!("Failed to send connection to main loop: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that reads and parses frames from one connection
    fn spawn_client_reader(
        &self,
        client_id: i32,
        addr: SocketAddr,
        read_half: OwnedReadHalf,
    ) -> JoinHandle<()> {
        let server_tx = self.server_tx.clone();
        let mut parser = MessageParser::for_server(self.config.protocol);

        tokio::spawn(async move {
            let mut reader = FrameReader::new(read_half);

            loop {
                let event = match reader.next_message().await {
                    Ok(Some(text)) => {
                        debug!("Client {} sent {:?}", client_id, text);
                        match parser.parse(&text) {
                            Ok(message) => ServerMessage::MessageReceived { client_id, message },
                            Err(error) => ServerMessage::InvalidMessage { client_id, error },
                        }
                    }
                    Ok(None) => {
                        debug!("Client {} closed the connection", client_id);
                        break;
                    }
                    Err(error) if error.is_malformed() => {
                        ServerMessage::InvalidMessage { client_id, error }
                    }
                    Err(e) => {
                        warn!("Error reading from client {}: {}", client_id, e);
                        break;
                    }
                };
                if let Err(e) = server_tx.send(event) {
                    error!("Failed to send message to main loop: {}", e);
                    return;
                }
            }

            if let Err(e) = server_tx.send(ServerMessage::ClientDisconnected { client_id, addr }) {
                debug!("Main loop gone before disconnect of {}: {}", client_id, e);
            }
        })
    }

    /// Spawns task that processes the outgoing message queue
    async fn spawn_network_sender(&mut self) {
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendMessage {
                        client_id,
                        writer,
                        message,
                    } => {
                        if let Err(e) = writer.send(&message).await {
                            error!("Failed to send to client {}: {}", client_id, e);
                        }
                    }
                    GameMessage::BroadcastMessage {
                        recipients,
                        message,
                    } => {
                        for (client_id, writer) in recipients {
                            if let Err(e) = writer.send(&message).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                    GameMessage::CloseConnection { client_id, writer } => {
                        writer.close().await;
                        debug!("Closed connection of client {}", client_id);
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let clients_guard = clients.read().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    fn queue(&self, message: GameMessage) {
        if let Err(e) = self.game_tx.send(message) {
            error!("Failed to queue outgoing message: {}", e);
        }
    }

    async fn send_to(&self, client_id: i32, message: String) {
        let writer = self.clients.read().await.writer(client_id);
        match writer {
            Some(writer) => self.queue(GameMessage::SendMessage {
                client_id,
                writer,
                message,
            }),
            None => debug!("Dropping message for unknown client {}", client_id),
        }
    }

    /// Queues `message` for every logged-in player except `exclude`
    async fn broadcast(&self, message: String, exclude: Option<i32>) {
        let recipients = self.clients.read().await.logged_in_writers(exclude);
        if recipients.is_empty() {
            return;
        }
        self.queue(GameMessage::BroadcastMessage {
            recipients,
            message,
        });
    }

    /// Registers a new connection, or turns it away when the server is full
    async fn handle_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        let (read_half, write_half) = stream.into_split();
        let writer: ClientWriter = FrameWriter::new(Box::new(write_half));

        let client_id = {
            let mut clients = self.clients.write().await;
            clients.add_client(addr, writer.clone())
        };

        let Some(client_id) = client_id else {
            warn!("Rejecting connection from {}: server full", addr);
            self.queue(GameMessage::SendMessage {
                client_id: 0,
                writer: writer.clone(),
                message: self.builder.connection_denied(SERVER_FULL_REASON),
            });
            self.queue(GameMessage::CloseConnection {
                client_id: 0,
                writer,
            });
            return;
        };

        let reader = self.spawn_client_reader(client_id, addr, read_half);
        if let Some(client) = self.clients.write().await.get_mut(client_id) {
            client.reader_task = Some(reader);
        }
        self.send_to(client_id, self.builder.player_number(client_id))
            .await;
    }

    /// Removes a client, closes its connection and tells the others
    async fn disconnect_client(&mut self, client_id: i32, reason: DisconnectReason) {
        let removed = self.clients.write().await.remove_client(client_id);
        let Some(client) = removed else {
            return;
        };

        if let Some(task) = client.reader_task {
            task.abort();
        }
        self.queue(GameMessage::CloseConnection {
            client_id,
            writer: client.writer,
        });
        info!(
            "Client {} ({}) left: {}",
            client_id,
            client.user.name(),
            reason
        );

        if client.logged_in {
            self.broadcast(self.builder.user_left(client_id), None).await;
            self.handle_player_lost(client_id, false).await;
        }
    }

    async fn handle_invalid_message(&mut self, client_id: i32, error: ProtocolError) {
        let logged_in = {
            let mut clients = self.clients.write().await;
            match clients.get_mut(client_id) {
                Some(client) => {
                    client.touch();
                    client.logged_in
                }
                None => return,
            }
        };

        if !error.is_malformed() {
            debug!("Ignoring message from client {}: {}", client_id, error);
            return;
        }
        warn!("Client {}: {}", client_id, error);
        if !logged_in {
            self.disconnect_client(client_id, DisconnectReason::Kicked)
                .await;
        }
    }

    /// Processes one parsed message from a client
    async fn handle_message(&mut self, client_id: i32, message: ProtocolMessage) {
        let logged_in = {
            let mut clients = self.clients.write().await;
            match clients.get_mut(client_id) {
                Some(client) => {
                    client.touch();
                    client.logged_in
                }
                None => return,
            }
        };

        match message {
            ProtocolMessage::HeartBeat => return,
            ProtocolMessage::ClientLogIn {
                username, version, ..
            } => {
                if logged_in {
                    warn!("Client {} sent a second login", client_id);
                } else {
                    self.handle_login(client_id, &username, &version).await;
                }
                return;
            }
            _ => {}
        }

        if !logged_in {
            warn!(
                "Ignoring {:?} from client {} before login",
                message.kind(),
                client_id
            );
            return;
        }
        if let Some(claimed) = claimed_sender(&message) {
            if claimed != client_id {
                warn!(
                    "Client {} sent {:?} on behalf of {}",
                    client_id,
                    message.kind(),
                    claimed
                );
                return;
            }
        }

        match message {
            ProtocolMessage::UserTeamNameChanged { team_name, .. } => {
                if self.session.is_participant(client_id) {
                    warn!("Client {} tried to change team during a game", client_id);
                    return;
                }
                if let Some(client) = self.clients.write().await.get_mut(client_id) {
                    client.user.set_team_name(&team_name);
                }
                self.broadcast(self.builder.team(client_id, team_name.trim()), Some(client_id))
                    .await;
            }

            ProtocolMessage::UserChatMessage { message, .. } => {
                self.broadcast(self.builder.chat(client_id, &message), Some(client_id))
                    .await;
            }

            ProtocolMessage::UserChatAction { action, .. } => {
                self.broadcast(self.builder.chat_action(client_id, &action), Some(client_id))
                    .await;
            }

            ProtocolMessage::GameChatMessage { message } => {
                self.broadcast(self.builder.game_chat(&message), None).await;
            }

            ProtocolMessage::UserLevelUpdate { level, .. } => {
                if let Some(client) = self.clients.write().await.get_mut(client_id) {
                    client.user.set_level(level);
                }
                self.broadcast(self.builder.level_update(client_id, level), Some(client_id))
                    .await;
            }

            ProtocolMessage::ClassicModeAddLines { lines, .. } => {
                if !self.session.is_alive(client_id) {
                    return;
                }
                self.broadcast(
                    self.builder.classic_add_lines(client_id, lines),
                    Some(client_id),
                )
                .await;
            }

            ProtocolMessage::UserSpecialUsedForAll { special, .. } => {
                self.relay_special(client_id, 0, special).await;
            }

            ProtocolMessage::UserSpecialUsed {
                target_id, special, ..
            } => {
                if !self.session.is_alive(target_id) {
                    warn!(
                        "Client {} used {:?} on player {} who is not playing",
                        client_id, special, target_id
                    );
                    return;
                }
                self.relay_special(client_id, target_id, special).await;
            }

            ProtocolMessage::UserLost { .. } => {
                self.handle_player_lost(client_id, true).await;
            }

            ProtocolMessage::PauseGame { .. } => {
                if self.session.pause() {
                    info!("Client {} paused the game", client_id);
                    self.broadcast(self.builder.pause(), None).await;
                }
            }

            ProtocolMessage::ResumeGame { .. } => {
                if self.session.resume() {
                    info!("Client {} resumed the game", client_id);
                    self.broadcast(self.builder.resume(), None).await;
                }
            }

            ProtocolMessage::UserFullFieldUpdate { cells, .. } => {
                if let Some(client) = self.clients.write().await.get_mut(client_id) {
                    client.user.field_mut().update_cells(&cells);
                }
                self.broadcast(
                    self.builder.full_field_update(client_id, &cells),
                    Some(client_id),
                )
                .await;
            }

            ProtocolMessage::UserPartialFieldUpdate { positions, .. } => {
                let applied = match self.clients.write().await.get_mut(client_id) {
                    Some(client) => client.user.field_mut().apply_partial(&positions),
                    None => false,
                };
                if !applied {
                    warn!("Client {} sent an out-of-range field update", client_id);
                    return;
                }
                if let Some(update) = self.builder.partial_field_update(client_id, &positions) {
                    self.broadcast(update, Some(client_id)).await;
                }
            }

            ProtocolMessage::ClientInformationReceived { name, version } => {
                info!("Client {} runs {} {}", client_id, name, version);
                if let Some(client) = self.clients.write().await.get_mut(client_id) {
                    client.client_info = Some((name, version));
                }
            }

            ProtocolMessage::StartGame { .. } => self.start_game(client_id).await,

            ProtocolMessage::StopGame { .. } => {
                if self.session.stop() {
                    info!("Client {} stopped the game", client_id);
                    self.finish_game().await;
                }
            }

            other => {
                warn!(
                    "Unexpected {:?} message from client {}",
                    other.kind(),
                    client_id
                );
            }
        }
    }

    async fn handle_login(&mut self, client_id: i32, username: &str, version: &str) {
        let taken = self.clients.read().await.is_name_taken(username);
        if taken {
            warn!("Client {} asked for taken name {}", client_id, username);
            self.send_to(client_id, self.builder.connection_denied(NAME_TAKEN_REASON))
                .await;
            self.disconnect_client(client_id, DisconnectReason::Kicked)
                .await;
            return;
        }

        if let Some(client) = self.clients.write().await.get_mut(client_id) {
            client.user.set_name(username);
            client.logged_in = true;
        }
        info!(
            "Client {} logged in as {} (version {})",
            client_id, username, version
        );

        self.broadcast(self.builder.user_joined(client_id, username), Some(client_id))
            .await;

        let others: Vec<(i32, String, String)> = self
            .clients
            .read()
            .await
            .logged_in_users()
            .filter(|user| user.id() != client_id)
            .map(|user| (user.id(), user.name().to_string(), user.team_name().to_string()))
            .collect();
        for (other_id, name, team_name) in others {
            self.send_to(client_id, self.builder.user_joined(other_id, &name))
                .await;
            if !team_name.is_empty() {
                self.send_to(client_id, self.builder.team(other_id, &team_name))
                    .await;
            }
        }

        let winlist = build_winlist(self.clients.read().await.logged_in_users());
        self.send_to(client_id, self.builder.winlist(&winlist)).await;

        if self.session.is_running() {
            self.send_to(client_id, self.builder.game_already_in_progress())
                .await;
        }
    }

    async fn relay_special(&mut self, sender_id: i32, target_id: i32, special: Special) {
        if !self.session.is_alive(sender_id) {
            debug!("Ignoring special from player {} who is out", sender_id);
            return;
        }
        match self.builder.special_used(target_id, special, sender_id) {
            Some(message) => self.broadcast(message, Some(sender_id)).await,
            None => warn!("Special {:?} has no wire code", special),
        }
    }

    async fn start_game(&mut self, client_id: i32) {
        if self.session.is_running() {
            self.send_to(client_id, self.builder.game_already_in_progress())
                .await;
            return;
        }

        let players: Vec<(i32, String)> = self
            .clients
            .read()
            .await
            .logged_in_users()
            .map(|user| (user.id(), user.team_name().to_string()))
            .collect();
        if !self.session.start(players) {
            return;
        }

        let options = self.session.options().clone();
        {
            let mut clients = self.clients.write().await;
            for user in clients.logged_in_users_mut() {
                user.field_mut().clear();
                user.inventory_mut().clear();
                user.set_level(options.starting_level);
                user.set_playing(true);
            }
        }
        info!("Client {} started a game", client_id);
        self.broadcast(self.builder.new_game(&options), None).await;
    }

    /// Marks a player as out and announces the winner when the game is decided
    async fn handle_player_lost(&mut self, client_id: i32, announce: bool) {
        if !self.session.is_alive(client_id) {
            return;
        }
        if announce {
            self.broadcast(self.builder.user_lost(client_id), Some(client_id))
                .await;
        }
        if let Some(client) = self.clients.write().await.get_mut(client_id) {
            client.user.set_playing(false);
        }

        match self.session.player_lost(client_id) {
            GameOutcome::Continue => {}
            GameOutcome::Won { user_id } => {
                if let Some(client) = self.clients.write().await.get_mut(user_id) {
                    client.user.add_score(WIN_POINTS);
                    info!("Player {} ({}) won", user_id, client.user.name());
                }
                self.broadcast(self.builder.user_won(user_id), None).await;
                self.finish_game().await;
            }
            GameOutcome::Over => self.finish_game().await,
        }
    }

    async fn finish_game(&mut self) {
        let winlist = {
            let mut clients = self.clients.write().await;
            for user in clients.logged_in_users_mut() {
                user.set_playing(false);
            }
            build_winlist(clients.logged_in_users())
        };
        self.broadcast(self.builder.end_game(), None).await;
        self.broadcast(self.builder.winlist(&winlist), None).await;
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_connection_listener().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut heartbeat_interval = interval(self.config.heartbeat_interval);

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::ClientConnected { stream, addr }) => {
                            self.handle_connection(stream, addr).await;
                        },
                        Some(ServerMessage::MessageReceived { client_id, message }) => {
                            self.handle_message(client_id, message).await;
                        },
                        Some(ServerMessage::InvalidMessage { client_id, error }) => {
                            self.handle_invalid_message(client_id, error).await;
                        },
                        Some(ServerMessage::ClientDisconnected { client_id, addr }) => {
                            // The ID may already belong to a newer connection
                            let current = self
                                .clients
                                .read()
                                .await
                                .get(client_id)
                                .map(|client| client.addr == addr)
                                .unwrap_or(false);
                            if current {
                                self.disconnect_client(client_id, DisconnectReason::Left).await;
                            }
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            warn!("Client {} timed out", client_id);
                            self.disconnect_client(client_id, DisconnectReason::TimedOut).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                }

                // Keep idle connections alive
                _ = heartbeat_interval.tick() => {
                    self.broadcast(self.builder.heartbeat(), None).await;
                }
            }
        }

        let remaining = self.clients.read().await.ids();
        for client_id in remaining {
            let removed = self.clients.write().await.remove_client(client_id);
            if let Some(client) = removed {
                if let Some(task) = client.reader_task {
                    task.abort();
                }
                client.writer.close().await;
                debug!("Client {} dropped: {}", client_id, DisconnectReason::ServerShutdown);
            }
        }

        Ok(())
    }
}

/// Player ID a message claims to come from, if it names one
fn claimed_sender(message: &ProtocolMessage) -> Option<i32> {
    match message {
        ProtocolMessage::UserTeamNameChanged { user_id, .. }
        | ProtocolMessage::UserChatMessage { user_id, .. }
        | ProtocolMessage::UserChatAction { user_id, .. }
        | ProtocolMessage::UserLevelUpdate { user_id, .. }
        | ProtocolMessage::UserLost { user_id }
        | ProtocolMessage::UserFullFieldUpdate { user_id, .. }
        | ProtocolMessage::UserPartialFieldUpdate { user_id, .. }
        | ProtocolMessage::StartGame { user_id }
        | ProtocolMessage::StopGame { user_id } => Some(*user_id),
        ProtocolMessage::ClassicModeAddLines { sender_id, .. }
        | ProtocolMessage::UserSpecialUsedForAll { sender_id, .. }
        | ProtocolMessage::UserSpecialUsed { sender_id, .. } => Some(*sender_id),
        ProtocolMessage::PauseGame { user_id } | ProtocolMessage::ResumeGame { user_id } => {
            *user_id
        }
        // Only the server may send specials as player 0
        ProtocolMessage::ServerSpecialUsed { .. } => Some(0),
        _ => None,
    }
}
