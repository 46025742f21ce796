//! Connected player management for the lobby server
//!
//! This module handles the server-side bookkeeping of connected players, including:
//! - Connection lifecycle (accept, login, disconnect, timeout)
//! - Player ID allocation through a dense pool (lowest free ID first)
//! - Connection health monitoring via last-activity timestamps
//! - Name uniqueness and lookup of the writers used for relaying messages
//!
//! The client manager is the single owner of every player's `User` record,
//! including the server's mirror of their field.

use log::info;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tetri_shared::connection::FrameWriter;
use tetri_shared::{Pool, User};
use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;

/// Write half of a player connection, boxed so tests can use mock streams
pub type ClientWriter = FrameWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// Represents a connected player
///
/// Each client maintains:
/// - Connection metadata (address, last activity, reader task)
/// - Login state and the version information the client reported
/// - The `User` record holding name, team, level, score and field
pub struct Client {
    /// Player data; the user ID is the pool slot ID
    pub user: User,
    /// Network address the connection was accepted from
    pub addr: SocketAddr,
    /// Framed writer for sending messages to this player
    pub writer: ClientWriter,
    /// Last time we received any message from this client
    pub last_seen: Instant,
    /// Whether the obfuscated login line has been accepted
    pub logged_in: bool,
    /// Client name and version from `clientinfo`, if sent
    pub client_info: Option<(String, String)>,
    /// Task reading frames from this connection
    pub reader_task: Option<JoinHandle<()>>,
}

impl Client {
    /// Creates a client that has connected but not yet logged in
    pub fn new(addr: SocketAddr, writer: ClientWriter) -> Self {
        Self {
            user: User::new(0, ""),
            addr,
            writer,
            last_seen: Instant::now(),
            logged_in: false,
            client_info: None,
            reader_task: None,
        }
    }

    pub fn id(&self) -> i32 {
        self.user.id()
    }

    /// Records activity from the client
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if no message has been received from this client
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected players
///
/// The ClientManager wraps a `Pool` whose invalid ID is 0, so player IDs
/// run from 1 to `max_clients` and a freed ID is handed to the next
/// connection. This matches the protocol, where ID 0 means "the server"
/// or "everyone".
pub struct ClientManager {
    /// Connected clients indexed by player ID
    clients: Pool<Client>,
    /// Silence after which a client is considered gone
    timeout: Duration,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity and timeout
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: Pool::with_limits(0, max_clients),
            timeout,
        }
    }

    /// Attempts to add a new connection
    ///
    /// Returns Some(player_id) if successful, None if the server is at
    /// capacity. The ID is also stored in the client's `User`.
    pub fn add_client(&mut self, addr: SocketAddr, writer: ClientWriter) -> Option<i32> {
        let client_id = self.clients.add(Client::new(addr, writer))?;
        if let Ok(client) = self.clients.get_mut(client_id) {
            client.user.set_id(client_id);
        }
        info!("Client {} connected from {}", client_id, addr);
        Some(client_id)
    }

    /// Removes a client and returns it so the caller can close its connection
    pub fn remove_client(&mut self, client_id: i32) -> Option<Client> {
        let client = self.clients.take(client_id)?;
        info!("Client {} disconnected", client_id);
        Some(client)
    }

    pub fn get(&self, client_id: i32) -> Option<&Client> {
        self.clients.get(client_id).ok()
    }

    pub fn get_mut(&mut self, client_id: i32) -> Option<&mut Client> {
        self.clients.get_mut(client_id).ok()
    }

    /// Lists clients that have been silent for longer than the timeout
    ///
    /// Unlike removal, this leaves the clients in place: the server loop
    /// decides how to announce their departure.
    pub fn check_timeouts(&self) -> Vec<i32> {
        self.clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(self.timeout))
            .map(|(id, _)| id)
            .collect()
    }

    /// Whether a logged-in player already uses `name` (case-insensitive)
    pub fn is_name_taken(&self, name: &str) -> bool {
        self.clients
            .iter()
            .any(|(_, c)| c.logged_in && c.user.name().eq_ignore_ascii_case(name))
    }

    pub fn writer(&self, client_id: i32) -> Option<ClientWriter> {
        self.get(client_id).map(|c| c.writer.clone())
    }

    /// Writers of all logged-in players except `exclude`
    ///
    /// Used for relaying messages; clients still waiting to log in never
    /// receive lobby traffic.
    pub fn logged_in_writers(&self, exclude: Option<i32>) -> Vec<(i32, ClientWriter)> {
        self.clients
            .iter()
            .filter(|(id, client)| client.logged_in && Some(*id) != exclude)
            .map(|(id, client)| (id, client.writer.clone()))
            .collect()
    }

    pub fn logged_in_users(&self) -> impl Iterator<Item = &User> + '_ {
        self.clients
            .iter()
            .filter(|(_, c)| c.logged_in)
            .map(|(_, c)| &c.user)
    }

    pub fn logged_in_users_mut(&mut self) -> impl Iterator<Item = &mut User> + '_ {
        self.clients
            .iter_mut()
            .filter(|(_, c)| c.logged_in)
            .map(|(_, c)| &mut c.user)
    }

    pub fn ids(&self) -> Vec<i32> {
        self.clients.ids()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.clients.is_full()
    }
}
