//! # TetriNET Lobby Server Library
//!
//! This library provides the server side of a TetriNET/TetriFast game: it
//! accepts TCP connections, hands out player numbers, checks logins, relays
//! chat, field updates and specials between players, and decides when a
//! game starts, pauses and ends.
//!
//! ## Core Responsibilities
//!
//! ### Lobby Management
//! Handles the complete lifecycle of player connections including:
//! - Player number assignment (lowest free ID, 1 to the user limit)
//! - Decoding the obfuscated login line and rejecting duplicate names
//! - Announcing joins, leaves and team changes to everybody else
//! - Heartbeats and timeout-based cleanup
//!
//! ### Message Relaying
//! Fields are simulated by the clients. The server keeps a mirror of each
//! player's field from the updates it relays, checks that every message
//! comes from the player it names, and forwards it to the others.
//!
//! ### Game Control
//! A player starts or stops the game for everyone. When all but one player
//! or team have lost, the server announces the winner, ends the game and
//! sends the updated winlist.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! All lobby decisions are made by one loop processing events in order.
//! Reader tasks only parse frames and forward them, so there are no races
//! between two players' messages.
//!
//! ### TCP Text Protocol
//! Messages are plain text terminated by a `0xFF` byte. Parsing and
//! building live in the shared crate so client and server agree on every
//! character.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Manages connected players:
//! - Player ID allocation through a dense pool
//! - Login state, names and the mirrored `User` records
//! - Client timeout detection
//!
//! ### Game Module (`game`)
//! Tracks the running game:
//! - Participants and their teams
//! - Pause state
//! - Winner detection
//!
//! ### Network Module (`network`)
//! Handles all networking operations:
//! - Connection acceptance and per-connection reader tasks
//! - The outgoing message queue
//! - Message validation and relaying
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use tetri_server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Bind to the standard TetriNET port with default rules
//!     let mut server = Server::new("0.0.0.0:31457", ServerConfig::default()).await?;
//!
//!     // Start the server - this runs the main loop which:
//!     // - Accepts connections and assigns player numbers
//!     // - Decodes logins and relays lobby and game messages
//!     // - Starts, pauses and ends games on request
//!     // - Handles client timeouts and disconnections
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server uses an event-driven architecture with internal async tasks that handle:
//! - **Connection Listener**: Accepts TCP connections
//! - **Client Readers**: One per connection, parsing frames into messages
//! - **Network Sender**: Processes the outgoing message queue
//! - **Timeout Checker**: Reports clients that went silent
//! - **Main Loop**: Applies every event and sends heartbeats

pub mod client_manager;
pub mod game;
pub mod network;
