//! # TetriNET Console Client Library
//!
//! This library provides a text-mode TetriNET/TetriFast client. It logs in
//! to a lobby server, mirrors the other players, runs the local player's
//! field when a game starts, and turns console lines into chat and block
//! controls.
//!
//! ## Architecture Overview
//!
//! ### Local Simulation
//! Each client runs its own field: the block timer, landing, line clears,
//! level changes and specials all happen locally. The server only relays
//! the results, so the client sends a field update after every change and
//! announces its own loss.
//!
//! ### Minimal Field Traffic
//! The client remembers the field it last sent. After every step it sends
//! only the cells that changed since then, or the whole field when most of
//! it did.
//!
//! ### Mirrored Players
//! Other players' fields, teams and levels are kept from the server's
//! relays. They are needed for specials such as switching fields.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! Contains the local game state:
//! - The local `GameManager` and its tick driver entry point
//! - Mirrors of the other players in a pool keyed by player number
//! - Translation of game events into outgoing messages
//!
//! ### Input Module (`input`)
//! Handles console input:
//! - Chat, team and game-control commands
//! - Block controls and special use
//! - The stdin reader task
//!
//! ### Network Module (`network`)
//! Manages all client-server communication:
//! - TCP connection and login salt derivation
//! - Login handshake after the server assigns a player number
//! - The tick driver task and heartbeats
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tetri_client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("127.0.0.1:31457", "alice", "red", Duration::from_millis(20));
//!
//!     // Logs in, then processes server messages, console commands and
//!     // block timer ticks until the server or the user ends the session
//!     client.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Design Philosophy
//!
//! ### Mutually Exclusive Actions
//! Console actions and timer ticks lock the same game, so a drop and a
//! gravity step never interleave.
//!
//! ### Graceful Degradation
//! Malformed server messages are logged and skipped; a refused connection
//! or a closed stream ends the session cleanly.

pub mod game;
pub mod input;
pub mod network;
