//! # TetriNET engine core
//!
//! Shared by the lobby server and the client: the cell and block model, the
//! per-player field with its tick-driven block state machine, the dense user
//! pool, and the text protocol codec (parser, builder, login obfuscation and
//! `0xFF` framing).
//!
//! ## Module Organization
//!
//! - `cell`: cell states and special items, with their wire characters
//! - `block`: the seven block kinds and the cached rotation table
//! - `field`: the 12x22 grid plus the falling block
//! - `game`: block descent, landing and loss per elapsed second
//! - `inventory`, `options`, `user`, `winlist`: per-player and per-game data
//! - `pool`: slot allocator handing out the lowest free user ID
//! - `protocol`: message parser, builder, login encoding and framing
//! - `connection`: async frame reader/writer over any tokio stream

pub mod block;
pub mod cell;
pub mod connection;
pub mod error;
pub mod field;
pub mod game;
pub mod inventory;
pub mod options;
pub mod pool;
pub mod protocol;
pub mod user;
pub mod winlist;

pub use block::{Block, BlockRotation, BlockShape};
pub use cell::{Cell, Special};
pub use error::ProtocolError;
pub use field::{CellPosition, FallingBlock, Field};
pub use game::{BlockStepState, GameEvent, GameManager};
pub use inventory::Inventory;
pub use options::GameOptions;
pub use pool::Pool;
pub use protocol::{MessageKind, Protocol, ProtocolMessage};
pub use user::User;
pub use winlist::WinlistEntry;

pub const FIELD_WIDTH: usize = 12;
pub const FIELD_HEIGHT: usize = 22;
pub const FIELD_SIZE: usize = FIELD_WIDTH * FIELD_HEIGHT;

pub const DEFAULT_PORT: u16 = 31457;
pub const DEFAULT_MAX_USERS: usize = 6;

/// Byte terminating every message on the wire.
pub const FRAME_TERMINATOR: u8 = 0xFF;

/// Version string sent inside the login line.
pub const CLIENT_VERSION: &str = "1.13";
