//! TetriNET / TetriFast text protocol.
//!
//! Messages are space separated, the first token selecting the kind, and
//! are framed by a trailing `0xFF`. The two dialects differ only in a few
//! keywords (`playernum` vs `)#)(!@(*3`, `newgame` vs `*******`) and in the
//! command hidden inside the obfuscated login line.

pub mod builder;
pub mod framing;
pub mod login;
pub mod parser;

use crate::cell::Special;
use crate::field::CellPosition;
use crate::options::GameOptions;
use crate::winlist::WinlistEntry;
use crate::Cell;
use serde::{Deserialize, Serialize};

pub use builder::MessageBuilder;
pub use framing::{encode_frame, FrameDecoder, MAX_FRAME_LEN};
pub use parser::MessageParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Protocol {
    /// Not negotiated yet; the first `playernum` decides.
    #[default]
    Unspecified,
    TetriNet,
    TetriFast,
}

impl Protocol {
    /// Command expected inside the decoded login line.
    pub fn login_command(self) -> Option<&'static str> {
        match self {
            Protocol::Unspecified => None,
            Protocol::TetriNet => Some("tetrisstart"),
            Protocol::TetriFast => Some("tetrifaster"),
        }
    }

    pub fn player_number_key(self) -> &'static str {
        match self {
            Protocol::TetriFast => ")#)(!@(*3",
            _ => "playernum",
        }
    }

    pub fn new_game_key(self) -> &'static str {
        match self {
            Protocol::TetriFast => "*******",
            _ => "newgame",
        }
    }
}

/// Discriminant of [`ProtocolMessage`], used to register consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    ClientJoined,
    UserJoined,
    UserLeft,
    UserTeamNameChanged,
    WinlistReceived,
    ServerChatMessage,
    UserChatMessage,
    ServerChatAction,
    UserChatAction,
    GameChatMessage,
    NewGameStarted,
    GameIsAlreadyInProgress,
    RequestClientInformation,
    UserLevelUpdate,
    ClassicModeAddLines,
    ServerSpecialUsedForAll,
    UserSpecialUsedForAll,
    ServerSpecialUsed,
    UserSpecialUsed,
    UserLost,
    UserWon,
    PauseGame,
    ResumeGame,
    EndGame,
    ConnectionDenied,
    HeartBeat,
    UserFullFieldUpdate,
    UserPartialFieldUpdate,
    ClientLogIn,
    ClientInformationReceived,
    StartGame,
    StopGame,
}

impl MessageKind {
    /// Kinds a server connection consumes.
    pub const SERVER_BOUND: &'static [MessageKind] = &[
        MessageKind::UserTeamNameChanged,
        MessageKind::UserChatMessage,
        MessageKind::UserChatAction,
        MessageKind::GameChatMessage,
        MessageKind::UserLevelUpdate,
        MessageKind::ClassicModeAddLines,
        MessageKind::UserSpecialUsedForAll,
        MessageKind::ServerSpecialUsed,
        MessageKind::UserSpecialUsed,
        MessageKind::UserLost,
        MessageKind::PauseGame,
        MessageKind::ResumeGame,
        MessageKind::HeartBeat,
        MessageKind::UserFullFieldUpdate,
        MessageKind::UserPartialFieldUpdate,
        MessageKind::ClientLogIn,
        MessageKind::ClientInformationReceived,
        MessageKind::StartGame,
        MessageKind::StopGame,
    ];

    /// Kinds a client connection consumes.
    pub const CLIENT_BOUND: &'static [MessageKind] = &[
        MessageKind::ClientJoined,
        MessageKind::UserJoined,
        MessageKind::UserLeft,
        MessageKind::UserTeamNameChanged,
        MessageKind::WinlistReceived,
        MessageKind::ServerChatMessage,
        MessageKind::UserChatMessage,
        MessageKind::ServerChatAction,
        MessageKind::UserChatAction,
        MessageKind::GameChatMessage,
        MessageKind::NewGameStarted,
        MessageKind::GameIsAlreadyInProgress,
        MessageKind::RequestClientInformation,
        MessageKind::UserLevelUpdate,
        MessageKind::ClassicModeAddLines,
        MessageKind::ServerSpecialUsedForAll,
        MessageKind::UserSpecialUsedForAll,
        MessageKind::ServerSpecialUsed,
        MessageKind::UserSpecialUsed,
        MessageKind::UserLost,
        MessageKind::UserWon,
        MessageKind::PauseGame,
        MessageKind::ResumeGame,
        MessageKind::EndGame,
        MessageKind::ConnectionDenied,
        MessageKind::HeartBeat,
        MessageKind::UserFullFieldUpdate,
        MessageKind::UserPartialFieldUpdate,
    ];
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolMessage {
    ClientJoined { user_id: i32, protocol: Protocol },
    UserJoined { user_id: i32, name: String },
    UserLeft { user_id: i32 },
    UserTeamNameChanged { user_id: i32, team_name: String },
    WinlistReceived { entries: Vec<WinlistEntry> },
    ServerChatMessage { message: String },
    UserChatMessage { user_id: i32, message: String },
    ServerChatAction { action: String },
    UserChatAction { user_id: i32, action: String },
    GameChatMessage { message: String },
    NewGameStarted { options: GameOptions },
    GameIsAlreadyInProgress,
    RequestClientInformation,
    UserLevelUpdate { user_id: i32, level: u32 },
    ClassicModeAddLines { sender_id: i32, lines: u32 },
    ServerSpecialUsedForAll { special: Special },
    UserSpecialUsedForAll { sender_id: i32, special: Special },
    ServerSpecialUsed { target_id: i32, special: Special },
    UserSpecialUsed { sender_id: i32, target_id: i32, special: Special },
    UserLost { user_id: i32 },
    UserWon { user_id: i32 },
    /// `user_id` is set when a client asks the server to pause.
    PauseGame { user_id: Option<i32> },
    ResumeGame { user_id: Option<i32> },
    EndGame,
    ConnectionDenied { reason: String },
    HeartBeat,
    UserFullFieldUpdate { user_id: i32, cells: Vec<Cell> },
    UserPartialFieldUpdate { user_id: i32, positions: Vec<CellPosition> },
    ClientLogIn { username: String, version: String, protocol: Protocol },
    ClientInformationReceived { name: String, version: String },
    StartGame { user_id: i32 },
    StopGame { user_id: i32 },
}

impl ProtocolMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ProtocolMessage::ClientJoined { .. } => MessageKind::ClientJoined,
            ProtocolMessage::UserJoined { .. } => MessageKind::UserJoined,
            ProtocolMessage::UserLeft { .. } => MessageKind::UserLeft,
            ProtocolMessage::UserTeamNameChanged { .. } => MessageKind::UserTeamNameChanged,
            ProtocolMessage::WinlistReceived { .. } => MessageKind::WinlistReceived,
            ProtocolMessage::ServerChatMessage { .. } => MessageKind::ServerChatMessage,
            ProtocolMessage::UserChatMessage { .. } => MessageKind::UserChatMessage,
            ProtocolMessage::ServerChatAction { .. } => MessageKind::ServerChatAction,
            ProtocolMessage::UserChatAction { .. } => MessageKind::UserChatAction,
            ProtocolMessage::GameChatMessage { .. } => MessageKind::GameChatMessage,
            ProtocolMessage::NewGameStarted { .. } => MessageKind::NewGameStarted,
            ProtocolMessage::GameIsAlreadyInProgress => MessageKind::GameIsAlreadyInProgress,
            ProtocolMessage::RequestClientInformation => MessageKind::RequestClientInformation,
            ProtocolMessage::UserLevelUpdate { .. } => MessageKind::UserLevelUpdate,
            ProtocolMessage::ClassicModeAddLines { .. } => MessageKind::ClassicModeAddLines,
            ProtocolMessage::ServerSpecialUsedForAll { .. } => MessageKind::ServerSpecialUsedForAll,
            ProtocolMessage::UserSpecialUsedForAll { .. } => MessageKind::UserSpecialUsedForAll,
            ProtocolMessage::ServerSpecialUsed { .. } => MessageKind::ServerSpecialUsed,
            ProtocolMessage::UserSpecialUsed { .. } => MessageKind::UserSpecialUsed,
            ProtocolMessage::UserLost { .. } => MessageKind::UserLost,
            ProtocolMessage::UserWon { .. } => MessageKind::UserWon,
            ProtocolMessage::PauseGame { .. } => MessageKind::PauseGame,
            ProtocolMessage::ResumeGame { .. } => MessageKind::ResumeGame,
            ProtocolMessage::EndGame => MessageKind::EndGame,
            ProtocolMessage::ConnectionDenied { .. } => MessageKind::ConnectionDenied,
            ProtocolMessage::HeartBeat => MessageKind::HeartBeat,
            ProtocolMessage::UserFullFieldUpdate { .. } => MessageKind::UserFullFieldUpdate,
            ProtocolMessage::UserPartialFieldUpdate { .. } => MessageKind::UserPartialFieldUpdate,
            ProtocolMessage::ClientLogIn { .. } => MessageKind::ClientLogIn,
            ProtocolMessage::ClientInformationReceived { .. } => {
                MessageKind::ClientInformationReceived
            }
            ProtocolMessage::StartGame { .. } => MessageKind::StartGame,
            ProtocolMessage::StopGame { .. } => MessageKind::StopGame,
        }
    }
}
