//! Text message parser.
//!
//! A parser is built with the set of [`MessageKind`]s its owner consumes.
//! Every input gives exactly one result: the decoded message, a
//! `MalformedMessage` error when the text does not follow the grammar, or
//! `MessageKindUnhandled` when it does but nobody registered for that kind.

use std::collections::HashSet;

use crate::block::Block;
use crate::cell::{Cell, Special};
use crate::error::ProtocolError;
use crate::field::CellPosition;
use crate::options::{GameOptions, FREQUENCY_TABLE_LEN};
use crate::protocol::{login, MessageKind, Protocol, ProtocolMessage};
use crate::winlist::WinlistEntry;
use crate::{FIELD_HEIGHT, FIELD_SIZE, FIELD_WIDTH};

/// Offset of partial-update coordinates: `'3'` is column/row 0.
const COORDINATE_BASE: u8 = 0x33;

pub struct MessageParser {
    protocol: Protocol,
    handled: HashSet<MessageKind>,
}

impl MessageParser {
    pub fn new(protocol: Protocol, handled: &[MessageKind]) -> Self {
        MessageParser {
            protocol,
            handled: handled.iter().copied().collect(),
        }
    }

    /// Parser for the server side of a connection.
    pub fn for_server(protocol: Protocol) -> Self {
        Self::new(protocol, MessageKind::SERVER_BOUND)
    }

    /// Parser for the client side; the dialect is learned from `playernum`.
    pub fn for_client() -> Self {
        Self::new(Protocol::Unspecified, MessageKind::CLIENT_BOUND)
    }

    /// Parser consuming every kind.
    pub fn accepting_all(protocol: Protocol) -> Self {
        let mut parser = Self::new(protocol, MessageKind::SERVER_BOUND);
        parser.handled.extend(MessageKind::CLIENT_BOUND.iter().copied());
        parser
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn set_protocol(&mut self, protocol: Protocol) {
        self.protocol = protocol;
    }

    pub fn handles(&self, kind: MessageKind) -> bool {
        self.handled.contains(&kind)
    }

    /// Parses one frame's text.
    ///
    /// A `ClientJoined` result also switches this parser to the announced
    /// dialect, so a second `playernum` is rejected.
    pub fn parse(&mut self, message: &str) -> Result<ProtocolMessage, ProtocolError> {
        let parsed = self
            .decode(message)
            .ok_or_else(|| ProtocolError::malformed(message))?;
        let kind = parsed.kind();
        if !self.handles(kind) {
            return Err(ProtocolError::MessageKindUnhandled {
                kind,
                message: message.to_string(),
            });
        }
        if let ProtocolMessage::ClientJoined { protocol, .. } = &parsed {
            self.protocol = *protocol;
        }
        Ok(parsed)
    }

    fn decode(&self, message: &str) -> Option<ProtocolMessage> {
        let tokens: Vec<&str> = message.split(' ').collect();
        let key = tokens[0];
        let content = remainder(message, &tokens, 1);

        let parsed = match key {
            "playernum" | ")#)(!@(*3" => {
                if self.protocol != Protocol::Unspecified || tokens.len() < 2 {
                    return None;
                }
                let protocol = if key == "playernum" {
                    Protocol::TetriNet
                } else {
                    Protocol::TetriFast
                };
                ProtocolMessage::ClientJoined {
                    user_id: parse_id(tokens[1])?,
                    protocol,
                }
            }
            "playerjoin" => {
                if tokens.len() < 3 || tokens[2].is_empty() {
                    return None;
                }
                ProtocolMessage::UserJoined {
                    user_id: parse_id(tokens[1])?,
                    name: tokens[2].to_string(),
                }
            }
            "playerleave" => ProtocolMessage::UserLeft {
                user_id: parse_id(tokens.get(1)?)?,
            },
            "team" => ProtocolMessage::UserTeamNameChanged {
                user_id: parse_id(tokens.get(1)?)?,
                team_name: remainder(message, &tokens, 2).to_string(),
            },
            "winlist" => ProtocolMessage::WinlistReceived {
                entries: parse_winlist(&tokens[1..])?,
            },
            "pline" | "plineact" => {
                if tokens.len() < 3 {
                    return None;
                }
                let user_id = parse_id(tokens[1])?;
                let text = remainder(message, &tokens, 2).to_string();
                match (key, user_id) {
                    ("pline", 0) => ProtocolMessage::ServerChatMessage { message: text },
                    ("pline", _) => ProtocolMessage::UserChatMessage {
                        user_id,
                        message: text,
                    },
                    (_, 0) => ProtocolMessage::ServerChatAction { action: text },
                    _ => ProtocolMessage::UserChatAction {
                        user_id,
                        action: text,
                    },
                }
            }
            "gmsg" => {
                if tokens.len() < 2 {
                    return None;
                }
                ProtocolMessage::GameChatMessage {
                    message: content.to_string(),
                }
            }
            "newgame" | "*******" => ProtocolMessage::NewGameStarted {
                options: parse_new_game(&tokens[1..])?,
            },
            "ingame" => ProtocolMessage::GameIsAlreadyInProgress,
            "lvl" => {
                if tokens.len() < 3 {
                    return None;
                }
                let user_id = parse_id(tokens[1])?;
                let level: u32 = tokens[2].parse().ok()?;
                if user_id == 0 && level == 0 {
                    ProtocolMessage::RequestClientInformation
                } else {
                    ProtocolMessage::UserLevelUpdate { user_id, level }
                }
            }
            "sb" => {
                if tokens.len() < 4 {
                    return None;
                }
                parse_special_used(parse_id(tokens[1])?, tokens[2], parse_id(tokens[3])?)?
            }
            "playerlost" => ProtocolMessage::UserLost {
                user_id: parse_id(content)?,
            },
            "playerwon" => ProtocolMessage::UserWon {
                user_id: parse_id(content)?,
            },
            "pause" => {
                let paused = parse_flag(tokens.get(1)?)?;
                let user_id = match tokens.get(2) {
                    Some(id) => Some(parse_id(id)?),
                    None => None,
                };
                if paused {
                    ProtocolMessage::PauseGame { user_id }
                } else {
                    ProtocolMessage::ResumeGame { user_id }
                }
            }
            "endgame" => ProtocolMessage::EndGame,
            "noconnecting" => ProtocolMessage::ConnectionDenied {
                reason: content.to_string(),
            },
            "f" => {
                if tokens.len() < 3 {
                    return None;
                }
                parse_field_update(parse_id(tokens[1])?, tokens[2])?
            }
            "" => ProtocolMessage::HeartBeat,
            "clientinfo" => {
                if tokens.len() < 3 {
                    return None;
                }
                ProtocolMessage::ClientInformationReceived {
                    name: tokens[1].to_string(),
                    version: tokens[2].to_string(),
                }
            }
            "gamestart" => {
                if tokens.len() < 3 {
                    return None;
                }
                let start = parse_flag(tokens[1])?;
                let user_id = parse_id(tokens[2])?;
                if start {
                    ProtocolMessage::StartGame { user_id }
                } else {
                    ProtocolMessage::StopGame { user_id }
                }
            }
            _ => self.decode_login(message)?,
        };
        Some(parsed)
    }

    fn decode_login(&self, message: &str) -> Option<ProtocolMessage> {
        let command = self.protocol.login_command()?;
        let decoded = login::decode_login(message, command)?;
        let tokens: Vec<&str> = decoded.split(' ').collect();
        if tokens.len() < 3 || tokens[0] != command || tokens[1].is_empty() {
            return None;
        }
        Some(ProtocolMessage::ClientLogIn {
            username: tokens[1].to_string(),
            version: tokens[2].to_string(),
            protocol: self.protocol,
        })
    }
}

/// Text following the first `count` tokens and their separators.
fn remainder<'a>(message: &'a str, tokens: &[&str], count: usize) -> &'a str {
    let skip: usize = tokens.iter().take(count).map(|t| t.len() + 1).sum();
    message.get(skip..).unwrap_or("")
}

fn parse_id(token: &str) -> Option<i32> {
    token.parse().ok()
}

fn parse_flag(token: &str) -> Option<bool> {
    match token {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

fn parse_special_used(target_id: i32, code: &str, sender_id: i32) -> Option<ProtocolMessage> {
    if let Some(special) = Special::from_code(code) {
        let message = match (target_id, sender_id) {
            (0, 0) => ProtocolMessage::ServerSpecialUsedForAll { special },
            (0, _) => ProtocolMessage::UserSpecialUsedForAll { sender_id, special },
            (_, 0) => ProtocolMessage::ServerSpecialUsed { target_id, special },
            _ => ProtocolMessage::UserSpecialUsed {
                sender_id,
                target_id,
                special,
            },
        };
        return Some(message);
    }
    let lines: u32 = code.strip_prefix("cs")?.parse().ok()?;
    if target_id != 0 {
        return None;
    }
    Some(ProtocolMessage::ClassicModeAddLines { sender_id, lines })
}

fn parse_field_update(user_id: i32, update: &str) -> Option<ProtocolMessage> {
    let first = update.chars().next()?;
    if Cell::from_full_update_char(first).is_some() {
        let cells: Vec<Cell> = update
            .chars()
            .map(Cell::from_full_update_char)
            .collect::<Option<_>>()?;
        if cells.len() != FIELD_SIZE {
            return None;
        }
        return Some(ProtocolMessage::UserFullFieldUpdate { user_id, cells });
    }

    Cell::from_partial_update_char(first)?;
    let bytes = update.as_bytes();
    if bytes.len() % 3 != 0 {
        return None;
    }
    let positions: Vec<CellPosition> = bytes
        .chunks(3)
        .map(|chunk| {
            let cell = Cell::from_partial_update_char(chunk[0] as char)?;
            let x = chunk[1].checked_sub(COORDINATE_BASE)? as usize;
            let y = chunk[2].checked_sub(COORDINATE_BASE)? as usize;
            if x >= FIELD_WIDTH || y >= FIELD_HEIGHT {
                return None;
            }
            Some(CellPosition { cell, x, y })
        })
        .collect::<Option<_>>()?;
    Some(ProtocolMessage::UserPartialFieldUpdate { user_id, positions })
}

fn parse_new_game(fields: &[&str]) -> Option<GameOptions> {
    if fields.len() < 11 {
        return None;
    }
    let numbers: Vec<u32> = fields[..7]
        .iter()
        .map(|f| f.parse().ok())
        .collect::<Option<_>>()?;
    let block_frequencies: Vec<Block> = fields[7]
        .chars()
        .map(|c| Block::from_frequency_digit(c.to_digit(10)?))
        .collect::<Option<_>>()?;
    let display_average_levels = parse_flag(fields[9])?;
    let classic_mode = parse_flag(fields[10])?;
    let specials: Option<Vec<Special>> = fields[8]
        .chars()
        .map(|c| Special::from_frequency_digit(c.to_digit(10)?))
        .collect();
    let special_frequencies = match specials {
        Some(table) if table.len() == FREQUENCY_TABLE_LEN => table,
        _ if classic_mode => Vec::new(),
        _ => return None,
    };

    let options = GameOptions {
        starting_height: numbers[0],
        starting_level: numbers[1],
        lines_per_level: numbers[2],
        level_increment: numbers[3],
        lines_per_special: numbers[4],
        specials_added: numbers[5],
        special_capacity: numbers[6],
        block_frequencies,
        special_frequencies,
        display_average_levels,
        classic_mode,
    };
    options.is_valid().then_some(options)
}

/// Matches `[tp]<name>;<digits>` against the whole of `text`.
fn match_winlist_entry(text: &str) -> Option<WinlistEntry> {
    let is_team = match text.as_bytes().first()? {
        b't' => true,
        b'p' => false,
        _ => return None,
    };
    let body = &text[1..];
    body.match_indices(';')
        .filter(|(i, _)| *i > 0)
        .find_map(|(i, _)| {
            let digits = &body[i + 1..];
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            Some(WinlistEntry {
                is_team,
                name: body[..i].to_string(),
                score: digits.parse().ok()?,
            })
        })
}

/// Entries may contain spaces, so tokens are joined until one matches.
fn parse_winlist(tokens: &[&str]) -> Option<Vec<WinlistEntry>> {
    let mut entries = Vec::new();
    let mut pending: Vec<&str> = Vec::new();
    for token in tokens {
        if pending.is_empty() && token.is_empty() {
            continue;
        }
        pending.push(token);
        if let Some(entry) = match_winlist_entry(&pending.join(" ")) {
            entries.push(entry);
            pending.clear();
        }
    }
    if !pending.is_empty() {
        return None;
    }
    Some(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(message: &str) -> Result<ProtocolMessage, ProtocolError> {
        MessageParser::accepting_all(Protocol::TetriNet).parse(message)
    }

    fn assert_malformed(message: &str) {
        match parse(message) {
            Err(ProtocolError::MalformedMessage { message: m }) => assert_eq!(m, message),
            other => panic!("expected malformed for {:?}, got {:?}", message, other),
        }
    }

    #[test]
    fn test_player_join() {
        assert_eq!(
            parse("playerjoin 3 alice").unwrap(),
            ProtocolMessage::UserJoined {
                user_id: 3,
                name: "alice".to_string()
            }
        );
        assert_malformed("playerjoin x alice");
        assert_malformed("playerjoin 3");
    }

    #[test]
    fn test_full_field_update() {
        let message = format!("f 2 {}", "0".repeat(264));
        match parse(&message).unwrap() {
            ProtocolMessage::UserFullFieldUpdate { user_id, cells } => {
                assert_eq!(user_id, 2);
                assert_eq!(cells.len(), 264);
                assert!(cells.iter().all(|c| *c == Cell::Nothing));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_malformed(&format!("f 2 {}", "0".repeat(263)));
        assert_malformed(&format!("f 2 {}x", "0".repeat(263)));
    }

    #[test]
    fn test_partial_field_update() {
        assert_eq!(
            parse("f 4 \"33").unwrap(),
            ProtocolMessage::UserPartialFieldUpdate {
                user_id: 4,
                positions: vec![CellPosition {
                    cell: Cell::Blue,
                    x: 0,
                    y: 0
                }],
            }
        );
        match parse("f 4 &>H/34").unwrap() {
            ProtocolMessage::UserPartialFieldUpdate { positions, .. } => {
                assert_eq!(positions[0], CellPosition { cell: Cell::Red, x: 11, y: 21 });
                assert_eq!(positions[1], CellPosition { cell: Cell::BlockBomb, x: 0, y: 1 });
            }
            other => panic!("unexpected {:?}", other),
        }
        // column 12 is off the field, so nothing is applied
        assert_malformed("f 4 \"33\"?3");
        assert_malformed("f 4 \"3");
        assert_malformed("f 4 \"32");
    }

    #[test]
    fn test_classic_add_lines() {
        assert_eq!(
            parse("sb 0 cs2 5").unwrap(),
            ProtocolMessage::ClassicModeAddLines {
                sender_id: 5,
                lines: 2
            }
        );
        assert_malformed("sb 3 cs2 5");
        assert_malformed("sb 0 csx 5");
    }

    #[test]
    fn test_special_delivery_shapes() {
        assert_eq!(
            parse("sb 0 a 0").unwrap(),
            ProtocolMessage::ServerSpecialUsedForAll {
                special: Special::AddLine
            }
        );
        assert_eq!(
            parse("sb 0 g 2").unwrap(),
            ProtocolMessage::UserSpecialUsedForAll {
                sender_id: 2,
                special: Special::Gravity
            }
        );
        assert_eq!(
            parse("sb 4 n 0").unwrap(),
            ProtocolMessage::ServerSpecialUsed {
                target_id: 4,
                special: Special::NukeField
            }
        );
        assert_eq!(
            parse("sb 4 o 1").unwrap(),
            ProtocolMessage::UserSpecialUsed {
                sender_id: 1,
                target_id: 4,
                special: Special::BlockBomb
            }
        );
        assert_malformed("sb 4 x 1");
        assert_malformed("sb 4 o");
    }

    #[test]
    fn test_chat_messages_keep_spaces() {
        assert_eq!(
            parse("pline 0 welcome to  the server").unwrap(),
            ProtocolMessage::ServerChatMessage {
                message: "welcome to  the server".to_string()
            }
        );
        assert_eq!(
            parse("pline 2 hi all").unwrap(),
            ProtocolMessage::UserChatMessage {
                user_id: 2,
                message: "hi all".to_string()
            }
        );
        assert_eq!(
            parse("plineact 2 waves").unwrap(),
            ProtocolMessage::UserChatAction {
                user_id: 2,
                action: "waves".to_string()
            }
        );
        assert_eq!(
            parse("plineact 0 restarts").unwrap(),
            ProtocolMessage::ServerChatAction {
                action: "restarts".to_string()
            }
        );
        assert_eq!(
            parse("gmsg <bob> go go").unwrap(),
            ProtocolMessage::GameChatMessage {
                message: "<bob> go go".to_string()
            }
        );
        assert_malformed("pline 2");
    }

    #[test]
    fn test_team_name_may_be_empty() {
        assert_eq!(
            parse("team 2 red dragons").unwrap(),
            ProtocolMessage::UserTeamNameChanged {
                user_id: 2,
                team_name: "red dragons".to_string()
            }
        );
        assert_eq!(
            parse("team 2 ").unwrap(),
            ProtocolMessage::UserTeamNameChanged {
                user_id: 2,
                team_name: String::new()
            }
        );
    }

    #[test]
    fn test_winlist_with_spaces_in_names() {
        let parsed = parse("winlist pbob;12 tthe red team;30").unwrap();
        assert_eq!(
            parsed,
            ProtocolMessage::WinlistReceived {
                entries: vec![
                    WinlistEntry::player("bob", 12),
                    WinlistEntry::team("the red team", 30),
                ]
            }
        );
        assert_eq!(
            parse("winlist").unwrap(),
            ProtocolMessage::WinlistReceived { entries: vec![] }
        );
        assert_malformed("winlist pbob;12 dangling");
        assert_malformed("winlist xbob;12");
    }

    #[test]
    fn test_level_and_client_info_request() {
        assert_eq!(parse("lvl 0 0").unwrap(), ProtocolMessage::RequestClientInformation);
        assert_eq!(
            parse("lvl 3 12").unwrap(),
            ProtocolMessage::UserLevelUpdate {
                user_id: 3,
                level: 12
            }
        );
        assert_malformed("lvl 3 -1");
    }

    #[test]
    fn test_simple_events() {
        assert_eq!(parse("").unwrap(), ProtocolMessage::HeartBeat);
        assert_eq!(parse("endgame").unwrap(), ProtocolMessage::EndGame);
        assert_eq!(parse("ingame").unwrap(), ProtocolMessage::GameIsAlreadyInProgress);
        assert_eq!(parse("playerlost 3").unwrap(), ProtocolMessage::UserLost { user_id: 3 });
        assert_eq!(parse("playerwon 1").unwrap(), ProtocolMessage::UserWon { user_id: 1 });
        assert_eq!(parse("playerleave 5").unwrap(), ProtocolMessage::UserLeft { user_id: 5 });
        assert_eq!(
            parse("noconnecting Server is full!").unwrap(),
            ProtocolMessage::ConnectionDenied {
                reason: "Server is full!".to_string()
            }
        );
        assert_eq!(
            parse("clientinfo tetrinet 1.13").unwrap(),
            ProtocolMessage::ClientInformationReceived {
                name: "tetrinet".to_string(),
                version: "1.13".to_string()
            }
        );
    }

    #[test]
    fn test_pause_and_game_start() {
        assert_eq!(parse("pause 1").unwrap(), ProtocolMessage::PauseGame { user_id: None });
        assert_eq!(
            parse("pause 0 2").unwrap(),
            ProtocolMessage::ResumeGame { user_id: Some(2) }
        );
        assert_eq!(parse("gamestart 1 2").unwrap(), ProtocolMessage::StartGame { user_id: 2 });
        assert_eq!(parse("gamestart 0 2").unwrap(), ProtocolMessage::StopGame { user_id: 2 });
        assert_malformed("pause 2");
        assert_malformed("gamestart 1");
    }

    #[test]
    fn test_new_game_options() {
        let blocks = "1234567".repeat(14) + "12";
        let specials = "123456789".repeat(11) + "1";
        let message = format!("newgame 3 2 4 1 2 1 10 {} {} 1 0", blocks, specials);
        match parse(&message).unwrap() {
            ProtocolMessage::NewGameStarted { options } => {
                assert_eq!(options.starting_height, 3);
                assert_eq!(options.starting_level, 2);
                assert_eq!(options.lines_per_level, 4);
                assert_eq!(options.special_capacity, 10);
                assert_eq!(options.block_frequencies[6], Block::HalfCross);
                assert_eq!(options.special_frequencies[8], Special::BlockBomb);
                assert!(options.display_average_levels);
                assert!(!options.classic_mode);
            }
            other => panic!("unexpected {:?}", other),
        }

        // classic mode does not need a special table
        let classic = format!("******* 0 1 2 1 1 1 18 {} 0 1 1", blocks);
        match parse(&classic).unwrap() {
            ProtocolMessage::NewGameStarted { options } => {
                assert!(options.classic_mode);
                assert!(options.special_frequencies.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_malformed(&format!("newgame 3 0 4 1 2 1 10 {} {} 1 0", blocks, specials));
        assert_malformed(&format!("newgame 3 2 4 1 2 1 10 {} {} 1", blocks, specials));
        assert_malformed(&format!("newgame 3 2 4 1 2 1 10 {}8 {} 1 0", &blocks[1..], specials));
        assert_malformed(&format!("newgame 3 2 4 1 2 1 10 {} {} 1 0", blocks, "0".repeat(100)));
    }

    #[test]
    fn test_player_number_switches_protocol_once() {
        let mut parser = MessageParser::for_client();
        assert_eq!(
            parser.parse(")#)(!@(*3 2").unwrap(),
            ProtocolMessage::ClientJoined {
                user_id: 2,
                protocol: Protocol::TetriFast
            }
        );
        assert_eq!(parser.protocol(), Protocol::TetriFast);
        assert!(parser.parse("playernum 3").unwrap_err().is_malformed());
    }

    #[test]
    fn test_login_requires_negotiated_protocol() {
        let encoded = login::encode_login("tetrisstart dave 1.13", "6875", 99);
        let mut server = MessageParser::for_server(Protocol::TetriNet);
        assert_eq!(
            server.parse(&encoded).unwrap(),
            ProtocolMessage::ClientLogIn {
                username: "dave".to_string(),
                version: "1.13".to_string(),
                protocol: Protocol::TetriNet
            }
        );

        let mut unnegotiated = MessageParser::accepting_all(Protocol::Unspecified);
        assert!(unnegotiated.parse(&encoded).unwrap_err().is_malformed());

        let mut fast = MessageParser::for_server(Protocol::TetriFast);
        assert!(fast.parse(&encoded).unwrap_err().is_malformed());
    }

    #[test]
    fn test_unregistered_kind_is_unhandled() {
        let mut server = MessageParser::for_server(Protocol::TetriNet);
        match server.parse("playerjoin 3 alice") {
            Err(ProtocolError::MessageKindUnhandled { kind, .. }) => {
                assert_eq!(kind, MessageKind::UserJoined)
            }
            other => panic!("unexpected {:?}", other),
        }
        // malformed wins over unhandled
        assert!(server.parse("playerjoin x").unwrap_err().is_malformed());
    }

    #[test]
    fn test_unknown_key_is_malformed() {
        assert_malformed("bogus 1 2 3");
    }
}
