//! Outgoing message text.
//!
//! Every builder output parses back to the matching [`ProtocolMessage`]
//! (see the tests); frames are added by the connection layer.
//!
//! [`ProtocolMessage`]: crate::protocol::ProtocolMessage

use crate::cell::{Cell, Special};
use crate::field::CellPosition;
use crate::options::GameOptions;
use crate::protocol::{login, Protocol};
use crate::winlist::WinlistEntry;
use crate::CLIENT_VERSION;

const COORDINATE_BASE: u8 = 0x33;

#[derive(Debug, Clone, Copy)]
pub struct MessageBuilder {
    protocol: Protocol,
}

impl MessageBuilder {
    pub fn new(protocol: Protocol) -> Self {
        MessageBuilder { protocol }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Plain login line, before obfuscation.
    pub fn login(&self, username: &str) -> Option<String> {
        let command = self.protocol.login_command()?;
        Some(format!("{} {} {}", command, username, CLIENT_VERSION))
    }

    pub fn encoded_login(&self, username: &str, salt: &str, initial: u8) -> Option<String> {
        let line = self.login(username)?;
        Some(login::encode_login(&line, salt, initial))
    }

    pub fn client_information(&self, name: &str, version: &str) -> String {
        format!("clientinfo {} {}", name, version)
    }

    pub fn player_number(&self, user_id: i32) -> String {
        format!("{} {}", self.protocol.player_number_key(), user_id)
    }

    pub fn user_joined(&self, user_id: i32, name: &str) -> String {
        format!("playerjoin {} {}", user_id, name)
    }

    pub fn user_left(&self, user_id: i32) -> String {
        format!("playerleave {}", user_id)
    }

    pub fn team(&self, user_id: i32, team_name: &str) -> String {
        format!("team {} {}", user_id, team_name)
    }

    pub fn winlist(&self, entries: &[WinlistEntry]) -> String {
        let mut message = String::from("winlist");
        for entry in entries {
            let tag = if entry.is_team { 't' } else { 'p' };
            message.push_str(&format!(" {}{};{}", tag, entry.name, entry.score));
        }
        message
    }

    pub fn server_chat(&self, message: &str) -> String {
        self.chat(0, message)
    }

    pub fn chat(&self, user_id: i32, message: &str) -> String {
        format!("pline {} {}", user_id, message)
    }

    pub fn server_chat_action(&self, action: &str) -> String {
        self.chat_action(0, action)
    }

    pub fn chat_action(&self, user_id: i32, action: &str) -> String {
        format!("plineact {} {}", user_id, action)
    }

    pub fn game_chat(&self, message: &str) -> String {
        format!("gmsg {}", message)
    }

    /// Game chat line as typed by a player: `gmsg <name> text`.
    pub fn user_game_chat(&self, name: &str, message: &str) -> String {
        self.game_chat(&format!("<{}> {}", name, message))
    }

    pub fn new_game(&self, options: &GameOptions) -> String {
        let blocks: String = options
            .block_frequencies
            .iter()
            .filter_map(|b| b.frequency_digit())
            .map(|d| char::from(b'0' + d as u8))
            .collect();
        let mut specials: String = options
            .special_frequencies
            .iter()
            .filter_map(|s| s.frequency_digit())
            .map(|d| char::from(b'0' + d as u8))
            .collect();
        if specials.is_empty() {
            specials.push('0');
        }
        format!(
            "{} {} {} {} {} {} {} {} {} {} {} {}",
            self.protocol.new_game_key(),
            options.starting_height,
            options.starting_level,
            options.lines_per_level,
            options.level_increment,
            options.lines_per_special,
            options.specials_added,
            options.special_capacity,
            blocks,
            specials,
            flag(options.display_average_levels),
            flag(options.classic_mode),
        )
    }

    pub fn game_already_in_progress(&self) -> String {
        "ingame".to_string()
    }

    pub fn client_information_request(&self) -> String {
        "lvl 0 0".to_string()
    }

    pub fn level_update(&self, user_id: i32, level: u32) -> String {
        format!("lvl {} {}", user_id, level)
    }

    pub fn classic_add_lines(&self, sender_id: i32, lines: u32) -> String {
        format!("sb 0 cs{} {}", lines, sender_id)
    }

    /// `None` for specials without a wire code.
    pub fn special_used(&self, target_id: i32, special: Special, sender_id: i32) -> Option<String> {
        let code = special.code()?;
        Some(format!("sb {} {} {}", target_id, code, sender_id))
    }

    pub fn user_lost(&self, user_id: i32) -> String {
        format!("playerlost {}", user_id)
    }

    pub fn user_won(&self, user_id: i32) -> String {
        format!("playerwon {}", user_id)
    }

    pub fn pause(&self) -> String {
        "pause 1".to_string()
    }

    pub fn resume(&self) -> String {
        "pause 0".to_string()
    }

    pub fn pause_request(&self, user_id: i32) -> String {
        format!("pause 1 {}", user_id)
    }

    pub fn resume_request(&self, user_id: i32) -> String {
        format!("pause 0 {}", user_id)
    }

    pub fn end_game(&self) -> String {
        "endgame".to_string()
    }

    pub fn connection_denied(&self, reason: &str) -> String {
        format!("noconnecting {}", reason)
    }

    pub fn heartbeat(&self) -> String {
        String::new()
    }

    pub fn start_game(&self, user_id: i32) -> String {
        format!("gamestart 1 {}", user_id)
    }

    pub fn stop_game(&self, user_id: i32) -> String {
        format!("gamestart 0 {}", user_id)
    }

    pub fn full_field_update(&self, user_id: i32, cells: &[Cell]) -> String {
        let field: String = cells.iter().map(|c| c.full_update_char()).collect();
        format!("f {} {}", user_id, field)
    }

    /// `None` when there is nothing to send.
    pub fn partial_field_update(&self, user_id: i32, positions: &[CellPosition]) -> Option<String> {
        if positions.is_empty() {
            return None;
        }
        let mut update = String::with_capacity(positions.len() * 3);
        for p in positions {
            update.push(p.cell.partial_update_char());
            update.push(char::from(COORDINATE_BASE + p.x as u8));
            update.push(char::from(COORDINATE_BASE + p.y as u8));
        }
        Some(format!("f {} {}", user_id, update))
    }

    /// Smallest update turning `old` into `new`.
    ///
    /// Sends the whole field once at least half of it changed, otherwise
    /// only the changed cells. `None` if nothing changed or the sizes differ.
    pub fn field_update(&self, user_id: i32, old: &[Cell], new: &[Cell]) -> Option<String> {
        if old.len() != new.len() {
            return None;
        }
        let width = crate::FIELD_WIDTH;
        let changed: Vec<CellPosition> = old
            .iter()
            .zip(new)
            .enumerate()
            .filter(|(_, (before, after))| before != after)
            .map(|(i, (_, after))| CellPosition {
                cell: *after,
                x: i % width,
                y: i / width,
            })
            .collect();
        if changed.is_empty() {
            return None;
        }
        if changed.len() * 2 >= new.len() {
            return Some(self.full_field_update(user_id, new));
        }
        self.partial_field_update(user_id, &changed)
    }
}

fn flag(value: bool) -> char {
    if value {
        '1'
    } else {
        '0'
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::protocol::{MessageParser, ProtocolMessage};
    use crate::FIELD_SIZE;

    fn parse(protocol: Protocol, message: &str) -> ProtocolMessage {
        MessageParser::accepting_all(protocol).parse(message).unwrap()
    }

    #[test]
    fn test_new_game_round_trip() {
        for protocol in [Protocol::TetriNet, Protocol::TetriFast] {
            let builder = MessageBuilder::new(protocol);
            let options = GameOptions {
                starting_height: 2,
                special_capacity: 12,
                ..GameOptions::default()
            };
            let message = builder.new_game(&options);
            assert!(message.starts_with(protocol.new_game_key()));
            assert_eq!(parse(protocol, &message), ProtocolMessage::NewGameStarted { options });
        }
    }

    #[test]
    fn test_classic_new_game_without_specials() {
        let builder = MessageBuilder::new(Protocol::TetriNet);
        let options = GameOptions {
            classic_mode: true,
            special_frequencies: Vec::new(),
            ..GameOptions::default()
        };
        let message = builder.new_game(&options);
        assert!(message.ends_with(" 0 1 1"));
        assert_eq!(parse(Protocol::TetriNet, &message), ProtocolMessage::NewGameStarted { options });
    }

    #[test]
    fn test_player_number_uses_dialect_key() {
        assert_eq!(MessageBuilder::new(Protocol::TetriNet).player_number(2), "playernum 2");
        assert_eq!(MessageBuilder::new(Protocol::TetriFast).player_number(2), ")#)(!@(*3 2");
    }

    #[test]
    fn test_login_line() {
        let builder = MessageBuilder::new(Protocol::TetriFast);
        assert_eq!(builder.login("eve").as_deref(), Some("tetrifaster eve 1.13"));
        assert!(MessageBuilder::new(Protocol::Unspecified).login("eve").is_none());

        let encoded = builder.encoded_login("eve", "6875", 3).unwrap();
        assert_eq!(
            parse(Protocol::TetriFast, &encoded),
            ProtocolMessage::ClientLogIn {
                username: "eve".to_string(),
                version: "1.13".to_string(),
                protocol: Protocol::TetriFast,
            }
        );
    }

    #[test]
    fn test_special_messages() {
        let builder = MessageBuilder::new(Protocol::TetriNet);
        assert_eq!(builder.special_used(3, Special::SwitchFields, 1).as_deref(), Some("sb 3 s 1"));
        assert!(builder.special_used(3, Special::Darkness, 1).is_none());
        assert_eq!(builder.classic_add_lines(5, 4), "sb 0 cs4 5");
        assert_eq!(
            parse(Protocol::TetriNet, &builder.classic_add_lines(5, 4)),
            ProtocolMessage::ClassicModeAddLines {
                sender_id: 5,
                lines: 4
            }
        );
    }

    #[test]
    fn test_team_and_game_start_keywords() {
        let builder = MessageBuilder::new(Protocol::TetriNet);
        assert_eq!(builder.team(2, "blue"), "team 2 blue");
        assert_eq!(builder.start_game(2), "gamestart 1 2");
        assert_eq!(builder.stop_game(2), "gamestart 0 2");
        assert_eq!(builder.user_game_chat("bob", "hi"), "gmsg <bob> hi");
        assert_eq!(
            parse(Protocol::TetriNet, &builder.resume_request(4)),
            ProtocolMessage::ResumeGame { user_id: Some(4) }
        );
    }

    #[test]
    fn test_winlist_round_trip() {
        let builder = MessageBuilder::new(Protocol::TetriNet);
        let entries = vec![WinlistEntry::team("red team", 9), WinlistEntry::player("zed", 3)];
        assert_eq!(builder.winlist(&entries), "winlist tred team;9 pzed;3");
        assert_eq!(
            parse(Protocol::TetriNet, &builder.winlist(&entries)),
            ProtocolMessage::WinlistReceived { entries }
        );
    }

    #[test]
    fn test_small_change_sends_partial_update() {
        let builder = MessageBuilder::new(Protocol::TetriNet);
        let old = [Cell::Nothing; FIELD_SIZE];
        let mut new = old;
        new[0] = Cell::Blue;
        new[FIELD_SIZE - 1] = Cell::Gravity;

        let message = builder.field_update(1, &old, &new).unwrap();
        assert_eq!(message, "f 1 \"33->H");
        assert!(builder.field_update(1, &old, &old).is_none());
    }

    #[test]
    fn test_full_and_partial_updates_converge() {
        let builder = MessageBuilder::new(Protocol::TetriNet);
        let old = [Cell::Nothing; FIELD_SIZE];
        let mut large = old;
        for cell in large.iter_mut().take(FIELD_SIZE / 2) {
            *cell = Cell::Red;
        }
        let mut small = old;
        small[100] = Cell::QuakeField;
        small[101] = Cell::Purple;

        for new in [large, small] {
            let message = builder.field_update(7, &old, &new).unwrap();
            let mut field = Field::new();
            field.update_cells(&old);
            match parse(Protocol::TetriNet, &message) {
                ProtocolMessage::UserFullFieldUpdate { user_id, cells } => {
                    assert_eq!(user_id, 7);
                    assert!(field.update_cells(&cells));
                }
                ProtocolMessage::UserPartialFieldUpdate { user_id, positions } => {
                    assert_eq!(user_id, 7);
                    assert!(field.apply_partial(&positions));
                }
                other => panic!("unexpected {:?}", other),
            }
            assert_eq!(field.cells(), &new);
        }
        assert!(builder
            .field_update(7, &old, &large)
            .unwrap()
            .starts_with("f 7 5"));
    }
}
