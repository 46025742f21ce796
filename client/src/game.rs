use crate::input::GameAction;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tetri_shared::game::GameEvent;
use tetri_shared::protocol::MessageBuilder;
use tetri_shared::{
    Cell, GameManager, GameOptions, Pool, Protocol, ProtocolMessage, Special, User,
    WinlistEntry, CLIENT_VERSION, FIELD_SIZE,
};

/// Name reported in `clientinfo`.
pub const CLIENT_NAME: &str = "tetri-client";

/// Garbage rows sent to the others in classic mode for a multi-line clear.
pub fn classic_attack_lines(lines_cleared: u32) -> Option<u32> {
    match lines_cleared {
        2 => Some(1),
        3 => Some(2),
        4 => Some(4),
        _ => None,
    }
}

/// The local player's game plus a mirror of everybody else.
///
/// Every method returns the messages to send to the server, in order.
pub struct LocalGame {
    name: String,
    team_name: String,
    own_id: i32,
    builder: MessageBuilder,
    players: Pool<User>,
    manager: Option<GameManager>,
    /// Field as the server last heard it, without the falling block.
    last_sent: Vec<Cell>,
    winlist: Vec<WinlistEntry>,
    seed: Option<u64>,
}

impl LocalGame {
    pub fn new(name: &str, team_name: &str) -> Self {
        Self {
            name: name.to_string(),
            team_name: team_name.trim().to_string(),
            own_id: 0,
            builder: MessageBuilder::new(Protocol::Unspecified),
            players: Pool::with_invalid_id(0),
            manager: None,
            last_sent: vec![Cell::Nothing; FIELD_SIZE],
            winlist: Vec::new(),
            seed: None,
        }
    }

    /// Makes every following game deterministic.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = Some(seed);
    }

    pub fn own_id(&self) -> i32 {
        self.own_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn team_name(&self) -> &str {
        &self.team_name
    }

    pub fn builder(&self) -> MessageBuilder {
        self.builder
    }

    pub fn players(&self) -> &Pool<User> {
        &self.players
    }

    pub fn manager(&self) -> Option<&GameManager> {
        self.manager.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.manager.as_ref().map_or(false, |m| !m.is_lost())
    }

    pub fn winlist(&self) -> &[WinlistEntry] {
        &self.winlist
    }

    /// Called once the server assigned our player number.
    pub fn joined(&mut self, user_id: i32, protocol: Protocol) {
        self.own_id = user_id;
        self.builder = MessageBuilder::new(protocol);
        self.players.clear();
        let mut user = User::new(user_id, &self.name);
        user.set_team_name(&self.team_name);
        self.players.insert(user, user_id);
    }

    pub fn set_team_name(&mut self, team_name: &str) {
        self.team_name = team_name.trim().to_string();
        if let Ok(user) = self.players.get_mut(self.own_id) {
            user.set_team_name(team_name);
        }
    }

    fn name_of(&self, user_id: i32) -> String {
        match self.players.get(user_id) {
            Ok(user) => user.name().to_string(),
            Err(_) if user_id == 0 => "server".to_string(),
            Err(_) => format!("player {}", user_id),
        }
    }

    /// Grid of any player, ours included, without a falling block.
    pub fn field_of(&self, user_id: i32) -> Option<[Cell; FIELD_SIZE]> {
        if user_id == self.own_id {
            if let Some(manager) = &self.manager {
                return Some(manager.user().field().snapshot(false));
            }
        }
        self.players
            .get(user_id)
            .ok()
            .map(|user| user.field().snapshot(false))
    }

    pub fn handle_message(&mut self, message: ProtocolMessage, now: Instant) -> Vec<String> {
        match message {
            ProtocolMessage::UserJoined { user_id, name } => {
                self.players.remove(user_id);
                self.players.insert(User::new(user_id, &name), user_id);
                info!("{} joined as player {}", name, user_id);
            }

            ProtocolMessage::UserLeft { user_id } => {
                if let Some(user) = self.players.take(user_id) {
                    info!("{} left", user.name());
                }
            }

            ProtocolMessage::UserTeamNameChanged { user_id, team_name } => {
                if let Ok(user) = self.players.get_mut(user_id) {
                    user.set_team_name(&team_name);
                    info!("{} is now on team {:?}", user.name(), user.team_name());
                }
            }

            ProtocolMessage::WinlistReceived { entries } => {
                for entry in &entries {
                    let kind = if entry.is_team { "team" } else { "player" };
                    info!("Winlist: {} {} - {}", kind, entry.name, entry.score);
                }
                self.winlist = entries;
            }

            ProtocolMessage::ServerChatMessage { message } => info!("*** {}", message),

            ProtocolMessage::UserChatMessage { user_id, message } => {
                info!("<{}> {}", self.name_of(user_id), message);
            }

            ProtocolMessage::ServerChatAction { action } => info!("* {}", action),

            ProtocolMessage::UserChatAction { user_id, action } => {
                info!("* {} {}", self.name_of(user_id), action);
            }

            ProtocolMessage::GameChatMessage { message } => info!("[game] {}", message),

            ProtocolMessage::NewGameStarted { options } => {
                return self.start_game(options, now);
            }

            ProtocolMessage::GameIsAlreadyInProgress => {
                info!("A game is in progress, wait for the next one");
            }

            ProtocolMessage::RequestClientInformation => {
                return vec![self.builder.client_information(CLIENT_NAME, CLIENT_VERSION)];
            }

            ProtocolMessage::UserLevelUpdate { user_id, level } => {
                if let Ok(user) = self.players.get_mut(user_id) {
                    user.set_level(level);
                }
            }

            ProtocolMessage::ClassicModeAddLines { sender_id, lines } => {
                if sender_id == self.own_id {
                    return Vec::new();
                }
                if let Some(manager) = self.manager.as_mut() {
                    debug!("{} lines from player {}", lines, sender_id);
                    manager.add_lines(lines);
                }
                return self.collect_outgoing();
            }

            ProtocolMessage::ServerSpecialUsedForAll { special } => {
                return self.receive_special(0, special);
            }

            ProtocolMessage::UserSpecialUsedForAll { sender_id, special } => {
                if sender_id != self.own_id {
                    return self.receive_special(sender_id, special);
                }
            }

            ProtocolMessage::ServerSpecialUsed { target_id, special } => {
                if target_id == self.own_id {
                    return self.receive_special(0, special);
                }
            }

            ProtocolMessage::UserSpecialUsed {
                sender_id,
                target_id,
                special,
            } => {
                if target_id == self.own_id {
                    return self.receive_special(sender_id, special);
                }
                if special == Special::SwitchFields {
                    self.switch_mirrors(sender_id, target_id);
                }
                debug!(
                    "{} used {:?} on {}",
                    self.name_of(sender_id),
                    special,
                    self.name_of(target_id)
                );
            }

            ProtocolMessage::UserLost { user_id } => {
                if let Ok(user) = self.players.get_mut(user_id) {
                    user.set_playing(false);
                    info!("{} lost", user.name());
                }
            }

            ProtocolMessage::UserWon { user_id } => {
                info!("{} won the game", self.name_of(user_id));
            }

            ProtocolMessage::PauseGame { .. } => {
                if let Some(manager) = self.manager.as_mut() {
                    manager.set_paused(true);
                }
                info!("Game paused");
            }

            ProtocolMessage::ResumeGame { .. } => {
                if let Some(manager) = self.manager.as_mut() {
                    manager.set_paused(false);
                }
                info!("Game resumed");
            }

            ProtocolMessage::EndGame => {
                if self.manager.take().is_some() {
                    info!("Game over");
                }
                for (_, user) in self.players.iter_mut() {
                    user.set_playing(false);
                }
            }

            ProtocolMessage::HeartBeat => {}

            ProtocolMessage::UserFullFieldUpdate { user_id, cells } => {
                if let Ok(user) = self.players.get_mut(user_id) {
                    user.field_mut().update_cells(&cells);
                }
            }

            ProtocolMessage::UserPartialFieldUpdate { user_id, positions } => {
                if let Ok(user) = self.players.get_mut(user_id) {
                    if !user.field_mut().apply_partial(&positions) {
                        warn!("Ignoring out-of-range field update for {}", user_id);
                    }
                }
            }

            other => {
                warn!("Unexpected {:?} message from server", other.kind());
            }
        }
        Vec::new()
    }

    fn start_game(&mut self, options: GameOptions, now: Instant) -> Vec<String> {
        let mut user = User::new(self.own_id, &self.name);
        user.set_team_name(&self.team_name);
        let options = Arc::new(options);
        let mut manager = match self.seed {
            Some(seed) => GameManager::with_seed(user, options, seed),
            None => GameManager::new(user, options),
        };
        // Anchors the clock; no time has passed yet
        manager.update(now);

        for (_, user) in self.players.iter_mut() {
            user.field_mut().clear();
            user.set_playing(true);
        }
        self.last_sent = vec![Cell::Nothing; FIELD_SIZE];
        let level = manager.user().level();
        self.manager = Some(manager);
        info!("New game started");

        let mut outgoing = vec![self.builder.level_update(self.own_id, level)];
        outgoing.extend(self.collect_outgoing());
        outgoing
    }

    /// Runs the block timer up to `now`.
    pub fn tick(&mut self, now: Instant) -> Vec<String> {
        match self.manager.as_mut() {
            Some(manager) => {
                let steps = manager.update(now);
                if !steps.is_empty() {
                    debug!("Block steps: {:?}", steps);
                }
            }
            None => return Vec::new(),
        }
        self.collect_outgoing()
    }

    pub fn perform(&mut self, action: GameAction) -> Vec<String> {
        let Some(manager) = self.manager.as_mut() else {
            debug!("No game running for {:?}", action);
            return Vec::new();
        };
        let done = match action {
            GameAction::MoveLeft => manager.move_block_left(),
            GameAction::MoveRight => manager.move_block_right(),
            GameAction::MoveDown => manager.move_block_down(),
            GameAction::Drop => manager.drop_block(),
            GameAction::TurnLeft => manager.turn_block_left(),
            GameAction::TurnRight => manager.turn_block_right(),
            GameAction::UseSpecial { special, target_id } => {
                return self.use_special(special, target_id);
            }
        };
        if !done {
            debug!("{:?} had no effect", action);
        }
        self.collect_outgoing()
    }

    fn use_special(&mut self, special: Option<Special>, target_id: i32) -> Vec<String> {
        let own_id = self.own_id;
        let target_playing = target_id == own_id
            || self
                .players
                .get(target_id)
                .map(|user| user.is_playing())
                .unwrap_or(false);
        let target_cells = self.field_of(target_id);

        let Some(manager) = self.manager.as_mut() else {
            return Vec::new();
        };
        if manager.options().classic_mode {
            warn!("No specials in classic mode");
            return Vec::new();
        }
        let Some(special) = special.or_else(|| manager.user().inventory().first()) else {
            info!("No specials to use");
            return Vec::new();
        };
        if !target_playing {
            warn!("Player {} is not playing", target_id);
            return Vec::new();
        }
        if !manager.use_special(special) {
            warn!("{:?} is not in your inventory", special);
            return Vec::new();
        }

        if target_id == own_id {
            if special != Special::SwitchFields {
                manager.receive_special(special);
            }
        } else if special == Special::SwitchFields {
            if let Some(cells) = target_cells {
                manager.switch_fields(&cells);
            }
        }

        let mut outgoing = Vec::new();
        outgoing.extend(self.builder.special_used(target_id, special, own_id));
        outgoing.extend(self.collect_outgoing());
        outgoing
    }

    fn receive_special(&mut self, sender_id: i32, special: Special) -> Vec<String> {
        let sender_cells = self.field_of(sender_id);
        let sender = self.name_of(sender_id);
        let Some(manager) = self.manager.as_mut() else {
            return Vec::new();
        };
        let applied = match special {
            Special::SwitchFields => match sender_cells {
                Some(cells) => manager.switch_fields(&cells),
                None => false,
            },
            _ => manager.receive_special(special),
        };
        if applied {
            info!("{} used {:?} on you", sender, special);
        }
        self.collect_outgoing()
    }

    /// Swaps two other players' mirrored grids.
    fn switch_mirrors(&mut self, first: i32, second: i32) {
        let (Some(a), Some(b)) = (self.field_of(first), self.field_of(second)) else {
            return;
        };
        if let Ok(user) = self.players.get_mut(first) {
            user.field_mut().update_cells(&b);
        }
        if let Ok(user) = self.players.get_mut(second) {
            user.field_mut().update_cells(&a);
        }
    }

    /// Field diff and event messages produced since the last call.
    fn collect_outgoing(&mut self) -> Vec<String> {
        let Some(manager) = self.manager.as_mut() else {
            return Vec::new();
        };
        let events = manager.take_events();
        let classic = manager.options().classic_mode;
        let snapshot = manager.user().field().snapshot(false);

        let mut outgoing = Vec::new();
        if let Some(update) = self
            .builder
            .field_update(self.own_id, &self.last_sent, &snapshot)
        {
            outgoing.push(update);
            self.last_sent = snapshot.to_vec();
        }
        for event in events {
            match event {
                GameEvent::BlockLanded { lines_cleared } => {
                    if classic {
                        if let Some(lines) = classic_attack_lines(lines_cleared) {
                            outgoing.push(self.builder.classic_add_lines(self.own_id, lines));
                        }
                    }
                }
                GameEvent::LevelChanged { level } => {
                    outgoing.push(self.builder.level_update(self.own_id, level));
                }
                GameEvent::Lost => {
                    info!("You lost");
                    outgoing.push(self.builder.user_lost(self.own_id));
                }
            }
        }
        outgoing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tetri_shared::protocol::MessageParser;
    use tetri_shared::FIELD_WIDTH;

    fn joined_game() -> LocalGame {
        let mut game = LocalGame::new("alice", "red");
        game.set_seed(7);
        game.joined(1, Protocol::TetriNet);
        game.handle_message(
            ProtocolMessage::UserJoined {
                user_id: 2,
                name: "bob".to_string(),
            },
            Instant::now(),
        );
        game
    }

    fn started_game(options: GameOptions) -> (LocalGame, Instant, Vec<String>) {
        let mut game = joined_game();
        let start = Instant::now();
        let outgoing = game.handle_message(ProtocolMessage::NewGameStarted { options }, start);
        (game, start, outgoing)
    }

    fn parse_all(messages: &[String]) -> Vec<ProtocolMessage> {
        let mut parser = MessageParser::accepting_all(Protocol::TetriNet);
        messages.iter().map(|m| parser.parse(m).unwrap()).collect()
    }

    #[test]
    fn test_classic_attack_lines() {
        assert_eq!(classic_attack_lines(1), None);
        assert_eq!(classic_attack_lines(2), Some(1));
        assert_eq!(classic_attack_lines(3), Some(2));
        assert_eq!(classic_attack_lines(4), Some(4));
    }

    #[test]
    fn test_lobby_mirror() {
        let mut game = joined_game();
        let now = Instant::now();
        assert_eq!(game.own_id(), 1);
        assert_eq!(game.players().len(), 2);

        game.handle_message(
            ProtocolMessage::UserTeamNameChanged {
                user_id: 2,
                team_name: "blue".to_string(),
            },
            now,
        );
        assert_eq!(game.players().get(2).unwrap().team_name(), "blue");

        game.handle_message(ProtocolMessage::UserLeft { user_id: 2 }, now);
        assert!(!game.players().is_id_valid(2));
    }

    #[test]
    fn test_client_information_reply() {
        let mut game = joined_game();
        let replies = game.handle_message(ProtocolMessage::RequestClientInformation, Instant::now());
        assert_eq!(replies, vec![format!("clientinfo tetri-client {}", CLIENT_VERSION)]);
    }

    #[test]
    fn test_new_game_reports_level() {
        let (game, _, outgoing) = started_game(GameOptions::default());
        assert!(game.is_playing());
        assert_eq!(outgoing, vec!["lvl 1 1".to_string()]);
    }

    #[test]
    fn test_starting_height_is_sent() {
        let options = GameOptions {
            starting_height: 3,
            ..GameOptions::default()
        };
        let (_, _, outgoing) = started_game(options);
        assert_eq!(outgoing.len(), 2);
        assert!(outgoing[1].starts_with("f 1 "));
    }

    #[test]
    fn test_tick_sends_field_after_landing() {
        let (mut game, start, _) = started_game(GameOptions::default());

        assert!(game.tick(start + Duration::from_millis(500)).is_empty());

        let outgoing = game.perform(GameAction::Drop);
        let parsed = parse_all(&outgoing);
        assert!(matches!(parsed[0], ProtocolMessage::UserPartialFieldUpdate { user_id: 1, .. }));

        // Nothing changed since the last update
        assert!(game.perform(GameAction::MoveLeft).is_empty());
    }

    #[test]
    fn test_mirrors_follow_field_updates() {
        let (mut game, start, _) = started_game(GameOptions::default());
        let mut cells = vec![Cell::Nothing; FIELD_SIZE];
        cells[FIELD_SIZE - 1] = Cell::Red;
        game.handle_message(
            ProtocolMessage::UserFullFieldUpdate {
                user_id: 2,
                cells: cells.clone(),
            },
            start,
        );
        assert_eq!(game.field_of(2).unwrap().to_vec(), cells);
    }

    #[test]
    fn test_classic_lines_from_others() {
        let options = GameOptions {
            classic_mode: true,
            ..GameOptions::default()
        };
        let (mut game, start, _) = started_game(options);

        let outgoing = game.handle_message(
            ProtocolMessage::ClassicModeAddLines {
                sender_id: 2,
                lines: 2,
            },
            start,
        );
        assert_eq!(outgoing.len(), 1);
        let field = game.field_of(1).unwrap();
        let bottom_filled = field[FIELD_SIZE - FIELD_WIDTH..]
            .iter()
            .filter(|c| !c.is_empty())
            .count();
        assert_eq!(bottom_filled, FIELD_WIDTH - 1);

        // Our own attack coming back is ignored
        assert!(game
            .handle_message(
                ProtocolMessage::ClassicModeAddLines {
                    sender_id: 1,
                    lines: 4
                },
                start
            )
            .is_empty());
    }

    #[test]
    fn test_nuke_from_server_clears_field() {
        let options = GameOptions {
            starting_height: 5,
            ..GameOptions::default()
        };
        let (mut game, start, _) = started_game(options);

        let outgoing = game.handle_message(
            ProtocolMessage::ServerSpecialUsed {
                target_id: 1,
                special: Special::NukeField,
            },
            start,
        );
        assert!(game.field_of(1).unwrap().iter().all(|c| c.is_empty()));
        assert_eq!(outgoing.len(), 1);
    }

    #[test]
    fn test_switch_fields_with_sender() {
        let (mut game, start, _) = started_game(GameOptions::default());
        let mut cells = vec![Cell::Nothing; FIELD_SIZE];
        for cell in cells[FIELD_SIZE - FIELD_WIDTH..].iter_mut().skip(1) {
            *cell = Cell::Green;
        }
        game.handle_message(
            ProtocolMessage::UserFullFieldUpdate {
                user_id: 2,
                cells: cells.clone(),
            },
            start,
        );

        game.handle_message(
            ProtocolMessage::UserSpecialUsed {
                sender_id: 2,
                target_id: 1,
                special: Special::SwitchFields,
            },
            start,
        );
        assert_eq!(game.field_of(1).unwrap().to_vec(), cells);
    }

    #[test]
    fn test_use_special_needs_inventory() {
        let (mut game, _, _) = started_game(GameOptions::default());
        assert!(game
            .perform(GameAction::UseSpecial {
                special: None,
                target_id: 2
            })
            .is_empty());
    }

    #[test]
    fn test_lost_is_reported_once() {
        let (mut game, start, _) = started_game(GameOptions::default());
        let outgoing = game.handle_message(
            ProtocolMessage::ClassicModeAddLines {
                sender_id: 2,
                lines: 30,
            },
            start,
        );
        let parsed = parse_all(&outgoing);
        assert_eq!(parsed.last(), Some(&ProtocolMessage::UserLost { user_id: 1 }));
        assert!(!game.is_playing());
        assert!(game.tick(start + Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_end_game_drops_manager() {
        let (mut game, start, _) = started_game(GameOptions::default());
        game.handle_message(ProtocolMessage::EndGame, start);
        assert!(game.manager().is_none());
        assert!(game.perform(GameAction::Drop).is_empty());
        assert!(game.tick(start + Duration::from_secs(2)).is_empty());
    }

    #[test]
    fn test_pause_stops_the_clock() {
        let (mut game, start, _) = started_game(GameOptions::default());
        game.handle_message(ProtocolMessage::PauseGame { user_id: None }, start);
        game.tick(start + Duration::from_secs(3));
        assert_eq!(game.manager().unwrap().falling_block().unwrap().y, 0);

        game.handle_message(ProtocolMessage::ResumeGame { user_id: None }, start);
        assert!(game.manager().map_or(false, |m| !m.is_paused()));
    }
}
