use log::info;
use std::collections::HashSet;
use std::sync::Arc;
use tetri_shared::GameOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameOutcome {
    Continue,
    /// One player or team is left standing.
    Won { user_id: i32 },
    /// Everybody is out, e.g. a single-player game.
    Over,
}

#[derive(Debug, Clone)]
struct Participant {
    user_id: i32,
    team_name: String,
    alive: bool,
}

impl Participant {
    /// Teammates share a group; players without a team are their own group.
    fn group(&self) -> String {
        if self.team_name.is_empty() {
            format!("#{}", self.user_id)
        } else {
            format!("t:{}", self.team_name)
        }
    }
}

/// Server-side view of the running game: who takes part, who is still in.
///
/// Fields and blocks are simulated by the clients; the server only decides
/// when a game starts, pauses and ends, and who won.
#[derive(Debug, Clone)]
pub struct GameSession {
    options: Arc<GameOptions>,
    state: SessionState,
    participants: Vec<Participant>,
    groups_at_start: usize,
}

impl GameSession {
    pub fn new(options: GameOptions) -> Self {
        Self {
            options: Arc::new(options),
            state: SessionState::Idle,
            participants: Vec::new(),
            groups_at_start: 0,
        }
    }

    pub fn options(&self) -> &GameOptions {
        &self.options
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state != SessionState::Idle
    }

    pub fn is_paused(&self) -> bool {
        self.state == SessionState::Paused
    }

    /// Starts a game for `(user_id, team_name)` pairs. False if a game is
    /// already running or nobody would play.
    pub fn start(&mut self, players: Vec<(i32, String)>) -> bool {
        if self.is_running() || players.is_empty() {
            return false;
        }
        self.participants = players
            .into_iter()
            .map(|(user_id, team_name)| Participant {
                user_id,
                team_name,
                alive: true,
            })
            .collect();
        self.groups_at_start = self.alive_groups().len();
        self.state = SessionState::Running;
        info!(
            "Game started with {} players in {} groups",
            self.participants.len(),
            self.groups_at_start
        );
        true
    }

    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.state = SessionState::Idle;
        self.participants.clear();
        self.groups_at_start = 0;
        info!("Game stopped");
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.state != SessionState::Running {
            return false;
        }
        self.state = SessionState::Paused;
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.state != SessionState::Paused {
            return false;
        }
        self.state = SessionState::Running;
        true
    }

    pub fn is_participant(&self, user_id: i32) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }

    pub fn is_alive(&self, user_id: i32) -> bool {
        self.participants
            .iter()
            .any(|p| p.user_id == user_id && p.alive)
    }

    /// Marks a player as out and stops the game if it is decided.
    ///
    /// Players that already lost, or never took part, leave the outcome
    /// unchanged.
    pub fn player_lost(&mut self, user_id: i32) -> GameOutcome {
        if !self.is_running() {
            return GameOutcome::Continue;
        }
        match self
            .participants
            .iter_mut()
            .find(|p| p.user_id == user_id && p.alive)
        {
            Some(participant) => participant.alive = false,
            None => return GameOutcome::Continue,
        }

        let outcome = self.outcome();
        if outcome != GameOutcome::Continue {
            self.stop();
        }
        outcome
    }

    fn alive_groups(&self) -> HashSet<String> {
        self.participants
            .iter()
            .filter(|p| p.alive)
            .map(|p| p.group())
            .collect()
    }

    fn outcome(&self) -> GameOutcome {
        let groups = self.alive_groups();
        if groups.is_empty() {
            return GameOutcome::Over;
        }
        if groups.len() == 1 && self.groups_at_start > 1 {
            if let Some(winner) = self.participants.iter().find(|p| p.alive) {
                return GameOutcome::Won {
                    user_id: winner.user_id,
                };
            }
        }
        GameOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn players(list: &[(i32, &str)]) -> Vec<(i32, String)> {
        list.iter().map(|(id, team)| (*id, team.to_string())).collect()
    }

    #[test]
    fn test_start_and_stop() {
        let mut session = GameSession::new(GameOptions::default());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.start(Vec::new()));

        assert!(session.start(players(&[(1, ""), (2, "")])));
        assert!(session.is_running());
        assert!(!session.start(players(&[(3, "")])));
        assert!(session.is_participant(2));
        assert!(!session.is_participant(3));

        assert!(session.stop());
        assert!(!session.stop());
        assert!(!session.is_participant(2));
    }

    #[test]
    fn test_pause_resume() {
        let mut session = GameSession::new(GameOptions::default());
        assert!(!session.pause());

        session.start(players(&[(1, "")]));
        assert!(session.pause());
        assert!(!session.pause());
        assert!(session.is_paused());
        assert!(session.is_running());
        assert!(session.resume());
        assert!(!session.resume());
    }

    #[test]
    fn test_last_player_standing_wins() {
        let mut session = GameSession::new(GameOptions::default());
        session.start(players(&[(1, ""), (2, ""), (3, "")]));

        assert_eq!(session.player_lost(2), GameOutcome::Continue);
        assert_eq!(session.player_lost(2), GameOutcome::Continue);
        assert!(!session.is_alive(2));
        assert_eq!(session.player_lost(1), GameOutcome::Won { user_id: 3 });
        assert!(!session.is_running());
    }

    #[test]
    fn test_team_wins_with_members_left() {
        let mut session = GameSession::new(GameOptions::default());
        session.start(players(&[(1, "red"), (2, "red"), (3, "")]));

        assert_eq!(session.player_lost(1), GameOutcome::Continue);
        assert_eq!(session.player_lost(3), GameOutcome::Won { user_id: 2 });
    }

    #[test]
    fn test_single_team_game_ends_when_all_lost() {
        let mut session = GameSession::new(GameOptions::default());
        session.start(players(&[(1, "red"), (2, "red")]));

        assert_eq!(session.player_lost(1), GameOutcome::Continue);
        assert_eq!(session.player_lost(2), GameOutcome::Over);
        assert!(!session.is_running());
    }

    #[test]
    fn test_non_participant_loss_is_ignored() {
        let mut session = GameSession::new(GameOptions::default());
        assert_eq!(session.player_lost(1), GameOutcome::Continue);

        session.start(players(&[(1, ""), (2, "")]));
        assert_eq!(session.player_lost(5), GameOutcome::Continue);
        assert!(session.is_running());
    }
}
