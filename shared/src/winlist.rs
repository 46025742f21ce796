use crate::user::User;
use serde::{Deserialize, Serialize};

/// One line of the winlist: a player or a whole team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinlistEntry {
    pub is_team: bool,
    pub name: String,
    pub score: i64,
}

impl WinlistEntry {
    pub fn player(name: &str, score: i64) -> Self {
        WinlistEntry {
            is_team: false,
            name: name.to_string(),
            score,
        }
    }

    pub fn team(name: &str, score: i64) -> Self {
        WinlistEntry {
            is_team: true,
            name: name.to_string(),
            score,
        }
    }
}

/// Builds the winlist from the current users.
///
/// Players without a team are listed by name; team members are summed under
/// their team. Entries are ordered by descending score, ties keeping the
/// order in which they were first seen.
pub fn build_winlist<'a>(users: impl IntoIterator<Item = &'a User>) -> Vec<WinlistEntry> {
    let mut entries: Vec<WinlistEntry> = Vec::new();
    for user in users {
        if user.team_name().is_empty() {
            entries.push(WinlistEntry::player(user.name(), user.score()));
            continue;
        }
        match entries
            .iter_mut()
            .find(|e| e.is_team && e.name == user.team_name())
        {
            Some(team) => team.score += user.score(),
            None => entries.push(WinlistEntry::team(user.team_name(), user.score())),
        }
    }
    entries.sort_by(|a, b| b.score.cmp(&a.score));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, team: &str, score: i64) -> User {
        let mut user = User::new(1, name);
        user.set_team_name(team);
        user.add_score(score);
        user
    }

    #[test]
    fn test_team_scores_are_summed() {
        let users = vec![
            user("alice", "", 2),
            user("bob", "red", 3),
            user("carol", "red", 4),
            user("dave", "blue", 1),
        ];
        let winlist = build_winlist(&users);
        assert_eq!(
            winlist,
            vec![
                WinlistEntry::team("red", 7),
                WinlistEntry::player("alice", 2),
                WinlistEntry::team("blue", 1),
            ]
        );
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let users = vec![user("x", "", 1), user("y", "", 1)];
        let winlist = build_winlist(&users);
        assert_eq!(winlist[0].name, "x");
        assert_eq!(winlist[1].name, "y");
    }

    #[test]
    fn test_empty_winlist() {
        assert!(build_winlist(Vec::<&User>::new()).is_empty());
    }
}
