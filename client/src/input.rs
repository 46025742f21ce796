//! Console command parsing and the stdin reader task

use log::{debug, error};
use tetri_shared::Special;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

pub const HELP_TEXT: &str = "\
Commands:
  <text>                 chat with everybody
  /me <action>           chat action
  /gmsg <text>           in-game chat
  /team [name]           set or clear your team
  /start  /stop          start or stop a game
  /pause  /resume        pause or resume the game
  /l /r /d /drop         move left, right, down, hard drop
  /tl /tr                turn left, turn right
  /use [special] <id>    use a special (first held one by default) on a player
  /help  /quit";

/// A block control or special use, applied to the local game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameAction {
    MoveLeft,
    MoveRight,
    MoveDown,
    Drop,
    TurnLeft,
    TurnRight,
    UseSpecial {
        special: Option<Special>,
        target_id: i32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat(String),
    Action(String),
    GameChat(String),
    Team(String),
    StartGame,
    StopGame,
    Pause,
    Resume,
    Game(GameAction),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("nothing to send")]
    Empty,
    #[error("unknown command /{0}, try /help")]
    UnknownCommand(String),
    #[error("/{0} needs an argument")]
    MissingArgument(&'static str),
    #[error("not a player number: {0}")]
    InvalidTarget(String),
    #[error("unknown special: {0}")]
    UnknownSpecial(String),
}

/// Turns one console line into a command.
///
/// Lines not starting with `/` are chat. A leading `//` sends a chat line
/// starting with a single slash.
pub fn parse_command(line: &str) -> Result<Command, InputError> {
    let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
    if line.trim().is_empty() {
        return Err(InputError::Empty);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(Command::Chat(line.to_string()));
    };
    if command.starts_with('/') {
        return Ok(Command::Chat(command.to_string()));
    }

    let (name, rest) = match command.split_once(' ') {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    let required = |label: &'static str| {
        if rest.is_empty() {
            Err(InputError::MissingArgument(label))
        } else {
            Ok(rest.to_string())
        }
    };

    let parsed = match name {
        "me" => Command::Action(required("me")?),
        "gmsg" => Command::GameChat(required("gmsg")?),
        "team" => Command::Team(rest.to_string()),
        "start" => Command::StartGame,
        "stop" => Command::StopGame,
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "l" => Command::Game(GameAction::MoveLeft),
        "r" => Command::Game(GameAction::MoveRight),
        "d" => Command::Game(GameAction::MoveDown),
        "drop" => Command::Game(GameAction::Drop),
        "tl" => Command::Game(GameAction::TurnLeft),
        "tr" => Command::Game(GameAction::TurnRight),
        "use" => Command::Game(parse_use(rest)?),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(InputError::UnknownCommand(other.to_string())),
    };
    Ok(parsed)
}

fn parse_use(arguments: &str) -> Result<GameAction, InputError> {
    let tokens: Vec<&str> = arguments.split_whitespace().collect();
    let (special, target) = match tokens.as_slice() {
        [target] => (None, *target),
        [code, target] => {
            let special =
                Special::from_code(code).ok_or_else(|| InputError::UnknownSpecial(code.to_string()))?;
            (Some(special), *target)
        }
        _ => return Err(InputError::MissingArgument("use")),
    };
    let target_id = target
        .parse()
        .map_err(|_| InputError::InvalidTarget(target.to_string()))?;
    Ok(GameAction::UseSpecial { special, target_id })
}

/// Spawns task that reads console lines and forwards parsed commands
///
/// The task ends, dropping the sender, when stdin is closed.
pub fn spawn_stdin_reader(command_tx: mpsc::UnboundedSender<Result<Command, InputError>>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let command = parse_command(&line);
                    if command == Err(InputError::Empty) {
                        continue;
                    }
                    if command_tx.send(command).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Console input closed");
                    break;
                }
                Err(e) => {
                    error!("Error reading console input: {}", e);
                    break;
                }
            }
        }
    });
}
