use crate::game::LocalGame;
use crate::input::{spawn_stdin_reader, Command, InputError, HELP_TEXT};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tetri_shared::connection::{FrameReader, FrameWriter};
use tetri_shared::protocol::{login, MessageParser};
use tetri_shared::{Protocol, ProtocolError, ProtocolMessage};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub type ServerWriter = FrameWriter<OwnedWriteHalf>;

/// Period of the empty keep-alive frame sent to the server
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// An open connection whose login is still pending
pub struct Connection {
    pub reader: FrameReader<OwnedReadHalf>,
    pub writer: ServerWriter,
    /// Login obfuscation salt derived from the server address
    pub salt: String,
}

/// Connects to `server_addr` and derives the login salt.
///
/// Fails with `UnsupportedAddressFamily` for non-IPv4 servers, since the
/// login encoding is only defined for IPv4.
pub async fn connect(server_addr: &str) -> Result<Connection, ProtocolError> {
    let stream = TcpStream::connect(server_addr).await?;
    let salt = login::salt_for(stream.peer_addr()?.ip())?;
    stream.set_nodelay(true)?;
    let (read_half, write_half) = stream.into_split();
    Ok(Connection {
        reader: FrameReader::new(read_half),
        writer: FrameWriter::new(write_half),
        salt,
    })
}

/// Spawns task that advances the local game and sends what it produced
///
/// The game lock is held until the output is written, so field updates
/// leave in the order the game produced them.
pub fn spawn_tick_driver<W>(
    game: Arc<Mutex<LocalGame>>,
    writer: FrameWriter<W>,
    tick: Duration,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let mut game = game.lock().await;
            for message in game.tick(Instant::now()) {
                if let Err(e) = writer.send(&message).await {
                    error!("Failed to send game update: {}", e);
                    return;
                }
            }
        }
    })
}

pub struct Client {
    server_addr: String,
    tick_interval: Duration,
    parser: MessageParser,
    game: Arc<Mutex<LocalGame>>,
    connected: bool,
}

impl Client {
    pub fn new(server_addr: &str, name: &str, team_name: &str, tick_interval: Duration) -> Self {
        Client {
            server_addr: server_addr.to_string(),
            tick_interval,
            parser: MessageParser::for_client(),
            game: Arc::new(Mutex::new(LocalGame::new(name, team_name))),
            connected: false,
        }
    }

    pub fn game(&self) -> Arc<Mutex<LocalGame>> {
        Arc::clone(&self.game)
    }

    /// Answers `playernum` with the obfuscated login and our team.
    async fn log_in(
        &mut self,
        user_id: i32,
        protocol: Protocol,
        salt: &str,
        writer: &ServerWriter,
    ) -> Result<(), ProtocolError> {
        // Held through the sends so the tick driver cannot write first
        let mut game = self.game.lock().await;
        game.joined(user_id, protocol);
        let builder = game.builder();
        let login = builder.encoded_login(game.name(), salt, rand::random::<u8>());
        let team = (!game.team_name().is_empty()).then(|| builder.team(user_id, game.team_name()));

        let Some(login) = login else {
            warn!("Server announced no usable protocol");
            return Ok(());
        };
        writer.send(&login).await?;
        if let Some(team) = team {
            writer.send(&team).await?;
        }
        self.connected = true;
        info!("Connected! Player number: {} ({:?})", user_id, protocol);
        Ok(())
    }

    /// Processes one frame from the server. Returns false once the server
    /// refused us.
    async fn handle_line(
        &mut self,
        text: &str,
        salt: &str,
        writer: &ServerWriter,
    ) -> Result<bool, ProtocolError> {
        let message = match self.parser.parse(text) {
            Ok(message) => message,
            Err(e) if e.is_malformed() => {
                warn!("Server: {}", e);
                return Ok(true);
            }
            Err(e) => {
                debug!("Ignoring: {}", e);
                return Ok(true);
            }
        };

        match message {
            ProtocolMessage::ClientJoined { user_id, protocol } => {
                self.log_in(user_id, protocol, salt, writer).await?;
            }
            ProtocolMessage::ConnectionDenied { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                return Ok(false);
            }
            other => {
                let mut game = self.game.lock().await;
                for reply in game.handle_message(other, Instant::now()) {
                    writer.send(&reply).await?;
                }
            }
        }
        Ok(true)
    }

    /// Executes a console command. Returns false on `/quit`.
    async fn handle_command(
        &mut self,
        command: Command,
        writer: &ServerWriter,
    ) -> Result<bool, ProtocolError> {
        if !self.connected && !matches!(command, Command::Help | Command::Quit) {
            warn!("Not logged in yet");
            return Ok(true);
        }

        let mut game = self.game.lock().await;
        let outgoing = {
            let builder = game.builder();
            let own_id = game.own_id();
            match command {
                Command::Chat(text) => vec![builder.chat(own_id, &text)],
                Command::Action(action) => vec![builder.chat_action(own_id, &action)],
                Command::GameChat(text) => vec![builder.user_game_chat(game.name(), &text)],
                Command::Team(team_name) => {
                    game.set_team_name(&team_name);
                    vec![builder.team(own_id, team_name.trim())]
                }
                Command::StartGame => vec![builder.start_game(own_id)],
                Command::StopGame => vec![builder.stop_game(own_id)],
                Command::Pause => vec![builder.pause_request(own_id)],
                Command::Resume => vec![builder.resume_request(own_id)],
                Command::Game(action) => game.perform(action),
                Command::Help => {
                    println!("{}", HELP_TEXT);
                    Vec::new()
                }
                Command::Quit => return Ok(false),
            }
        };

        for message in outgoing {
            writer.send(&message).await?;
        }
        Ok(true)
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to {}...", self.server_addr);
        let Connection {
            mut reader,
            writer,
            salt,
        } = connect(&self.server_addr).await?;

        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<Result<Command, InputError>>();
        spawn_stdin_reader(command_tx);
        let tick_driver = spawn_tick_driver(self.game(), writer.clone(), self.tick_interval);

        let mut heartbeat_interval = interval(HEARTBEAT_INTERVAL);
        heartbeat_interval.tick().await;

        let result = loop {
            tokio::select! {
                message = reader.next_message() => {
                    match message {
                        Ok(Some(text)) => match self.handle_line(&text, &salt, &writer).await {
                            Ok(true) => {}
                            Ok(false) => break Ok(()),
                            Err(e) => break Err(e),
                        },
                        Ok(None) => {
                            info!("Server closed the connection");
                            break Ok(());
                        }
                        Err(e) if e.is_malformed() => warn!("Skipping frame: {}", e),
                        Err(e) => break Err(e),
                    }
                },

                command = command_rx.recv() => {
                    match command {
                        Some(Ok(command)) => match self.handle_command(command, &writer).await {
                            Ok(true) => {}
                            Ok(false) => break Ok(()),
                            Err(e) => break Err(e),
                        },
                        Some(Err(e)) => println!("{}", e),
                        None => break Ok(()),
                    }
                },

                _ = heartbeat_interval.tick() => {
                    if let Err(e) = writer.send("").await {
                        break Err(e);
                    }
                },
            }
        };

        tick_driver.abort();
        writer.close().await;
        self.connected = false;
        result?;

        Ok(())
    }
}
