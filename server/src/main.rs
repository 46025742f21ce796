use clap::{Parser, ValueEnum};
use log::info;
use std::time::Duration;
use tetri_server::network::{Server, ServerConfig, ServerMessage};
use tetri_shared::{GameOptions, Protocol, DEFAULT_MAX_USERS, DEFAULT_PORT};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProtocolArg {
    Tetrinet,
    Tetrifast,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Tetrinet => Protocol::TetriNet,
            ProtocolArg::Tetrifast => Protocol::TetriFast,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Protocol dialect spoken by clients
    #[arg(long, value_enum, default_value = "tetrinet")]
    protocol: ProtocolArg,

    /// Maximum number of connected players
    #[arg(short, long, default_value_t = DEFAULT_MAX_USERS)]
    max_users: usize,

    /// Seconds of silence before a client is dropped
    #[arg(short, long, default_value = "120")]
    timeout_secs: u64,

    /// JSON file with game options; missing keys keep their defaults
    #[arg(short, long)]
    game_options: Option<String>,
}

fn load_game_options(path: Option<&str>) -> Result<GameOptions, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let options: GameOptions = serde_json::from_str(&text)?;
            info!("Loaded game options from {}", path);
            Ok(options)
        }
        None => Ok(GameOptions::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        protocol: args.protocol.into(),
        max_users: args.max_users,
        client_timeout: Duration::from_secs(args.timeout_secs),
        game_options: load_game_options(args.game_options.as_deref())?,
        ..ServerConfig::default()
    };

    info!("Starting server...");
    info!(
        "Protocol: {:?}, up to {} players",
        config.protocol, config.max_users
    );

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config).await?;
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            if shutdown.send(ServerMessage::Shutdown).is_err() {
                eprintln!("Server already stopped");
            }
        }
    });

    server.run().await?;

    Ok(())
}
