use clap::Parser;
use log::info;
use std::time::Duration;
use tetri_client::network::Client;
use tetri_shared::DEFAULT_PORT;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,

    /// Nickname shown to the other players
    #[arg(short = 'n', long)]
    name: String,

    /// Team to join
    #[arg(short = 't', long, default_value = "")]
    team: String,

    /// How often the block timer is checked, in milliseconds
    #[arg(long, default_value = "20", value_parser = clap::value_parser!(u64).range(1..))]
    tick_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info to see chat and game events");
    }

    let args = Args::parse();

    if args.name.is_empty() || args.name.contains(' ') {
        return Err("name must be a single word".into());
    }

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    info!("Type /help for commands");

    let mut client = Client::new(
        &args.server,
        &args.name,
        &args.team,
        Duration::from_millis(args.tick_ms),
    );

    client.run().await?;

    Ok(())
}
