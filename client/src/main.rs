use clap::Parser;
use client::hooks::LoggingHooks;
use client::network::Client;
use client::session::ClientConfig;
use log::info;
use shared::{DEFAULT_HEARTBEAT_MS, DEFAULT_LEVEL_ID, DEFAULT_PORT};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))]
    server: SocketAddr,

    /// Interval between heartbeats in milliseconds
    #[arg(long, default_value_t = DEFAULT_HEARTBEAT_MS, value_parser = clap::value_parser!(u64).range(1..))]
    heartbeat_ms: u64,

    /// Level to load when the match starts
    #[arg(short = 'l', long, default_value_t = DEFAULT_LEVEL_ID)]
    level: i32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ClientConfig {
        heartbeat_interval: Duration::from_millis(args.heartbeat_ms),
        level_id: args.level,
    };

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let mut client = Client::new(LoggingHooks, config);
    client
        .run(args.server, async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C");
            }
        })
        .await?;

    if let Some(reason) = client.session().last_rejection() {
        info!("Server rejected the connection with reason {}", reason);
    }

    Ok(())
}
