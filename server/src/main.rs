use clap::Parser;
use client::hooks::LoggingHooks;
use client::session::ClientConfig;
use log::{info, warn};
use server::host::spawn_local_player;
use server::network::{Server, ServerConfig, ServerHandle};
use shared::{DEFAULT_LEVEL_ID, DEFAULT_MAX_PLAYERS, DEFAULT_PEER_TIMEOUT_SECS, DEFAULT_PORT};
use std::net::SocketAddr;
use std::io::BufRead;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum number of players in one session
    #[arg(short = 'm', long, default_value_t = DEFAULT_MAX_PLAYERS)]
    max_players: usize,

    /// Seconds of silence before a player is dropped
    #[arg(short = 't', long, default_value_t = DEFAULT_PEER_TIMEOUT_SECS)]
    peer_timeout_secs: u64,

    /// How often to look for silent players, in milliseconds
    #[arg(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    sweep_interval_ms: u64,

    /// Join the match as a player too
    #[arg(long)]
    play: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let bind_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let config = ServerConfig {
        bind_addr,
        max_players: args.max_players,
        peer_timeout: Duration::from_secs(args.peer_timeout_secs),
        sweep_interval: Duration::from_millis(args.sweep_interval_ms),
    };

    info!("Starting server...");
    info!("Commands: start [level], kick <id>, players, quit");

    let mut server = Server::bind(config).await?;
    let handle = server.handle();

    // Plain thread so a pending stdin read never holds up runtime shutdown
    let console_handle = handle.clone();
    let runtime = Handle::current();
    std::thread::spawn(move || run_console(console_handle, runtime));

    let ctrl_c_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C");
            ctrl_c_handle.shutdown();
        }
    });

    // The host's player joins before anyone else and gets the first id
    let (stop_player, player_stopped) = oneshot::channel::<()>();
    let player = if args.play {
        let server_addr = server.local_addr()?;
        Some(spawn_local_player(
            server_addr,
            LoggingHooks,
            ClientConfig::default(),
            async move {
                let _ = player_stopped.await;
            },
        ))
    } else {
        None
    };

    let result = server.run().await;

    let _ = stop_player.send(());
    if let Some(player) = player {
        let _ = player.await;
    }

    result?;
    Ok(())
}

/// Reads host commands from stdin until EOF or `quit`.
fn run_console(handle: ServerHandle, runtime: Handle) {
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let mut words = line.split_whitespace();

        match (words.next(), words.next()) {
            (Some("start"), level) => {
                let level_id = match level.map(str::parse::<i32>) {
                    None => DEFAULT_LEVEL_ID,
                    Some(Ok(level_id)) => level_id,
                    Some(Err(_)) => {
                        warn!("Usage: start [level]");
                        continue;
                    }
                };
                handle.start(level_id);
            }
            (Some("kick"), Some(id)) => match id.parse() {
                Ok(id) => {
                    handle.kick(id);
                }
                Err(_) => warn!("Usage: kick <id>"),
            },
            (Some("players"), None) => match runtime.block_on(handle.players()) {
                Some(players) if players.is_empty() => info!("No players connected"),
                Some(players) => {
                    for peer in players {
                        info!(
                            "Player {} at {}: pos ({}, {}) vel ({:.2}, {:.2}) rot {:.2}",
                            peer.id,
                            peer.addr,
                            peer.record.x,
                            peer.record.y,
                            peer.record.vel_x,
                            peer.record.vel_y,
                            peer.record.rotation
                        );
                    }
                }
                None => break,
            },
            (Some("quit"), None) => {
                handle.shutdown();
                break;
            }
            (None, _) => {}
            _ => warn!("Unknown command: {}", line.trim()),
        }
    }
}
