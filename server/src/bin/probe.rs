//! Raw protocol probe: joins a server, reports its own position for a few
//! seconds while printing everything the server says, then leaves.

use clap::Parser;
use shared::{decode, encode, Message, DEFAULT_PORT, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to probe
    #[arg(short = 's', long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))]
    server: SocketAddr,

    /// How many position updates to send
    #[arg(short = 'n', long, default_value = "10")]
    updates: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Probe socket bound to {}", socket.local_addr()?);

    println!("Sending connection request to {}", args.server);
    socket
        .send_to(&encode(&Message::ClientRequestConnect), args.server)
        .await?;

    let mut buf = [0u8; MAX_DATAGRAM_SIZE];

    println!("Waiting for server response...");
    let (len, addr) = timeout(Duration::from_secs(3), socket.recv_from(&mut buf)).await??;
    println!("Received {} bytes from {}", len, addr);

    let id = match decode(&buf[..len]) {
        Ok(Message::ClientAccepted { id }) => {
            println!("Connection accepted with player id {}", id);
            id
        }
        Ok(Message::ClientRejected { reason }) => {
            println!("Connection rejected, reason {}", reason);
            return Ok(());
        }
        Ok(other) => {
            println!("Expected CLIENT_ACCEPTED but got: {:?}", other);
            return Ok(());
        }
        Err(e) => {
            println!("Failed to decode response: {}", e);
            return Ok(());
        }
    };

    let mut ticker = interval(Duration::from_millis(250));
    let mut sent = 0;

    while sent < args.updates {
        tokio::select! {
            _ = ticker.tick() => {
                let angle = sent as f32 / 5.0;
                let info = Message::PlayerInfo {
                    id,
                    x: (angle.cos() * 100.0) as i32,
                    y: (angle.sin() * 100.0) as i32,
                    vel_x: -angle.sin(),
                    vel_y: angle.cos(),
                    rotation: angle,
                };
                println!("Sending {:?}", info);
                socket.send_to(&encode(&info), args.server).await?;
                sent += 1;
            },

            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, _)) => match decode(&buf[..len]) {
                        Ok(message) => println!("Received {:?}", message),
                        Err(e) => println!("Undecodable datagram: {}", e),
                    },
                    Err(e) => println!("Error receiving: {}", e),
                }
            },
        }
    }

    println!("Sending disconnect");
    socket
        .send_to(&encode(&Message::ClientDisconnect), args.server)
        .await?;

    println!("Probe finished");
    Ok(())
}
