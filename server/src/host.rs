//! Lets the host take part in its own match.
//!
//! The host's player is an ordinary in-process client that joins over
//! loopback, so the server treats it exactly like any other peer.

use client::network::Client;
use client::session::{ClientConfig, ClientSession, SessionHooks};
use log::{error, info};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::task::JoinHandle;

/// Address a local client should use to reach a server bound to `bound`.
///
/// A wildcard bind is mapped to the loopback address of the same family.
pub fn loopback_addr(bound: SocketAddr) -> SocketAddr {
    let ip = match bound.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, bound.port())
}

/// Spawns the host's own player against `server_addr`.
///
/// The player runs until `shutdown` resolves or the server drops it. The
/// task hands back the finished session.
pub fn spawn_local_player<H, F>(
    server_addr: SocketAddr,
    hooks: H,
    config: ClientConfig,
    shutdown: F,
) -> JoinHandle<ClientSession<H>>
where
    H: SessionHooks + Send + Sync + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let server_addr = loopback_addr(server_addr);

    tokio::spawn(async move {
        info!("Joining own match at {}", server_addr);

        let mut client = Client::new(hooks, config);
        if let Err(e) = client.run(server_addr, shutdown).await {
            error!("Host player stopped: {}", e);
        }

        client.into_session()
    })
}
