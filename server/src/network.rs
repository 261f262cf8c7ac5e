//! Server network layer: socket tasks and the single loop that owns the registry

use crate::registry::{Outgoing, PeerInfo, SessionRegistry};
use crate::transport::{ServerEvent, ServerTransport};
use log::{debug, error, info, warn};
use shared::{PlayerId, DEFAULT_MAX_PLAYERS, DEFAULT_PEER_TIMEOUT_SECS, DEFAULT_PORT};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_players: usize,
    /// Silence after which a peer is evicted
    pub peer_timeout: Duration,
    /// How often the registry is swept for silent peers
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            max_players: DEFAULT_MAX_PLAYERS,
            peer_timeout: Duration::from_secs(DEFAULT_PEER_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Requests from the hosting application to the server loop
#[derive(Debug)]
pub enum ServerCommand {
    Start { level_id: i32 },
    Kick { id: PlayerId },
    Players { reply: oneshot::Sender<Vec<PeerInfo>> },
    Shutdown,
}

/// Cloneable way to drive a running [`Server`] from other tasks.
#[derive(Clone)]
pub struct ServerHandle {
    commands: mpsc::UnboundedSender<ServerCommand>,
}

impl ServerHandle {
    /// Returns false if the server loop has already exited.
    pub fn start(&self, level_id: i32) -> bool {
        self.commands.send(ServerCommand::Start { level_id }).is_ok()
    }

    pub fn kick(&self, id: PlayerId) -> bool {
        self.commands.send(ServerCommand::Kick { id }).is_ok()
    }

    /// Snapshot of the peer table, or None if the server is gone.
    pub async fn players(&self) -> Option<Vec<PeerInfo>> {
        let (reply, response) = oneshot::channel();
        self.commands.send(ServerCommand::Players { reply }).ok()?;
        response.await.ok()
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(ServerCommand::Shutdown);
    }
}

/// The authoritative session host.
///
/// Inbound datagrams arrive from the transport's receive task over a channel,
/// host commands over another; [`Server::run`] drains both from one loop, which
/// is therefore the only code that ever mutates the registry.
pub struct Server {
    transport: ServerTransport,
    registry: SessionRegistry,
    config: ServerConfig,

    // Communication channels
    events_rx: mpsc::UnboundedReceiver<ServerEvent>,
    outbound_rx: Option<mpsc::UnboundedReceiver<Outgoing>>,
    commands_tx: mpsc::UnboundedSender<ServerCommand>,
    commands_rx: mpsc::UnboundedReceiver<ServerCommand>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if config.sweep_interval.is_zero() {
            return Err("sweep interval must be greater than zero".into());
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let transport = ServerTransport::bind(config.bind_addr, events_tx).await?;
        info!("Server listening on {}", transport.local_addr()?);

        Ok(Server {
            transport,
            registry: SessionRegistry::new(config.max_players, outbound_tx),
            config,
            events_rx,
            outbound_rx: Some(outbound_rx),
            commands_tx,
            commands_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            commands: self.commands_tx.clone(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Spawns the task that writes queued messages to the socket
    fn spawn_network_sender(&mut self) -> Option<JoinHandle<()>> {
        let sender = self.transport.sender();
        let mut outbound_rx = self.outbound_rx.take()?;

        Some(tokio::spawn(async move {
            while let Some(Outgoing { addr, message }) = outbound_rx.recv().await {
                if let Err(e) = sender.send(addr, &message).await {
                    error!("Failed to send {} to {}: {}", message.kind(), addr, e);
                }
            }
        }))
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Datagram { addr, bytes } => {
                if let Err(e) = self.registry.handle_datagram(addr, &bytes) {
                    if e.is_desync() {
                        error!("Dropped datagram from {}: {}", addr, e);
                    } else {
                        warn!("Dropped datagram from {}: {}", addr, e);
                    }
                }
            }
            ServerEvent::ReceiveFailed(e) => {
                warn!("Error receiving datagram: {}", e);
            }
        }
    }

    fn handle_command(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::Start { level_id } => {
                self.registry.start(level_id);
            }
            ServerCommand::Kick { id } => {
                if !self.registry.kick(id) {
                    warn!("Cannot kick player {}: not registered", id);
                }
            }
            ServerCommand::Players { reply } => {
                let _ = reply.send(self.registry.peers());
            }
            // Handled by the run loop
            ServerCommand::Shutdown => {}
        }
    }

    /// Main server loop. Returns after a shutdown command.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let sender_task = self
            .spawn_network_sender()
            .ok_or("server loop already ran")?;

        let mut sweep = interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Server started successfully (max {} players, {:?} peer timeout)",
            self.config.max_players, self.config.peer_timeout
        );

        loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            error!("Receive task stopped");
                            break;
                        }
                    }
                },

                command = self.commands_rx.recv() => {
                    match command {
                        Some(ServerCommand::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                        Some(command) => self.handle_command(command),
                    }
                },

                _ = sweep.tick() => {
                    let evicted = self.registry.evict_stale(self.config.peer_timeout);
                    if !evicted.is_empty() {
                        debug!("Evicted {:?}, {} players left", evicted, self.registry.len());
                    }
                },
            }
        }

        let notified = self.registry.shutdown();
        debug!("Notified {} players of shutdown", notified);

        if timeout(Duration::from_secs(1), sender_task).await.is_err() {
            warn!("Outbound queue did not flush before shutdown");
        }
        self.transport.close();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{decode, encode, Message, MAX_DATAGRAM_SIZE};
    use tokio::net::UdpSocket;

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..ServerConfig::default()
        }
    }

    async fn recv_message(socket: &UdpSocket) -> Message {
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .expect("timed out waiting for server")
            .unwrap();
        decode(&buffer[..len]).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.max_players, DEFAULT_MAX_PLAYERS);
        assert_eq!(config.peer_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_server_accepts_over_udp() {
        let mut server = Server::bind(test_config()).await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let handle = server.handle();
        let task = tokio::spawn(async move { server.run().await.is_ok() });

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(&encode(&Message::ClientRequestConnect), server_addr)
            .await
            .unwrap();

        assert_eq!(recv_message(&peer).await, Message::ClientAccepted { id: 1 });

        let players = handle.players().await.unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].addr, peer.local_addr().unwrap());

        handle.shutdown();
        assert_eq!(recv_message(&peer).await, Message::ClientLeft { id: 1 });
        assert!(task.await.unwrap());
    }

    #[tokio::test]
    async fn test_start_command_reaches_peers() {
        let mut server = Server::bind(test_config()).await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let handle = server.handle();
        let task = tokio::spawn(async move { server.run().await.is_ok() });

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(&encode(&Message::ClientRequestConnect), server_addr)
            .await
            .unwrap();
        assert_eq!(recv_message(&peer).await, Message::ClientAccepted { id: 1 });

        assert!(handle.start(2));
        assert_eq!(recv_message(&peer).await, Message::GameStart);

        handle.shutdown();
        assert!(task.await.unwrap());
        assert!(!handle.start(2));
    }

    #[tokio::test]
    async fn test_silent_peer_is_evicted() {
        let config = ServerConfig {
            peer_timeout: Duration::from_millis(100),
            sweep_interval: Duration::from_millis(20),
            ..test_config()
        };
        let mut server = Server::bind(config).await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let handle = server.handle();
        let task = tokio::spawn(async move { server.run().await.is_ok() });

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(&encode(&Message::ClientRequestConnect), server_addr)
            .await
            .unwrap();
        assert_eq!(recv_message(&peer).await, Message::ClientAccepted { id: 1 });

        assert_eq!(recv_message(&peer).await, Message::ClientLeft { id: 1 });
        assert_eq!(handle.players().await.unwrap().len(), 0);

        handle.shutdown();
        assert!(task.await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_sweep_interval_is_rejected() {
        let config = ServerConfig {
            sweep_interval: Duration::ZERO,
            ..test_config()
        };

        let err = Server::bind(config).await.err().unwrap();
        assert!(err.to_string().contains("sweep interval"));
    }

    #[tokio::test]
    async fn test_run_twice_fails() {
        let mut server = Server::bind(test_config()).await.unwrap();
        server.handle().shutdown();
        assert!(server.run().await.is_ok());
        assert!(server.run().await.is_err());
    }
}
