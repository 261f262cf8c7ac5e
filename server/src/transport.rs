//! Server side UDP endpoint.
//!
//! One socket bound to a local port, shared between a background receive task
//! and any number of senders. The receive task never interprets payloads; it
//! forwards every datagram, with its source address, to the server loop.

use log::{debug, error};
use shared::{encode, Message, MAX_DATAGRAM_SIZE};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Pause after a failed receive so a socket stuck in an error state does not
/// spin the receive task.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Inbound traffic delivered from the receive task to the server loop.
#[derive(Debug)]
pub enum ServerEvent {
    Datagram { addr: SocketAddr, bytes: Vec<u8> },
    ReceiveFailed(io::Error),
}

pub struct ServerTransport {
    socket: Arc<UdpSocket>,
    receiver: Option<JoinHandle<()>>,
}

impl ServerTransport {
    /// Binds the socket and starts forwarding datagrams into `events`.
    pub async fn bind(
        addr: SocketAddr,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        let receiver = Self::spawn_receiver(Arc::clone(&socket), events);

        Ok(Self {
            socket,
            receiver: Some(receiver),
        })
    }

    fn spawn_receiver(
        socket: Arc<UdpSocket>,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(forward_datagrams(
            move || {
                let socket = Arc::clone(&socket);
                async move {
                    let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
                    let (len, addr) = socket.recv_from(&mut buffer).await?;
                    Ok::<_, io::Error>((addr, buffer[..len].to_vec()))
                }
            },
            events,
        ))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Cloneable handle for sending from other tasks.
    pub fn sender(&self) -> ServerSender {
        ServerSender {
            socket: Arc::clone(&self.socket),
        }
    }

    pub fn is_open(&self) -> bool {
        self.receiver.is_some()
    }

    /// Stops the receive task. Calling it again does nothing.
    pub fn close(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
    }
}

impl Drop for ServerTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Feeds everything `receive` yields into `events` until the server loop
/// hangs up.
async fn forward_datagrams<F, Fut>(mut receive: F, events: mpsc::UnboundedSender<ServerEvent>)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<(SocketAddr, Vec<u8>)>>,
{
    loop {
        let (event, failed) = match receive().await {
            Ok((addr, bytes)) => (ServerEvent::Datagram { addr, bytes }, false),
            // Windows reports ICMP unreachable from an earlier send here
            Err(e) => (ServerEvent::ReceiveFailed(e), true),
        };

        if events.send(event).is_err() {
            debug!("Server loop gone, stopping receiver");
            break;
        }

        if failed {
            tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
        }
    }
}

#[derive(Clone)]
pub struct ServerSender {
    socket: Arc<UdpSocket>,
}

impl ServerSender {
    pub async fn send(&self, addr: SocketAddr, message: &Message) -> io::Result<()> {
        let data = encode(message);
        let sent = self.socket.send_to(&data, addr).await?;
        if sent != data.len() {
            error!("Short send to {}: {} of {} bytes", addr, sent, data.len());
        }
        Ok(())
    }
}
