//! Client side UDP endpoint bound to one server.

use log::debug;
use shared::{encode, Message, MAX_DATAGRAM_SIZE};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Something the receive task observed, tagged with the epoch of the
/// transport that produced it.
#[derive(Debug)]
pub struct TransportEvent {
    pub epoch: u64,
    pub kind: TransportEventKind,
}

#[derive(Debug)]
pub enum TransportEventKind {
    Datagram(Vec<u8>),
    ReceiveFailed(io::Error),
}

pub struct ClientTransport {
    socket: Arc<UdpSocket>,
    // Shared with every ClientSender handed out
    closed: Arc<AtomicBool>,
    server_addr: SocketAddr,
    epoch: u64,
    receiver: Option<JoinHandle<()>>,
}

impl ClientTransport {
    /// Binds an ephemeral port, connects it to `server_addr` and starts
    /// forwarding every received datagram into `events`.
    pub async fn open(
        server_addr: SocketAddr,
        epoch: u64,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> io::Result<Self> {
        let local_addr: SocketAddr = if server_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local_addr).await?;
        socket.connect(server_addr).await?;

        let socket = Arc::new(socket);
        let receiver = Self::spawn_receiver(Arc::clone(&socket), epoch, events);

        Ok(Self {
            socket,
            closed: Arc::new(AtomicBool::new(false)),
            server_addr,
            epoch,
            receiver: Some(receiver),
        })
    }

    fn spawn_receiver(
        socket: Arc<UdpSocket>,
        epoch: u64,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

            loop {
                let (kind, failed) = match socket.recv(&mut buffer).await {
                    Ok(len) => (TransportEventKind::Datagram(buffer[..len].to_vec()), false),
                    Err(e) => (TransportEventKind::ReceiveFailed(e), true),
                };

                if events.send(TransportEvent { epoch, kind }).is_err() {
                    debug!("Session gone, stopping receiver");
                    break;
                }

                if failed {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn send(&self, bytes: &[u8]) -> io::Result<()> {
        self.socket.send(bytes).await?;
        Ok(())
    }

    /// Sends without waiting for socket readiness. Used where the caller
    /// cannot await, such as during teardown.
    pub fn try_send(&self, bytes: &[u8]) -> io::Result<()> {
        self.socket.try_send(bytes)?;
        Ok(())
    }

    pub fn sender(&self) -> ClientSender {
        ClientSender {
            socket: Arc::clone(&self.socket),
            closed: Arc::clone(&self.closed),
        }
    }

    pub fn is_open(&self) -> bool {
        self.receiver.is_some()
    }

    /// Stops the receive task and disables every sender handle. Calling it
    /// again does nothing.
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
    }
}

impl Drop for ClientTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Send half that can live on another task, e.g. the game update loop.
///
/// Stops working once the transport it came from is closed.
#[derive(Clone)]
pub struct ClientSender {
    socket: Arc<UdpSocket>,
    closed: Arc<AtomicBool>,
}

impl ClientSender {
    pub async fn send(&self, message: &Message) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection closed",
            ));
        }
        self.socket.send(&encode(message)).await?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::decode;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_send_and_receive_through_connected_socket() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let transport = ClientTransport::open(server.local_addr().unwrap(), 3, tx)
            .await
            .unwrap();
        transport
            .send(&encode(&Message::ClientRequestConnect))
            .await
            .unwrap();

        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
        let (len, client_addr) = server.recv_from(&mut buffer).await.unwrap();
        assert_eq!(decode(&buffer[..len]).unwrap(), Message::ClientRequestConnect);
        assert_eq!(client_addr, transport.local_addr().unwrap());

        server
            .send_to(&encode(&Message::ClientAccepted { id: 1 }), client_addr)
            .await
            .unwrap();

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.epoch, 3);
        match event.kind {
            TransportEventKind::Datagram(bytes) => {
                assert_eq!(decode(&bytes).unwrap(), Message::ClientAccepted { id: 1 });
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sender_handle_shares_socket() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = ClientTransport::open(server.local_addr().unwrap(), 0, tx)
            .await
            .unwrap();

        let sender = transport.sender();
        tokio::spawn(async move { sender.send(&Message::Heartbeat).await })
            .await
            .unwrap()
            .unwrap();

        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
        let (len, _) = timeout(Duration::from_secs(1), server.recv_from(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decode(&buffer[..len]).unwrap(), Message::Heartbeat);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport = ClientTransport::open(server.local_addr().unwrap(), 0, tx)
            .await
            .unwrap();

        let sender = transport.sender();

        transport.close();
        transport.close();
        assert!(!transport.is_open());
        assert!(sender.is_closed());
    }
}
