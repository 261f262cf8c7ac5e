use crate::session::{ClientConfig, ClientSession, ConnectionState, SessionHooks};
use log::{debug, error, info};
use shared::Message;
use std::future::Future;
use std::net::SocketAddr;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Drives a [`ClientSession`]: drains transport events and keeps the
/// connection alive with heartbeats.
pub struct Client<H: SessionHooks> {
    session: ClientSession<H>,
}

impl<H: SessionHooks> Client<H> {
    pub fn new(hooks: H, config: ClientConfig) -> Self {
        Self {
            session: ClientSession::new(hooks, config),
        }
    }

    pub fn session(&self) -> &ClientSession<H> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ClientSession<H> {
        &mut self.session
    }

    pub fn into_session(self) -> ClientSession<H> {
        self.session
    }

    /// Connects to `server_addr` and runs until the session drops back to
    /// disconnected or `shutdown` resolves.
    ///
    /// Each heartbeat tick either keeps a live connection warm or, while
    /// still connecting, repeats the connect request in case the request or
    /// its answer was lost.
    pub async fn run<F>(
        &mut self,
        server_addr: SocketAddr,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Future<Output = ()>,
    {
        let period = self.session.config().heartbeat_interval;
        if period.is_zero() {
            return Err("heartbeat interval must be greater than zero".into());
        }

        self.session.connect(server_addr).await;
        if self.session.state() == ConnectionState::Disconnected {
            return Ok(());
        }

        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                event = self.session.next_event() => {
                    match event {
                        Some(event) => self.session.handle_event(event),
                        None => break,
                    }
                },

                _ = heartbeat.tick() => {
                    match self.session.state() {
                        ConnectionState::Connected => {
                            if let Err(e) = self.session.send(&Message::Heartbeat).await {
                                error!("Error sending heartbeat: {}", e);
                            }
                        }
                        ConnectionState::Connecting => {
                            debug!("No answer from {} yet, asking again", server_addr);
                            if let Err(e) = self.session.send(&Message::ClientRequestConnect).await {
                                error!("Error resending connect request: {}", e);
                            }
                        }
                        ConnectionState::Disconnected => {}
                    }
                },

                _ = &mut shutdown => {
                    info!("Shutting down client");
                    break;
                },
            }

            if self.session.state() == ConnectionState::Disconnected {
                debug!("Session closed, leaving driver loop");
                break;
            }
        }

        self.session.disconnect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{decode, encode, MAX_DATAGRAM_SIZE};
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    struct NoLevel;

    impl SessionHooks for NoLevel {
        type Object = ();

        fn object_at(&self, _tile_x: i32, _tile_y: i32) -> Option<()> {
            None
        }
    }

    async fn recv_message(server: &UdpSocket) -> (Message, SocketAddr) {
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
        let (len, addr) = timeout(Duration::from_secs(2), server.recv_from(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        (decode(&buffer[..len]).unwrap(), addr)
    }

    #[tokio::test]
    async fn test_run_sends_heartbeats_and_disconnects_on_shutdown() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let config = ClientConfig {
            heartbeat_interval: Duration::from_millis(50),
            ..ClientConfig::default()
        };
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let driver = tokio::spawn(async move {
            let mut client = Client::new(NoLevel, config);
            client
                .run(server_addr, async {
                    let _ = stop_rx.await;
                })
                .await
                .map_err(|e| e.to_string())?;
            Ok::<_, String>(client.into_session().state())
        });

        let (request, client_addr) = recv_message(&server).await;
        assert_eq!(request, Message::ClientRequestConnect);

        server
            .send_to(&encode(&Message::ClientAccepted { id: 1 }), client_addr)
            .await
            .unwrap();

        // A slow accept can cross a repeated connect request
        loop {
            let (message, _) = recv_message(&server).await;
            if message == Message::Heartbeat {
                break;
            }
            assert_eq!(message, Message::ClientRequestConnect);
        }

        stop_tx.send(()).unwrap();

        // Heartbeats already in flight may arrive before the disconnect
        loop {
            let (message, _) = recv_message(&server).await;
            if message == Message::ClientDisconnect {
                break;
            }
            assert_eq!(message, Message::Heartbeat);
        }

        let state = driver.await.unwrap().unwrap();
        assert_eq!(state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_run_returns_when_rejected() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let driver = tokio::spawn(async move {
            let mut client = Client::new(NoLevel, ClientConfig::default());
            client
                .run(server_addr, std::future::pending())
                .await
                .map_err(|e| e.to_string())?;
            Ok::<_, String>(client.into_session().last_rejection())
        });

        let (_, client_addr) = recv_message(&server).await;
        server
            .send_to(&encode(&Message::ClientRejected { reason: 1 }), client_addr)
            .await
            .unwrap();

        let rejection = timeout(Duration::from_secs(2), driver)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(rejection, Some(1));
    }

    #[tokio::test]
    async fn test_run_repeats_connect_request_until_answered() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let config = ClientConfig {
            heartbeat_interval: Duration::from_millis(50),
            ..ClientConfig::default()
        };

        let driver = tokio::spawn(async move {
            let mut client = Client::new(NoLevel, config);
            client
                .run(server_addr, tokio::time::sleep(Duration::from_secs(1)))
                .await
                .map_err(|e| e.to_string())?;
            Ok::<_, String>(client.into_session().local_id())
        });

        // First request goes unanswered, as if the accept was lost
        let (first, first_addr) = recv_message(&server).await;
        assert_eq!(first, Message::ClientRequestConnect);

        let (again, again_addr) = recv_message(&server).await;
        assert_eq!(again, Message::ClientRequestConnect);
        assert_eq!(again_addr, first_addr);

        server
            .send_to(&encode(&Message::ClientAccepted { id: 4 }), again_addr)
            .await
            .unwrap();

        loop {
            let (message, _) = recv_message(&server).await;
            if message == Message::Heartbeat {
                break;
            }
            assert_eq!(message, Message::ClientRequestConnect);
        }

        driver.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_zero_heartbeat_interval_is_rejected() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = ClientConfig {
            heartbeat_interval: Duration::ZERO,
            ..ClientConfig::default()
        };

        let mut client = Client::new(NoLevel, config);
        let err = client
            .run(server.local_addr().unwrap(), std::future::pending())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("heartbeat interval"));
        assert_eq!(client.session().state(), ConnectionState::Disconnected);

        // Nothing was sent
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
        let sent = timeout(Duration::from_millis(100), server.recv_from(&mut buffer)).await;
        assert!(sent.is_err());
    }
}
