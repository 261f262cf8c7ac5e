use crate::error::SessionError;
use crate::transport::{ClientSender, ClientTransport, TransportEvent, TransportEventKind};
use log::{debug, error, info, warn};
use shared::{
    decode, encode, AttackSide, Message, MessageKind, PlayerId, PlayerRecord, RejectReason,
    DEFAULT_HEARTBEAT_MS, DEFAULT_LEVEL_ID,
};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Connect request sent, no answer yet.
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub heartbeat_interval: Duration,
    /// Level loaded when the host starts the match.
    pub level_id: i32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            level_id: DEFAULT_LEVEL_ID,
        }
    }
}

/// A player as seen by this client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientPlayer {
    pub record: PlayerRecord,
    /// True for the player this client controls.
    pub local: bool,
    attacking: [bool; 2],
}

impl ClientPlayer {
    pub fn new(id: PlayerId, local: bool) -> Self {
        Self {
            record: PlayerRecord::new(id),
            local,
            attacking: [false; 2],
        }
    }

    pub fn id(&self) -> PlayerId {
        self.record.id
    }

    pub fn is_attacking(&self, side: AttackSide) -> bool {
        self.attacking[side.index()]
    }

    pub fn set_attacking(&mut self, side: AttackSide, active: bool) {
        self.attacking[side.index()] = active;
    }
}

/// Callbacks into the game that owns the session.
///
/// Everything here runs on the task that drives the session, so hooks
/// never race with registry updates.
pub trait SessionHooks {
    /// Static level geometry that collisions refer to.
    type Object;

    /// Looks up the level object occupying a tile.
    fn object_at(&self, tile_x: i32, tile_y: i32) -> Option<Self::Object>;

    fn load_level(&mut self, _level_id: i32) {}

    fn on_collision_enter(&mut self, _player: &ClientPlayer, _object: &Self::Object) {}

    fn on_collision_exit(&mut self, _player: &ClientPlayer, _object: &Self::Object) {}

    fn on_attack_change(&mut self, _player: &ClientPlayer, _side: AttackSide, _active: bool) {}

    /// The local player was struck by `attacker`.
    fn on_hit(&mut self, _local: &mut ClientPlayer, _attacker: &ClientPlayer) {}

    /// Called after the player has been removed from the registry.
    fn on_player_left(&mut self, _player: &ClientPlayer) {}

    fn on_unable_to_connect(&mut self) {}
}

/// Client half of a session: connection state plus the local view of
/// every player the server has announced.
pub struct ClientSession<H: SessionHooks> {
    hooks: H,
    config: ClientConfig,
    state: ConnectionState,
    local_id: Option<PlayerId>,
    players: HashMap<PlayerId, ClientPlayer>,
    started: bool,
    last_rejection: Option<i32>,

    transport: Option<ClientTransport>,
    // Bumped on every teardown so events from a closed transport are dropped
    epoch: u64,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl<H: SessionHooks> ClientSession<H> {
    pub fn new(hooks: H, config: ClientConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            hooks,
            config,
            state: ConnectionState::Disconnected,
            local_id: None,
            players: HashMap::new(),
            started: false,
            last_rejection: None,
            transport: None,
            epoch: 0,
            events_tx,
            events_rx,
        }
    }

    /// Opens a transport to `server_addr` and sends the connect request.
    ///
    /// Any existing connection is torn down first. On failure the game is
    /// told through [`SessionHooks::on_unable_to_connect`] and the session
    /// stays disconnected.
    pub async fn connect(&mut self, server_addr: SocketAddr) {
        self.disconnect();
        self.last_rejection = None;

        info!("Connecting to {}", server_addr);

        let events = self.events_tx.clone();
        let transport = match ClientTransport::open(server_addr, self.epoch, events).await {
            Ok(transport) => transport,
            Err(e) => return self.unable_to_connect(server_addr, e),
        };

        if let Err(e) = transport
            .send(&encode(&Message::ClientRequestConnect))
            .await
        {
            return self.unable_to_connect(server_addr, e);
        }

        self.transport = Some(transport);
        self.state = ConnectionState::Connecting;
    }

    fn unable_to_connect(&mut self, server_addr: SocketAddr, e: io::Error) {
        error!("Unable to reach {}: {}", server_addr, e);
        self.hooks.on_unable_to_connect();
    }

    /// Leaves the session. Safe to call in any state, any number of times.
    pub fn disconnect(&mut self) {
        self.teardown(true);
    }

    fn teardown(&mut self, notify_server: bool) {
        if let Some(mut transport) = self.transport.take() {
            if notify_server && self.state == ConnectionState::Connected {
                if let Err(e) = transport.try_send(&encode(&Message::ClientDisconnect)) {
                    debug!("Could not send disconnect: {}", e);
                }
            }
            transport.close();
            info!("Disconnected from {}", transport.server_addr());
        }

        self.players.clear();
        self.local_id = None;
        self.started = false;
        self.state = ConnectionState::Disconnected;
        self.epoch += 1;
    }

    pub async fn send(&self, message: &Message) -> Result<(), SessionError> {
        let transport = self.transport.as_ref().ok_or(SessionError::NotConnected)?;
        transport.send(&encode(message)).await?;
        Ok(())
    }

    /// Reports the local player's current record to the server.
    pub async fn send_local_info(&self) -> Result<(), SessionError> {
        let local = self.local_player().ok_or(SessionError::NotConnected)?;
        self.send(&local.record.to_info()).await
    }

    /// A send handle for other tasks. `None` while disconnected.
    pub fn sender(&self) -> Option<ClientSender> {
        self.transport.as_ref().map(ClientTransport::sender)
    }

    /// Waits for the next event from the receive task.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events_rx.recv().await
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        if event.epoch != self.epoch || self.transport.is_none() {
            debug!("Dropping event from a closed connection");
            return;
        }

        match event.kind {
            TransportEventKind::Datagram(bytes) => {
                if let Err(e) = self.handle_datagram(&bytes) {
                    if e.is_desync() {
                        error!("Session out of sync: {}", e);
                    } else {
                        warn!("Dropping message: {}", e);
                    }
                }
            }
            TransportEventKind::ReceiveFailed(e) => self.handle_receive_error(e),
        }
    }

    fn handle_receive_error(&mut self, e: io::Error) {
        if e.kind() == io::ErrorKind::ConnectionRefused && self.state == ConnectionState::Connecting
        {
            error!("Server refused the connection: {}", e);
            self.hooks.on_unable_to_connect();
            self.teardown(false);
        } else {
            warn!("Error receiving datagram: {}", e);
        }
    }

    pub fn handle_datagram(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        let message = decode(bytes)?;
        self.handle_message(message)
    }

    pub fn handle_message(&mut self, message: Message) -> Result<(), SessionError> {
        match message {
            Message::ClientAccepted { id } => self.on_accepted(id),
            Message::ClientJoined { id } => self.on_joined(id),
            Message::ClientRejected { reason } => self.on_rejected(reason),
            Message::PlayerInfo {
                id,
                x,
                y,
                vel_x,
                vel_y,
                rotation,
            } => self.on_player_info(id, x, y, vel_x, vel_y, rotation),
            Message::PlayerCollision {
                id,
                tile_x,
                tile_y,
                entering,
            } => self.on_collision(id, tile_x, tile_y, entering),
            Message::PlayerAttack { id, side, active } => self.on_attack(id, side, active),
            Message::PlayerHit { id } => self.on_hit(id),
            Message::GameStart => self.on_game_start(),
            Message::ClientLeft { id } => self.on_left(id),
            other => Err(self.unexpected(other.kind())),
        }
    }

    fn unexpected(&self, kind: MessageKind) -> SessionError {
        SessionError::UnexpectedMessage {
            kind,
            state: self.state,
        }
    }

    fn is_local(&self, id: PlayerId) -> bool {
        self.local_id == Some(id)
    }

    fn on_accepted(&mut self, id: PlayerId) -> Result<(), SessionError> {
        match self.state {
            ConnectionState::Connecting => {
                self.local_id = Some(id);
                self.players.insert(id, ClientPlayer::new(id, true));
                self.state = ConnectionState::Connected;
                info!("Connected as player {}", id);
                Ok(())
            }
            // The server answers a repeated connect request with the same id
            ConnectionState::Connected if self.is_local(id) => {
                debug!("Repeated accept for player {}", id);
                Ok(())
            }
            _ => Err(self.unexpected(MessageKind::ClientAccepted)),
        }
    }

    fn on_joined(&mut self, id: PlayerId) -> Result<(), SessionError> {
        if self.state == ConnectionState::Disconnected {
            return Err(self.unexpected(MessageKind::ClientJoined));
        }
        if self.is_local(id) {
            return Ok(());
        }

        if !self.players.contains_key(&id) {
            info!("Player {} joined", id);
            self.players.insert(id, ClientPlayer::new(id, false));
        }
        Ok(())
    }

    fn on_rejected(&mut self, reason: i32) -> Result<(), SessionError> {
        if self.state == ConnectionState::Disconnected {
            return Err(self.unexpected(MessageKind::ClientRejected));
        }

        match RejectReason::from_code(reason) {
            Some(known) => warn!("Rejected by server: {}", known),
            None => warn!("Rejected by server, reason {}", reason),
        }

        self.teardown(false);
        self.last_rejection = Some(reason);
        Ok(())
    }

    fn on_player_info(
        &mut self,
        id: PlayerId,
        x: i32,
        y: i32,
        vel_x: f32,
        vel_y: f32,
        rotation: f32,
    ) -> Result<(), SessionError> {
        // Once the match runs the local simulation owns the local player
        if self.started && self.is_local(id) {
            return Ok(());
        }

        let player = self
            .players
            .get_mut(&id)
            .ok_or(SessionError::UnknownPlayer(id))?;
        player.record.apply_info(x, y, vel_x, vel_y, rotation);
        Ok(())
    }

    fn on_collision(
        &mut self,
        id: PlayerId,
        tile_x: i32,
        tile_y: i32,
        entering: bool,
    ) -> Result<(), SessionError> {
        if self.is_local(id) {
            return Ok(());
        }

        let player = self
            .players
            .get(&id)
            .ok_or(SessionError::UnknownPlayer(id))?;
        let object = self
            .hooks
            .object_at(tile_x, tile_y)
            .ok_or(SessionError::UnknownLevelObject { tile_x, tile_y })?;

        if entering {
            self.hooks.on_collision_enter(player, &object);
        } else {
            self.hooks.on_collision_exit(player, &object);
        }
        Ok(())
    }

    fn on_attack(
        &mut self,
        id: PlayerId,
        side: AttackSide,
        active: bool,
    ) -> Result<(), SessionError> {
        if self.is_local(id) {
            return Ok(());
        }

        let player = self
            .players
            .get_mut(&id)
            .ok_or(SessionError::UnknownPlayer(id))?;
        player.set_attacking(side, active);
        self.hooks.on_attack_change(player, side, active);
        Ok(())
    }

    fn on_hit(&mut self, attacker_id: PlayerId) -> Result<(), SessionError> {
        let local_id = self.local_id.ok_or(SessionError::NotConnected)?;
        let attacker = self
            .players
            .get(&attacker_id)
            .cloned()
            .ok_or(SessionError::UnknownPlayer(attacker_id))?;
        let local = self
            .players
            .get_mut(&local_id)
            .ok_or(SessionError::UnknownPlayer(local_id))?;

        info!("Hit by player {}", attacker_id);
        self.hooks.on_hit(local, &attacker);
        Ok(())
    }

    fn on_game_start(&mut self) -> Result<(), SessionError> {
        if self.state != ConnectionState::Connected {
            return Err(self.unexpected(MessageKind::GameStart));
        }

        info!("Match starting on level {}", self.config.level_id);
        self.hooks.load_level(self.config.level_id);
        self.started = true;
        Ok(())
    }

    fn on_left(&mut self, id: PlayerId) -> Result<(), SessionError> {
        if self.is_local(id) {
            warn!("Removed from the session by the server");
            self.teardown(false);
            return Ok(());
        }

        let player = self
            .players
            .remove(&id)
            .ok_or(SessionError::UnknownPlayer(id))?;
        info!("Player {} left", id);
        self.hooks.on_player_left(&player);
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn local_id(&self) -> Option<PlayerId> {
        self.local_id
    }

    /// Reason code of the last `CLIENT_REJECTED`, cleared on the next connect.
    pub fn last_rejection(&self) -> Option<i32> {
        self.last_rejection
    }

    pub fn player(&self, id: PlayerId) -> Option<&ClientPlayer> {
        self.players.get(&id)
    }

    pub fn local_player(&self) -> Option<&ClientPlayer> {
        self.local_id.and_then(|id| self.players.get(&id))
    }

    pub fn local_player_mut(&mut self) -> Option<&mut ClientPlayer> {
        let id = self.local_id?;
        self.players.get_mut(&id)
    }

    /// Snapshot of every known player, ordered by id.
    pub fn players(&self) -> Vec<ClientPlayer> {
        let mut players: Vec<ClientPlayer> = self.players.values().cloned().collect();
        players.sort_by_key(ClientPlayer::id);
        players
    }

    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.transport.as_ref().map(ClientTransport::server_addr)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }
}
