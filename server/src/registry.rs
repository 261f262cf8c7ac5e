//! Authoritative table of session participants.
//!
//! This module owns everything the server knows about who is in the match:
//! - Player id assignment on join (monotonic, never reused within a run)
//! - The address to player mapping used to attribute inbound datagrams
//! - Relaying player state and events to every other participant
//! - Departure on explicit disconnect, kick, or inactivity
//!
//! The registry never touches the socket. Every reply it produces is queued
//! as an [`Outgoing`] on the outbound channel and written by the server's
//! sender task, so all methods here are synchronous and are only ever called
//! from the server loop.

use crate::error::RegistryError;
use log::{error, info, warn};
use shared::{
    decode, Message, MessageKind, PlayerId, PlayerRecord, RejectReason, FIRST_PLAYER_ID,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// A message addressed to one peer, waiting for the sender task.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub addr: SocketAddr,
    pub message: Message,
}

/// A registered participant.
#[derive(Debug)]
pub struct Peer {
    pub id: PlayerId,
    pub addr: SocketAddr,
    /// Last time any datagram arrived from this address
    pub last_seen: Instant,
    /// Latest state reported by the peer itself
    pub record: PlayerRecord,
}

impl Peer {
    pub fn new(id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            record: PlayerRecord::new(id),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Point-in-time copy of a peer, safe to hand to other tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerInfo {
    pub id: PlayerId,
    pub addr: SocketAddr,
    pub record: PlayerRecord,
}

pub struct SessionRegistry {
    peers: HashMap<SocketAddr, Peer>,
    next_id: PlayerId,
    max_players: usize,
    started: bool,
    level_id: Option<i32>,
    outbound: mpsc::UnboundedSender<Outgoing>,
}

impl SessionRegistry {
    pub fn new(max_players: usize, outbound: mpsc::UnboundedSender<Outgoing>) -> Self {
        Self {
            peers: HashMap::new(),
            next_id: FIRST_PLAYER_ID,
            max_players,
            started: false,
            level_id: None,
            outbound,
        }
    }

    /// Decodes one datagram and dispatches it.
    pub fn handle_datagram(&mut self, addr: SocketAddr, bytes: &[u8]) -> Result<(), RegistryError> {
        let message = decode(bytes)?;
        self.handle_message(addr, message)
    }

    pub fn handle_message(&mut self, addr: SocketAddr, message: Message) -> Result<(), RegistryError> {
        let kind = message.kind();

        if kind == MessageKind::ClientRequestConnect {
            // Rejections are an answer to the peer, not an error on our side
            let _ = self.handle_connect_request(addr);
            return Ok(());
        }

        let sender_id = match self.peers.get_mut(&addr) {
            Some(peer) => {
                peer.touch();
                peer.id
            }
            None => return Err(RegistryError::UnknownPeer { addr, kind }),
        };

        match &message {
            Message::Heartbeat => Ok(()),

            Message::ClientDisconnect => {
                self.remove_peer(addr);
                Ok(())
            }

            Message::PlayerInfo {
                id,
                x,
                y,
                vel_x,
                vel_y,
                rotation,
            } => {
                Self::check_sender(kind, *id, sender_id)?;
                if let Some(peer) = self.peers.get_mut(&addr) {
                    peer.record.apply_info(*x, *y, *vel_x, *vel_y, *rotation);
                }
                self.broadcast(&message, Some(addr));
                Ok(())
            }

            Message::PlayerCollision { id, .. } | Message::PlayerAttack { id, .. } => {
                Self::check_sender(kind, *id, sender_id)?;
                self.broadcast(&message, Some(addr));
                Ok(())
            }

            Message::PlayerHit { id: victim } => {
                let victim_addr = self
                    .addr_of(*victim)
                    .ok_or(RegistryError::UnknownPlayer(*victim))?;
                self.send(victim_addr, Message::PlayerHit { id: sender_id });
                Ok(())
            }

            Message::ClientRequestConnect
            | Message::ClientAccepted { .. }
            | Message::ClientJoined { .. }
            | Message::ClientRejected { .. }
            | Message::GameStart
            | Message::ClientLeft { .. } => Err(RegistryError::UnexpectedMessage(kind)),
        }
    }

    /// Admits, re-admits, or rejects the peer at `addr`.
    ///
    /// A repeated request from an address that is already registered gets its
    /// existing id back, so a lost `CLIENT_ACCEPTED` can be recovered by simply
    /// asking again. Nothing is broadcast in that case.
    pub fn handle_connect_request(&mut self, addr: SocketAddr) -> Result<PlayerId, RejectReason> {
        if let Some(peer) = self.peers.get_mut(&addr) {
            peer.touch();
            let id = peer.id;
            info!("Repeated connect from {}, re-accepting as player {}", addr, id);
            self.send(addr, Message::ClientAccepted { id });
            self.replay_roster(addr);
            return Ok(id);
        }

        if self.started {
            self.reject(addr, RejectReason::MatchInProgress);
            return Err(RejectReason::MatchInProgress);
        }

        if self.peers.len() >= self.max_players {
            self.reject(addr, RejectReason::ServerFull);
            return Err(RejectReason::ServerFull);
        }

        let id = self.next_id;
        self.next_id += 1;

        self.peers.insert(addr, Peer::new(id, addr));
        info!("Player {} joined from {}", id, addr);

        self.send(addr, Message::ClientAccepted { id });
        self.replay_roster(addr);
        self.broadcast(&Message::ClientJoined { id }, Some(addr));

        Ok(id)
    }

    /// Tells the peer at `addr` about everyone else already registered.
    fn replay_roster(&self, addr: SocketAddr) {
        let mut others: Vec<PlayerId> = self
            .peers
            .values()
            .filter(|peer| peer.addr != addr)
            .map(|peer| peer.id)
            .collect();
        others.sort_unstable();

        for id in others {
            self.send(addr, Message::ClientJoined { id });
        }
    }

    fn reject(&self, addr: SocketAddr, reason: RejectReason) {
        warn!("Rejecting {}: {}", addr, reason);
        self.send(
            addr,
            Message::ClientRejected {
                reason: reason.code(),
            },
        );
    }

    /// Queues `message` for every registered peer except `exclude`.
    pub fn broadcast(&self, message: &Message, exclude: Option<SocketAddr>) {
        for addr in self.peers.keys() {
            if Some(*addr) == exclude {
                continue;
            }
            self.send(*addr, message.clone());
        }
    }

    fn send(&self, addr: SocketAddr, message: Message) {
        let kind = message.kind();
        if self.outbound.send(Outgoing { addr, message }).is_err() {
            error!("Outbound queue closed, dropping {} for {}", kind, addr);
        }
    }

    /// Starts the match on `level_id` and tells every peer.
    ///
    /// New connect requests are rejected from here on until the session
    /// empties out. An empty session cannot be started, since nothing would
    /// ever reopen the lobby.
    pub fn start(&mut self, level_id: i32) -> bool {
        if self.peers.is_empty() {
            warn!("Not starting level {}: no players connected", level_id);
            return false;
        }

        self.started = true;
        self.level_id = Some(level_id);
        info!(
            "Starting level {} with {} players",
            level_id,
            self.peers.len()
        );
        self.broadcast(&Message::GameStart, None);
        true
    }

    /// Drops the peer at `addr` and tells the remaining peers it left.
    pub fn remove_peer(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        let peer = self.peers.remove(&addr)?;
        info!("Player {} ({}) left", peer.id, addr);

        self.broadcast(&Message::ClientLeft { id: peer.id }, None);

        if self.peers.is_empty() && self.started {
            info!("Session empty, reopening lobby");
            self.started = false;
            self.level_id = None;
        }

        Some(peer.id)
    }

    /// Removes a player at the host's request. The kicked peer is told too.
    pub fn kick(&mut self, id: PlayerId) -> bool {
        match self.addr_of(id) {
            Some(addr) => {
                self.send(addr, Message::ClientLeft { id });
                self.remove_peer(addr).is_some()
            }
            None => false,
        }
    }

    /// Evicts every peer that has been silent for longer than `timeout`.
    pub fn evict_stale(&mut self, timeout: Duration) -> Vec<PlayerId> {
        let stale: Vec<SocketAddr> = self
            .peers
            .values()
            .filter(|peer| peer.is_timed_out(timeout))
            .map(|peer| peer.addr)
            .collect();

        let mut evicted = Vec::with_capacity(stale.len());
        for addr in stale {
            if let Some(id) = self.peers.get(&addr).map(|peer| peer.id) {
                warn!("Player {} ({}) timed out", id, addr);
                self.send(addr, Message::ClientLeft { id });
            }
            if let Some(id) = self.remove_peer(addr) {
                evicted.push(id);
            }
        }

        evicted
    }

    /// Tells every peer it has been dropped, empties the table and detaches
    /// the outbound queue so the sender task exits once it has flushed.
    pub fn shutdown(&mut self) -> usize {
        let peers: Vec<(SocketAddr, PlayerId)> = self
            .peers
            .values()
            .map(|peer| (peer.addr, peer.id))
            .collect();

        for (addr, id) in &peers {
            self.send(*addr, Message::ClientLeft { id: *id });
        }

        self.peers.clear();
        self.started = false;
        self.level_id = None;

        let (detached, _) = mpsc::unbounded_channel();
        drop(std::mem::replace(&mut self.outbound, detached));

        peers.len()
    }

    fn check_sender(kind: MessageKind, claimed: PlayerId, actual: PlayerId) -> Result<(), RegistryError> {
        if claimed == actual {
            Ok(())
        } else {
            Err(RegistryError::IdMismatch {
                kind,
                claimed,
                actual,
            })
        }
    }

    pub fn peer_id(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.peers.get(&addr).map(|peer| peer.id)
    }

    pub fn addr_of(&self, id: PlayerId) -> Option<SocketAddr> {
        self.peers
            .values()
            .find(|peer| peer.id == id)
            .map(|peer| peer.addr)
    }

    /// Copies of every player record, ordered by id.
    pub fn players(&self) -> Vec<PlayerRecord> {
        let mut players: Vec<PlayerRecord> =
            self.peers.values().map(|peer| peer.record.clone()).collect();
        players.sort_by_key(|record| record.id);
        players
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self
            .peers
            .values()
            .map(|peer| PeerInfo {
                id: peer.id,
                addr: peer.addr,
                record: peer.record.clone(),
            })
            .collect();
        peers.sort_by_key(|peer| peer.id);
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn level_id(&self) -> Option<i32> {
        self.level_id
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }
}
