//! Types and wire protocol shared by the skirmish server and client.
//!
//! Everything that has to agree on both ends of the socket lives here: the
//! player identity type, the per-player state record, protocol constants and
//! the text codec in [`protocol`].

pub mod protocol;

pub use protocol::{
    decode, encode, AttackSide, DecodeError, Message, MessageKind, RejectReason, SEPARATOR,
};

/// Server-assigned identifier of a session participant.
pub type PlayerId = u32;

/// First id handed out by a fresh server. Zero is never assigned.
pub const FIRST_PLAYER_ID: PlayerId = 1;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_PLAYERS: usize = 4;
pub const DEFAULT_LEVEL_ID: i32 = 1;

/// Largest datagram either side will read in one receive call.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

pub const DEFAULT_HEARTBEAT_MS: u64 = 1000;
pub const DEFAULT_PEER_TIMEOUT_SECS: u64 = 5;

/// Replicated state of one player.
///
/// The server keeps one per registered address and refreshes it from the
/// owner's `PLAYER_INFO` updates; clients keep one per known id and overwrite
/// it from relayed updates.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub x: i32,
    pub y: i32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub rotation: f32,
    pub alive: bool,
}

impl PlayerRecord {
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            x: 0,
            y: 0,
            vel_x: 0.0,
            vel_y: 0.0,
            rotation: 0.0,
            alive: true,
        }
    }

    /// Overwrites the kinematic fields carried by a `PLAYER_INFO` message.
    pub fn apply_info(&mut self, x: i32, y: i32, vel_x: f32, vel_y: f32, rotation: f32) {
        self.x = x;
        self.y = y;
        self.vel_x = vel_x;
        self.vel_y = vel_y;
        self.rotation = rotation;
    }

    /// Builds the `PLAYER_INFO` message describing this record.
    pub fn to_info(&self) -> Message {
        Message::PlayerInfo {
            id: self.id,
            x: self.x,
            y: self.y,
            vel_x: self.vel_x,
            vel_y: self.vel_y,
            rotation: self.rotation,
        }
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.vel_x, self.vel_y)
    }
}
