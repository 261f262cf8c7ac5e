use crate::session::ConnectionState;
use shared::{DecodeError, MessageKind, PlayerId};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("malformed datagram: {0}")]
    Decode(#[from] DecodeError),

    /// The server referred to a player this client never heard join.
    #[error("no player with id {0} in the local registry")]
    UnknownPlayer(PlayerId),

    #[error("no level object at tile ({tile_x}, {tile_y})")]
    UnknownLevelObject { tile_x: i32, tile_y: i32 },

    #[error("{kind} is not valid while {state:?}")]
    UnexpectedMessage {
        kind: MessageKind,
        state: ConnectionState,
    },

    #[error("not connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

impl SessionError {
    /// True when the local registry no longer matches the server's view.
    pub fn is_desync(&self) -> bool {
        matches!(self, SessionError::UnknownPlayer(_))
    }
}
