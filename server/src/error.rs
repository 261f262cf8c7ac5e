use shared::{DecodeError, MessageKind, PlayerId};
use std::net::SocketAddr;
use thiserror::Error;

/// Why the registry dropped an inbound datagram.
///
/// None of these end a peer's session; the server loop logs them and moves
/// on to the next datagram.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("malformed datagram: {0}")]
    Decode(#[from] DecodeError),

    #[error("{kind} from unregistered address {addr}")]
    UnknownPeer { addr: SocketAddr, kind: MessageKind },

    #[error("no registered player with id {0}")]
    UnknownPlayer(PlayerId),

    #[error("peer {actual} sent {kind} on behalf of player {claimed}")]
    IdMismatch {
        kind: MessageKind,
        claimed: PlayerId,
        actual: PlayerId,
    },

    #[error("{0} is not a client-to-server message")]
    UnexpectedMessage(MessageKind),
}

impl RegistryError {
    /// Errors that mean the server and a client disagree about who is in the
    /// session, as opposed to a single garbled or misdirected datagram.
    pub fn is_desync(&self) -> bool {
        matches!(
            self,
            RegistryError::UnknownPlayer(_) | RegistryError::IdMismatch { .. }
        )
    }
}
