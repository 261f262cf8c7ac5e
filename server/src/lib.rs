//! # Session Server Library
//!
//! This library provides the authoritative host for a skirmish match. It decides
//! who is in the session, hands out player ids, and relays player state and
//! gameplay events between the connected clients.
//!
//! ## Core Responsibilities
//!
//! ### Identity
//! Every client that asks to join gets a player id from a monotonic counter
//! starting at [`shared::FIRST_PLAYER_ID`]. Ids are never reused within a run,
//! so a late datagram about a departed player can never be attributed to a
//! newcomer.
//!
//! ### Relaying
//! The server does not simulate anything. Clients report their own state and
//! events; the server checks that the reported id belongs to the sending
//! address and forwards the message to everyone else. Hits are routed to the
//! victim only.
//!
//! ### Lifecycle
//! Peers leave by sending `CLIENT_DISCONNECT`, by being kicked from the host
//! console, or by going silent for longer than the peer timeout. In every case
//! the remaining peers receive `CLIENT_LEFT`.
//!
//! ### Playing Host
//! [`host::spawn_local_player`] runs an in-process client against the server
//! so the host plays in its own match. It joins first and gets the first id.
//!
//! ## Architecture Design
//!
//! ### Single Consumer
//! A receive task forwards raw datagrams over a channel to one loop
//! ([`network::Server::run`]) which is the only code that touches the
//! [`registry::SessionRegistry`]. Replies are queued on a second channel and
//! written by a sender task, so the registry itself is plain synchronous code.
//!
//! ### UDP Without Guarantees
//! Nothing is acknowledged or retransmitted. Messages apply in the order they
//! are received. The only recovery built into the protocol is the connect
//! request: the client driver repeats it on every heartbeat tick until it is
//! answered, and a repeat gets the existing id back.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::bind(ServerConfig::default()).await?;
//!
//!     // The handle drives the server from other tasks, e.g. a lobby UI
//!     let handle = server.handle();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//!         handle.start(1);
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod host;
pub mod network;
pub mod registry;
pub mod transport;

pub use error::RegistryError;
pub use host::spawn_local_player;
pub use network::{Server, ServerCommand, ServerConfig, ServerHandle};
pub use registry::{Outgoing, PeerInfo, SessionRegistry};
