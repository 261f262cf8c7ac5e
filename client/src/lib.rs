//! # Session Client Library
//!
//! This library provides the client half of a skirmish match. It joins a
//! server over UDP, learns its own player id, and keeps a local view of every
//! player the server announces so the game can render and react to them.
//!
//! ## Architecture Overview
//!
//! The client keeps no authority of its own. The local game simulates the
//! local player and reports its state; everything known about other players
//! comes from messages relayed by the server.
//!
//! ### Connection Lifecycle
//! A session starts `Disconnected`, sends `CLIENT_REQUEST_CONNECT` and moves
//! to `Connecting`. `CLIENT_ACCEPTED` assigns the local id and completes the
//! join; `CLIENT_REJECTED` or an unreachable server puts it back to
//! `Disconnected`.
//!
//! ### Echo Suppression
//! Once the match has started the local simulation owns the local player, so
//! state updates that name the local id are ignored. Collision and attack
//! messages about the local player are always ignored because the game has
//! already applied them.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! The connection state machine, the local player registry and the
//! [`session::SessionHooks`] trait the game implements to receive level loads,
//! collisions, attacks and hits.
//!
//! ### Transport Module (`transport`)
//! A connected UDP socket plus a receive task that forwards datagrams to the
//! session through a channel.
//!
//! ### Network Module (`network`)
//! The driver loop that feeds transport events into the session, sends
//! heartbeats while connected and repeats the connect request until it is
//! answered.
//!
//! ### Hooks Module (`hooks`)
//! [`hooks::LoggingHooks`], a stand-in game that logs every callback.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use client::session::{ClientConfig, SessionHooks};
//!
//! struct Game;
//!
//! impl SessionHooks for Game {
//!     type Object = u32;
//!
//!     fn object_at(&self, _tile_x: i32, _tile_y: i32) -> Option<u32> {
//!         None
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new(Game, ClientConfig::default());
//!     let server = "127.0.0.1:8080".parse()?;
//!
//!     client
//!         .run(server, async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod hooks;
pub mod network;
pub mod session;
pub mod transport;

pub use error::SessionError;
pub use hooks::LoggingHooks;
pub use network::Client;
pub use session::{ClientConfig, ClientPlayer, ClientSession, ConnectionState, SessionHooks};
pub use transport::{ClientSender, ClientTransport, TransportEvent, TransportEventKind};
