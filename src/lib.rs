//! Room coordinator for short timed multiplayer mini-games.
//!
//! One host and any number of players share a room over WebSockets. The
//! host starts a memory-matching round, scores flow through broadcasts, and
//! a per-room countdown ends the round.

pub mod cards;
pub mod config;
pub mod error;
pub mod registry;
pub mod room;
pub mod server;
pub mod types;

pub use error::{ConfigError, RoomError};
pub use registry::Registry;
pub use room::{ClientSender, ConnId, Outbound, RoomHandle};
