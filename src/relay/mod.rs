//! Relay core: who is online, and getting every message to them
//!
//! - [`registry`]: the one shared, lock-guarded set of online connections
//! - [`presence`]: per-connection receive loop and presence state machine
//! - [`broadcast`]: snapshot fan-out with the failure cascade

pub mod broadcast;
pub mod presence;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use broadcast::{BroadcastEngine, BroadcastReport, MessageClock};
pub use presence::{PresenceRouter, RouterState};
pub use registry::{Connection, ConnectionHandle, ConnectionId, ConnectionRegistry};
