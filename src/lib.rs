//! QUIC chat relay with presence tracking
//!
//! Clients open one long-lived stream, introduce themselves with an identity,
//! and from then on every item they send is fanned out to all other online
//! clients. The relay tracks who is online and, when a delivery fails,
//! removes the dead peer and tells everyone else it went offline.

pub mod client;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod transport;

pub use client::{ClientConfig, ClientEvent, RelayClient, render_line};
pub use error::{RelayError, Result};
pub use protocol::messages::{InboundItem, RelayMessage, Status};
pub use relay::{
    BroadcastEngine, BroadcastReport, ConnectionId, ConnectionRegistry, PresenceRouter,
    RouterState,
};
pub use server::{RelayServer, RelayStats};

use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds since UNIX epoch
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Relay configuration
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Listen address
    pub bind_addr: SocketAddr,
    /// Online connections above which new channels are refused
    pub max_connections: usize,
    /// QUIC idle timeout
    pub idle_timeout: Duration,
    /// Time a new channel gets to send its Hello
    pub handshake_timeout: Duration,
    /// Maximum frame payload accepted from a client
    pub max_message_size: usize,
    /// Maximum identity length in characters
    pub max_identity_len: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            handshake_timeout: Duration::from_secs(10),
            max_message_size: 64 * 1024,
            max_identity_len: 50,
        }
    }
}
