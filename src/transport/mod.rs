//! Transport seams for the relay core
//!
//! The relay only needs two capabilities from a client channel: push an
//! outbound message, and pull the next inbound item. Everything else about the
//! channel (QUIC streams, TLS, the identity handshake) stays behind these
//! traits.
//!
//! - [`quic`]: framed QUIC streams used by the server and client
//! - [`memory`]: in-process channels for embedding and tests

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::messages::{InboundItem, RelayMessage};

pub mod memory;
pub mod quic;

pub use memory::{ChannelSink, ChannelSource};
pub use quic::{FramedReader, QuicSink, QuicSource, write_frame};

/// Send half of a live client channel.
///
/// An `Err` from [`deliver`](MessageSink::deliver) means the channel is closed
/// or broken. The broadcast engine treats it as a disconnect.
#[async_trait]
pub trait MessageSink: Send + Sync + 'static {
    async fn deliver(&self, message: &RelayMessage) -> Result<()>;

    /// Signal closure of the channel. Later deliveries fail.
    fn close(&self);
}

/// Receive half of a client channel.
#[async_trait]
pub trait ItemSource: Send {
    /// `Ok(None)` on graceful end-of-stream; `Err` on transport failure.
    async fn next_item(&mut self) -> Result<Option<InboundItem>>;
}
