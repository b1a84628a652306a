//! Per-connection presence router
//!
//! Drains one connection's inbound items and turns them into registry
//! transitions and broadcasts:
//!
//! ```text
//! Unregistered --Online--> Online --Offline--> Closed
//!       |                                        ^
//!       +----------------Offline-----------------+
//! ```
//!
//! Content items (`Text`, `AutoText`) are relayed in any non-terminal state.
//! End of stream or a receive error stops the loop without announcing
//! anything; a peer that vanished is discovered by the next broadcast that
//! fails to reach it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::messages::{InboundItem, RelayMessage, Status};
use crate::relay::broadcast::{BroadcastEngine, BroadcastReport};
use crate::relay::registry::ConnectionHandle;
use crate::transport::{ItemSource, MessageSink};

/// Router state for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Unregistered,
    Online,
    /// Terminal; reached after an explicit `Offline`
    Closed,
}

pub struct PresenceRouter<S> {
    identity: String,
    handle: ConnectionHandle<S>,
    engine: Arc<BroadcastEngine<S>>,
    state: RouterState,
}

impl<S: MessageSink> PresenceRouter<S> {
    pub fn new(
        identity: impl Into<String>,
        handle: ConnectionHandle<S>,
        engine: Arc<BroadcastEngine<S>>,
    ) -> Self {
        Self {
            identity: identity.into(),
            handle,
            engine,
            state: RouterState::Unregistered,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn handle(&self) -> &ConnectionHandle<S> {
        &self.handle
    }

    pub fn state(&self) -> RouterState {
        self.state
    }

    /// Receive loop. Returns `Ok` on explicit `Offline` or end of stream, and the
    /// transport error if receiving fails.
    pub async fn run<R: ItemSource>(&mut self, mut source: R) -> Result<()> {
        while self.state != RouterState::Closed {
            match source.next_item().await? {
                Some(item) => {
                    self.handle_item(item).await;
                }
                None => {
                    debug!("{} ({}) finished its stream", self.identity, self.handle.id());
                    break;
                }
            }
        }
        Ok(())
    }

    /// Apply one inbound item. Returns the broadcast it triggered, if any.
    pub async fn handle_item(&mut self, item: InboundItem) -> Option<BroadcastReport<S>> {
        if self.state == RouterState::Closed {
            warn!("{} sent {:?} after going offline", self.identity, item.status);
            return None;
        }

        match item.status {
            Status::Online => self.go_online().await,
            Status::Offline => self.go_offline().await,
            Status::Text | Status::AutoText => self.relay_content(item).await,
        }
    }

    async fn go_online(&mut self) -> Option<BroadcastReport<S>> {
        let registry = self.engine.registry();
        if !registry.register(self.identity.as_str(), &self.handle).await {
            debug!("{} is already online", self.identity);
            return None;
        }

        self.state = RouterState::Online;
        info!("{} is online ({})", self.identity, self.handle.id());

        let notice =
            RelayMessage::presence(self.engine.clock().now(), self.identity.as_str(), Status::Online);
        Some(self.engine.broadcast(&notice, None).await)
    }

    async fn go_offline(&mut self) -> Option<BroadcastReport<S>> {
        self.state = RouterState::Closed;

        let registry = self.engine.registry();
        if !registry.unregister(self.handle.id()).await {
            debug!("{} went offline without being online", self.identity);
            return None;
        }

        info!("{} is offline ({})", self.identity, self.handle.id());

        let notice =
            RelayMessage::presence(self.engine.clock().now(), self.identity.as_str(), Status::Offline);
        Some(self.engine.broadcast(&notice, None).await)
    }

    async fn relay_content(&mut self, item: InboundItem) -> Option<BroadcastReport<S>> {
        let Some(text) = item.text else {
            warn!("{} sent {:?} without text, ignoring", self.identity, item.status);
            return None;
        };

        debug!("{} ({:?}): {}", self.identity, item.status, text);

        let message = RelayMessage::content(
            self.engine.clock().now(),
            self.identity.as_str(),
            text,
            item.status,
        );
        // Content is not echoed back to its sender
        Some(self.engine.broadcast(&message, Some(self.handle.id())).await)
    }
}
