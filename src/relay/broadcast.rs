//! Broadcast engine
//!
//! Delivers one message to every registered connection. A failed delivery
//! removes the connection and, once the pass is over, fans out a synthetic
//! `Offline` notice for it. Notices can fail too; those failures cascade the
//! same way until a pass completes without removing anyone.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::current_timestamp;
use crate::protocol::messages::{RelayMessage, Status};
use crate::relay::registry::{Connection, ConnectionId, ConnectionRegistry};
use crate::transport::MessageSink;

/// Relay-assigned timestamps, never decreasing across messages
#[derive(Debug, Default)]
pub struct MessageClock {
    last: AtomicU64,
}

impl MessageClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time in ms, or the last issued value if the wall clock stepped back
    pub fn now(&self) -> u64 {
        let now = current_timestamp();
        let prev = self.last.fetch_max(now, Ordering::SeqCst);
        prev.max(now)
    }
}

/// Outcome of one [`BroadcastEngine::broadcast`] call
pub struct BroadcastReport<S> {
    /// Identities that received the original message, in snapshot order
    pub delivered: Vec<String>,
    /// Connections whose delivery failed in any pass
    pub failed: Vec<Connection<S>>,
    /// Synthetic `Offline` notices fanned out
    pub notices: usize,
    /// Primary pass plus cascade passes
    pub passes: usize,
}

impl<S> Default for BroadcastReport<S> {
    fn default() -> Self {
        Self {
            delivered: Vec::new(),
            failed: Vec::new(),
            notices: 0,
            passes: 0,
        }
    }
}

impl<S> BroadcastReport<S> {
    /// Identities of every connection dropped during the call
    pub fn failed_identities(&self) -> Vec<&str> {
        self.failed.iter().map(|c| c.identity.as_str()).collect()
    }
}

/// Fans messages out over a shared [`ConnectionRegistry`]
pub struct BroadcastEngine<S> {
    registry: Arc<ConnectionRegistry<S>>,
    clock: MessageClock,
}

impl<S: MessageSink> BroadcastEngine<S> {
    pub fn new(registry: Arc<ConnectionRegistry<S>>) -> Self {
        Self {
            registry,
            clock: MessageClock::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry<S>> {
        &self.registry
    }

    pub fn clock(&self) -> &MessageClock {
        &self.clock
    }

    /// Deliver `message` to every registered connection except `exclude`,
    /// then cascade `Offline` notices for every connection that failed.
    pub async fn broadcast(
        &self,
        message: &RelayMessage,
        exclude: Option<ConnectionId>,
    ) -> BroadcastReport<S> {
        let mut report = BroadcastReport::default();
        let mut lost = VecDeque::new();

        report.delivered = self
            .deliver_pass(message, exclude, &mut report.failed, &mut lost)
            .await;
        report.passes = 1;

        while let Some(identity) = lost.pop_front() {
            let notice = RelayMessage::presence(self.clock.now(), identity, Status::Offline);
            info!("{} went offline (delivery failed)", notice.from);

            self.deliver_pass(&notice, None, &mut report.failed, &mut lost)
                .await;
            report.notices += 1;
            report.passes += 1;
        }

        report
    }

    /// One pass over a fresh snapshot. Never stops early on a failure.
    ///
    /// Failed connections are appended to `failed`; the identities of those this
    /// pass actually removed from the registry are queued on `lost`.
    async fn deliver_pass(
        &self,
        message: &RelayMessage,
        exclude: Option<ConnectionId>,
        failed: &mut Vec<Connection<S>>,
        lost: &mut VecDeque<String>,
    ) -> Vec<String> {
        let snapshot = self.registry.snapshot().await;
        let mut delivered = Vec::with_capacity(snapshot.len());

        for conn in snapshot {
            if Some(conn.id()) == exclude {
                continue;
            }

            match conn.sink().deliver(message).await {
                Ok(()) => {
                    debug!("Delivered {:?} from {} to {}", message.status, message.from, conn.identity);
                    delivered.push(conn.identity.clone());
                }
                Err(e) => {
                    warn!("Delivery to {} ({}) failed: {}", conn.identity, conn.id(), e);
                    // A concurrent pass may have removed it already; only the remover announces it
                    if self.registry.unregister(conn.id()).await {
                        conn.sink().close();
                        lost.push_back(conn.identity.clone());
                    }
                    failed.push(conn);
                }
            }
        }

        delivered
    }
}
