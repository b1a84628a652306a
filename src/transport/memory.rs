//! In-process channel transport
//!
//! Backs a client channel with tokio mpsc queues. Used to embed the relay in
//! another process and to drive it from tests without sockets.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{RelayError, Result};
use crate::protocol::messages::{InboundItem, RelayMessage};
use crate::transport::{ItemSource, MessageSink};

/// Outbound half: delivers into an unbounded queue
#[derive(Debug)]
pub struct ChannelSink {
    tx: Mutex<Option<mpsc::UnboundedSender<RelayMessage>>>,
}

impl ChannelSink {
    /// Create a sink and the receiver the client reads from
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<RelayMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn deliver(&self, message: &RelayMessage) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .map_err(|_| RelayError::internal("Channel sink lock poisoned"))?;

        match tx.as_ref() {
            Some(tx) => tx
                .send(message.clone())
                .map_err(|_| RelayError::delivery("Receiver dropped")),
            None => Err(RelayError::delivery("Channel closed")),
        }
    }

    fn close(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }
}

/// Inbound half: yields items until every sender is dropped
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<InboundItem>,
}

impl ChannelSource {
    /// Create a source and the sender the client writes to
    pub fn pair() -> (mpsc::UnboundedSender<InboundItem>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

#[async_trait]
impl ItemSource for ChannelSource {
    async fn next_item(&mut self) -> Result<Option<InboundItem>> {
        Ok(self.rx.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::Status;

    #[tokio::test]
    async fn test_sink_fails_after_close() {
        let (sink, mut rx) = ChannelSink::pair();
        let msg = RelayMessage::presence(1, "alice", Status::Online);

        sink.deliver(&msg).await.unwrap();
        assert_eq!(rx.recv().await, Some(msg.clone()));

        sink.close();
        assert!(sink.deliver(&msg).await.is_err());
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_sink_fails_when_receiver_dropped() {
        let (sink, rx) = ChannelSink::pair();
        drop(rx);

        let msg = RelayMessage::presence(1, "alice", Status::Online);
        assert!(matches!(
            sink.deliver(&msg).await,
            Err(RelayError::Delivery(_))
        ));
    }

    #[tokio::test]
    async fn test_source_ends_when_sender_dropped() {
        let (tx, mut source) = ChannelSource::pair();
        tx.send(InboundItem::online()).unwrap();
        drop(tx);

        assert_eq!(source.next_item().await.unwrap(), Some(InboundItem::online()));
        assert_eq!(source.next_item().await.unwrap(), None);
    }
}
