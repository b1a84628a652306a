//! Recording sink for relay tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{RelayError, Result};
use crate::protocol::messages::{RelayMessage, Status};
use crate::transport::MessageSink;

#[derive(Debug, Clone, Copy)]
enum Mode {
    Healthy,
    Broken,
    FailsOn(Status),
}

#[derive(Debug)]
struct Inner {
    mode: Mode,
    closed: bool,
    received: Vec<RelayMessage>,
}

/// Sink that records what it was sent. Clones share state.
#[derive(Debug, Clone)]
pub(crate) struct TestSink {
    inner: Arc<Mutex<Inner>>,
}

impl TestSink {
    fn with_mode(mode: Mode) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                mode,
                closed: false,
                received: Vec::new(),
            })),
        }
    }

    pub(crate) fn new() -> Self {
        Self::with_mode(Mode::Healthy)
    }

    /// Every delivery fails
    pub(crate) fn broken() -> Self {
        Self::with_mode(Mode::Broken)
    }

    /// Deliveries fail from the first message with `status` onwards
    pub(crate) fn fails_on(status: Status) -> Self {
        Self::with_mode(Mode::FailsOn(status))
    }

    /// Break the channel as a dropped peer would
    pub(crate) fn disconnect(&self) {
        self.inner.lock().unwrap().mode = Mode::Broken;
    }

    pub(crate) fn received(&self) -> Vec<RelayMessage> {
        self.inner.lock().unwrap().received.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

#[async_trait]
impl MessageSink for TestSink {
    async fn deliver(&self, message: &RelayMessage) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.mode {
            Mode::Broken => return Err(RelayError::delivery("peer gone")),
            Mode::FailsOn(status) if status == message.status => {
                inner.mode = Mode::Broken;
                return Err(RelayError::delivery("peer gone"));
            }
            _ if inner.closed => return Err(RelayError::delivery("closed")),
            _ => {}
        }
        inner.received.push(message.clone());
        Ok(())
    }

    fn close(&self) {
        self.inner.lock().unwrap().closed = true;
    }
}
