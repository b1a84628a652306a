//! Connection registry
//!
//! Owns the set of connections that are currently online. All mutation and
//! snapshotting goes through one lock; delivery never happens while it is held.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

/// Registry-issued connection identifier, compared by value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A channel's id together with its send capability
pub struct ConnectionHandle<S> {
    id: ConnectionId,
    sink: Arc<S>,
}

impl<S> ConnectionHandle<S> {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }
}

impl<S> Clone for ConnectionHandle<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<S> fmt::Debug for ConnectionHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// A registered connection
pub struct Connection<S> {
    /// Identity asserted when the channel was opened
    pub identity: String,
    handle: ConnectionHandle<S>,
}

impl<S> Connection<S> {
    pub fn id(&self) -> ConnectionId {
        self.handle.id
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.handle.sink
    }
}

impl<S> Clone for Connection<S> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.handle.id)
            .field("identity", &self.identity)
            .finish()
    }
}

/// Online connections keyed by [`ConnectionId`]
pub struct ConnectionRegistry<S> {
    connections: Mutex<BTreeMap<ConnectionId, Connection<S>>>,
    next_id: AtomicU64,
}

impl<S> Default for ConnectionRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ConnectionRegistry<S> {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Issue a handle for a freshly opened channel. Ids increase monotonically.
    pub fn issue_handle(&self, sink: S) -> ConnectionHandle<S> {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        ConnectionHandle {
            id,
            sink: Arc::new(sink),
        }
    }

    /// Register a connection. Returns false if this handle is already registered.
    pub async fn register(&self, identity: impl Into<String>, handle: &ConnectionHandle<S>) -> bool {
        let mut connections = self.connections.lock().await;
        if connections.contains_key(&handle.id) {
            return false;
        }
        connections.insert(
            handle.id,
            Connection {
                identity: identity.into(),
                handle: handle.clone(),
            },
        );
        true
    }

    /// Remove a connection. Returns whether it was registered.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.lock().await;
        connections.remove(&id).is_some()
    }

    /// Copy of the online connections in id order, for delivery outside the lock
    pub async fn snapshot(&self) -> Vec<Connection<S>> {
        let connections = self.connections.lock().await;
        connections.values().cloned().collect()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        let connections = self.connections.lock().await;
        connections.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        let connections = self.connections.lock().await;
        connections.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Identities currently online, in id order
    pub async fn identities(&self) -> Vec<String> {
        let connections = self.connections.lock().await;
        connections.values().map(|c| c.identity.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let handle = registry.issue_handle(());

        assert!(registry.register("alice", &handle).await);
        assert!(!registry.register("alice", &handle).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_same_identity_on_two_channels() {
        let registry = ConnectionRegistry::new();
        let first = registry.issue_handle(());
        let second = registry.issue_handle(());

        assert!(registry.register("alice", &first).await);
        assert!(registry.register("alice", &second).await);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_unregister() {
        let registry = ConnectionRegistry::new();
        let handle = registry.issue_handle(());
        registry.register("alice", &handle).await;

        assert!(registry.unregister(handle.id()).await);
        assert!(!registry.unregister(handle.id()).await);
        assert!(registry.is_empty().await);
        assert!(!registry.contains(handle.id()).await);
    }

    #[tokio::test]
    async fn test_snapshot_in_issue_order() {
        let registry = ConnectionRegistry::new();
        let a = registry.issue_handle(());
        let b = registry.issue_handle(());
        let c = registry.issue_handle(());

        // Registration order differs from issue order
        registry.register("carol", &c).await;
        registry.register("alice", &a).await;
        registry.register("bob", &b).await;

        let snapshot = registry.snapshot().await;
        let ids: Vec<_> = snapshot.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id(), c.id()]);
        assert_eq!(registry.identities().await, vec!["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn test_snapshot_is_detached() {
        let registry = ConnectionRegistry::new();
        let a = registry.issue_handle(());
        registry.register("alice", &a).await;

        let snapshot = registry.snapshot().await;
        registry.unregister(a.id()).await;

        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_registration() {
        let registry = Arc::new(ConnectionRegistry::<()>::new());
        let mut tasks = Vec::new();

        for i in 0..32 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let handle = registry.issue_handle(());
                registry.register(format!("user{}", i), &handle).await
            }));
        }

        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(registry.len().await, 32);
    }
}
