//! End-to-end relay tests over loopback QUIC

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parley::{
    ClientConfig, ClientEvent, RelayClient, RelayConfig, RelayError, RelayMessage, RelayServer,
    Status,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn start_relay() -> (Arc<RelayServer>, SocketAddr) {
    let config = RelayConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..RelayConfig::default()
    };
    let server = Arc::new(RelayServer::bind(config).unwrap());
    let addr = server.local_addr().unwrap();

    let runner = Arc::clone(&server);
    tokio::spawn(async move { runner.run().await });

    (server, addr)
}

async fn connect(addr: SocketAddr, name: &str) -> (RelayClient, UnboundedReceiver<ClientEvent>) {
    let mut client = RelayClient::new(ClientConfig {
        server_addr: addr,
        ..ClientConfig::default()
    });
    let mut events = client.connect(name).await.unwrap();

    match timeout(WAIT, events.recv()).await.unwrap() {
        Some(ClientEvent::Connected { .. }) => {}
        other => panic!("expected Connected, got {:?}", other),
    }

    (client, events)
}

async fn next_message(events: &mut UnboundedReceiver<ClientEvent>) -> RelayMessage {
    loop {
        match timeout(WAIT, events.recv()).await.unwrap() {
            Some(ClientEvent::Message(message)) => return message,
            Some(ClientEvent::Error(e)) => panic!("client error: {}", e),
            Some(ClientEvent::Disconnected(reason)) => panic!("disconnected: {}", reason),
            Some(ClientEvent::Connected { .. }) => continue,
            None => panic!("event channel closed"),
        }
    }
}

#[tokio::test]
async fn test_join_chat_and_leave() {
    let (server, addr) = start_relay().await;

    let (mut alice, mut alice_events) = connect(addr, "alice").await;
    alice.join().await.unwrap();
    let online = next_message(&mut alice_events).await;
    assert_eq!((online.status, online.from.as_str()), (Status::Online, "alice"));

    let (mut bob, mut bob_events) = connect(addr, "bob").await;
    bob.join().await.unwrap();
    let seen_by_alice = next_message(&mut alice_events).await;
    assert_eq!((seen_by_alice.status, seen_by_alice.from.as_str()), (Status::Online, "bob"));
    let seen_by_bob = next_message(&mut bob_events).await;
    assert_eq!((seen_by_bob.status, seen_by_bob.from.as_str()), (Status::Online, "bob"));

    alice.send_text("hi bob").await.unwrap();
    let text = next_message(&mut bob_events).await;
    assert_eq!(text.status, Status::Text);
    assert_eq!(text.from, "alice");
    assert_eq!(text.text.as_deref(), Some("hi bob"));
    assert!(text.timestamp >= seen_by_bob.timestamp);

    alice.send_auto_text("away").await.unwrap();
    let auto = next_message(&mut bob_events).await;
    assert_eq!(auto.status, Status::AutoText);
    assert_eq!(auto.text.as_deref(), Some("away"));

    bob.leave().await.unwrap();
    let offline = next_message(&mut alice_events).await;
    assert_eq!((offline.status, offline.from.as_str()), (Status::Offline, "bob"));
    assert!(offline.text.is_none());

    assert_eq!(server.stats().await.online, vec!["alice"]);

    alice.disconnect().await.unwrap();
    server.shutdown();
}

#[tokio::test]
async fn test_vanished_peer_announced_offline() {
    let (server, addr) = start_relay().await;

    let (mut alice, mut alice_events) = connect(addr, "alice").await;
    alice.join().await.unwrap();
    next_message(&mut alice_events).await;

    let (mut bob, _bob_events) = connect(addr, "bob").await;
    bob.join().await.unwrap();
    let joined = next_message(&mut alice_events).await;
    assert_eq!(joined.from, "bob");

    // No Offline: the relay only learns when a delivery to bob fails
    bob.disconnect().await.unwrap();

    let mut announced = None;
    for _ in 0..50 {
        alice.send_text("ping").await.unwrap();
        if let Ok(Some(ClientEvent::Message(message))) =
            timeout(Duration::from_millis(100), alice_events.recv()).await
        {
            announced = Some(message);
            break;
        }
    }

    let announced = announced.expect("bob was never announced offline");
    assert_eq!((announced.status, announced.from.as_str()), (Status::Offline, "bob"));
    assert_eq!(server.stats().await.online, vec!["alice"]);

    alice.disconnect().await.unwrap();
    server.shutdown();
}

#[tokio::test]
async fn test_finished_stream_announced_offline() {
    let (server, addr) = start_relay().await;

    let (mut alice, mut alice_events) = connect(addr, "alice").await;
    alice.join().await.unwrap();
    next_message(&mut alice_events).await;

    let (mut bob, _bob_events) = connect(addr, "bob").await;
    bob.join().await.unwrap();
    let joined = next_message(&mut alice_events).await;
    assert_eq!(joined.from, "bob");

    // Clean end of stream, but no Offline
    bob.finish_stream();

    let mut announced = None;
    for _ in 0..50 {
        alice.send_text("still there?").await.unwrap();
        if let Ok(Some(ClientEvent::Message(message))) =
            timeout(Duration::from_millis(100), alice_events.recv()).await
        {
            announced = Some(message);
            break;
        }
    }

    let announced = announced.expect("bob was never announced offline");
    assert_eq!((announced.status, announced.from.as_str()), (Status::Offline, "bob"));
    assert_eq!(server.stats().await.online, vec!["alice"]);

    alice.disconnect().await.unwrap();
    bob.disconnect().await.unwrap();
    server.shutdown();
}

#[tokio::test]
async fn test_blank_identity_rejected() {
    let (server, addr) = start_relay().await;

    let mut client = RelayClient::new(ClientConfig {
        server_addr: addr,
        ..ClientConfig::default()
    });
    let err = client.connect("   ").await.unwrap_err();
    assert!(
        matches!(
            err,
            RelayError::Handshake(_)
                | RelayError::Connection(_)
                | RelayError::Network(_)
                | RelayError::Delivery(_)
        ),
        "unexpected error: {:?}",
        err
    );

    assert_eq!(server.stats().await.online_count(), 0);
    server.shutdown();
}
