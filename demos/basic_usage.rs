//! Basic usage: the relay core over in-process channels
//!
//! Three users join, chat, and one of them vanishes without saying goodbye.
//! The next broadcast notices and announces it offline.
//!
//! Run with: cargo run --example basic_usage

use std::sync::Arc;

use parley::relay::{BroadcastEngine, ConnectionRegistry, PresenceRouter};
use parley::transport::{ChannelSink, ChannelSource};
use parley::{InboundItem, RelayMessage, render_line};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

struct DemoUser {
    name: &'static str,
    items: mpsc::UnboundedSender<InboundItem>,
    inbox: mpsc::UnboundedReceiver<RelayMessage>,
    router: JoinHandle<()>,
}

impl DemoUser {
    fn connect(engine: &Arc<BroadcastEngine<ChannelSink>>, name: &'static str) -> Self {
        let (sink, inbox) = ChannelSink::pair();
        let (items, source) = ChannelSource::pair();

        let handle = engine.registry().issue_handle(sink);
        let mut router = PresenceRouter::new(name, handle, Arc::clone(engine));
        let router = tokio::spawn(async move {
            let _ = router.run(source).await;
        });

        Self { name, items, inbox, router }
    }

    fn send(&self, item: InboundItem) {
        let _ = self.items.send(item);
    }

    fn print_inbox(&mut self) {
        while let Ok(message) = self.inbox.try_recv() {
            println!("[{}] {}", self.name, render_line(&message));
        }
    }
}

async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let registry = Arc::new(ConnectionRegistry::new());
    let engine = Arc::new(BroadcastEngine::new(Arc::clone(&registry)));

    let mut alice = DemoUser::connect(&engine, "alice");
    let mut bob = DemoUser::connect(&engine, "bob");
    let mut carol = DemoUser::connect(&engine, "carol");

    for user in [&alice, &bob, &carol] {
        user.send(InboundItem::online());
        settle().await;
    }

    alice.send(InboundItem::text("hi all"));
    carol.send(InboundItem::auto_text("carol is typing"));
    settle().await;

    info!("Online: {:?}", registry.identities().await);
    for user in [&mut alice, &mut bob, &mut carol] {
        user.print_inbox();
    }

    // bob's process dies: its receiver goes away without an Offline
    let DemoUser { inbox, router, .. } = bob;
    drop(inbox);
    router.abort();

    carol.send(InboundItem::text("bob?"));
    settle().await;
    info!("Online after failed delivery: {:?}", registry.identities().await);

    alice.send(InboundItem::offline());
    settle().await;
    info!("Online after alice left: {:?}", registry.identities().await);

    for user in [&mut alice, &mut carol] {
        user.print_inbox();
    }

    Ok(())
}
