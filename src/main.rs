//! Parley: QUIC chat relay with presence
//!
//! Usage:
//!   parley server [--bind 0.0.0.0:5000] [--max-conn 1000]
//!   parley client --name alice [--server 127.0.0.1:5000]
//!
//! Client mode reads lines from stdin and sends each as a chat message.
//! `/quit` or end of input goes offline and exits.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use parley::{ClientConfig, ClientEvent, RelayClient, RelayConfig, RelayServer, render_line};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "parley", version, about = "QUIC chat relay with presence")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay
    Server(ServerArgs),
    /// Join a relay and chat from stdin
    Client(ClientArgs),
}

#[derive(Args)]
struct ServerArgs {
    /// Listen address
    #[arg(long, default_value = "0.0.0.0:5000")]
    bind: SocketAddr,

    /// Online connections above which new ones are refused
    #[arg(long = "max-conn", default_value_t = 1000)]
    max_connections: usize,

    /// Idle timeout in seconds
    #[arg(long, default_value_t = 300)]
    idle_timeout: u64,
}

#[derive(Args)]
struct ClientArgs {
    /// Identity shown to other users
    #[arg(long, short)]
    name: String,

    /// Relay address
    #[arg(long, default_value = "127.0.0.1:5000")]
    server: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so client output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Server(args) => run_server(args).await,
        Command::Client(args) => run_client(args).await,
    }
}

async fn run_server(args: ServerArgs) -> anyhow::Result<()> {
    let config = RelayConfig {
        bind_addr: args.bind,
        max_connections: args.max_connections,
        idle_timeout: Duration::from_secs(args.idle_timeout),
        ..RelayConfig::default()
    };

    info!("Configuration:");
    info!("  Bind address: {}", config.bind_addr);
    info!("  Max connections: {}", config.max_connections);
    info!("  Idle timeout: {:?}", config.idle_timeout);

    let server = RelayServer::bind(config).context("failed to start relay")?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Relay error: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            server.shutdown();
        }
    }

    Ok(())
}

async fn run_client(args: ClientArgs) -> anyhow::Result<()> {
    let config = ClientConfig {
        server_addr: args.server,
        ..ClientConfig::default()
    };

    let mut client = RelayClient::new(config);
    let mut events = client
        .connect(args.name)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    client.join().await?;

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::Connected { connection_id, .. } => {
                    info!("Connected (connection {})", connection_id);
                }
                ClientEvent::Message(message) => println!("{}", render_line(&message)),
                ClientEvent::Error(e) => error!("[{}] {}", e.code(), e.message()),
                ClientEvent::Disconnected(reason) => {
                    info!("Disconnected: {}", reason);
                    break;
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim() == "/quit" => break,
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => client.send_text(line).await?,
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.leave().await?;
    printer.abort();
    Ok(())
}
