//! QUIC relay server
//!
//! Accepts connections, runs the Hello/HelloAck handshake on the client's
//! single bidirectional stream, then hands the stream to a [`PresenceRouter`]
//! on its own task. All routers share one [`BroadcastEngine`].

use std::net::SocketAddr;
use std::sync::Arc;

use quinn::{Endpoint, IdleTimeout, Incoming, SendStream, TransportConfig};
use rcgen::CertifiedKey;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::RelayConfig;
use crate::error::{RelayError, Result};
use crate::protocol::messages::{Error as WireError, Hello, HelloAck, PROTOCOL_VERSION};
use crate::relay::{BroadcastEngine, ConnectionRegistry, PresenceRouter, RouterState};
use crate::transport::{FramedReader, MessageSink, QuicSink, QuicSource, write_frame};

/// ALPN protocol identifier shared by relay and client
pub const ALPN: &[u8] = b"parley";

/// State shared by the accept loop and every connection task
struct RelayState {
    config: RelayConfig,
    engine: Arc<BroadcastEngine<QuicSink>>,
}

impl RelayState {
    fn registry(&self) -> &Arc<ConnectionRegistry<QuicSink>> {
        self.engine.registry()
    }
}

/// QUIC chat relay
pub struct RelayServer {
    state: Arc<RelayState>,
    endpoint: Endpoint,
}

impl RelayServer {
    /// Bind the relay endpoint. Must be called from within a tokio runtime.
    pub fn bind(config: RelayConfig) -> Result<Self> {
        let server_config = configure_server(&config)?;

        let endpoint = Endpoint::server(server_config, config.bind_addr)
            .map_err(|e| RelayError::network(format!("Failed to create endpoint: {}", e)))?;

        info!("Relay listening on {}", endpoint.local_addr()?);

        let registry = Arc::new(ConnectionRegistry::new());
        let engine = Arc::new(BroadcastEngine::new(registry));

        Ok(Self {
            state: Arc::new(RelayState { config, engine }),
            endpoint,
        })
    }

    /// Address the endpoint actually bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Accept connections until the endpoint is closed
    pub async fn run(&self) -> Result<()> {
        while let Some(incoming) = self.endpoint.accept().await {
            let online = self.state.registry().len().await;
            if online >= self.state.config.max_connections {
                let limit = RelayError::resource_limit(format!(
                    "{} connections online (max {})",
                    online, self.state.config.max_connections
                ));
                warn!("Refusing {}: {}", incoming.remote_address(), limit);
                incoming.refuse();
                continue;
            }

            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if let Err(e) = handle_incoming(state, incoming).await {
                    error!("Connection handling failed [{}]: {}", e.code(), e.message());
                }
            });
        }

        warn!("Endpoint stopped accepting connections");
        Ok(())
    }

    /// Current relay statistics
    pub async fn stats(&self) -> RelayStats {
        RelayStats {
            online: self.state.registry().identities().await,
            bind_address: self.state.config.bind_addr,
            max_connections: self.state.config.max_connections,
        }
    }

    /// Close the endpoint; `run` returns once pending accepts drain
    pub fn shutdown(&self) {
        self.endpoint.close(0u32.into(), b"Relay shutdown");
        info!("Relay shutdown completed");
    }
}

/// Relay statistics
#[derive(Debug, Clone)]
pub struct RelayStats {
    /// Online identities in connection order
    pub online: Vec<String>,
    pub bind_address: SocketAddr,
    pub max_connections: usize,
}

impl RelayStats {
    pub fn online_count(&self) -> usize {
        self.online.len()
    }
}

/// Build the QUIC server config with a fresh self-signed certificate
fn configure_server(config: &RelayConfig) -> Result<quinn::ServerConfig> {
    let CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .map_err(|e| RelayError::config(format!("Failed to generate certificate: {}", e)))?;

    let cert_der = cert.der().clone();
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut tls = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| RelayError::config(format!("Failed to configure TLS: {}", e)))?
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der)
        .map_err(|e| RelayError::config(format!("Failed to configure TLS: {}", e)))?;

    tls.alpn_protocols = vec![ALPN.to_vec()];
    tls.max_early_data_size = 0;

    let idle: IdleTimeout = config
        .idle_timeout
        .try_into()
        .map_err(|_| RelayError::config("Idle timeout out of range"))?;

    let mut transport = TransportConfig::default();
    transport.max_idle_timeout(Some(idle));
    // One chat stream per client
    transport.max_concurrent_bidi_streams(1u32.into());
    transport.max_concurrent_uni_streams(0u32.into());

    let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(tls)
        .map_err(|e| RelayError::config(format!("Failed to create QUIC config: {}", e)))?;

    let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(crypto));
    server_config.transport_config(Arc::new(transport));
    Ok(server_config)
}

/// Trim and check a client-supplied identity
pub fn validate_identity(raw: &str, max_len: usize) -> std::result::Result<String, WireError> {
    let identity = raw.trim();
    if identity.is_empty() {
        return Err(WireError::invalid_identity("Identity must not be empty"));
    }
    if identity.chars().count() > max_len {
        return Err(WireError::invalid_identity(format!(
            "Identity longer than {} characters",
            max_len
        )));
    }
    Ok(identity.to_string())
}

async fn read_hello(
    reader: &mut FramedReader,
    config: &RelayConfig,
) -> std::result::Result<String, WireError> {
    let hello: Hello = match reader.next_message().await {
        Ok(Some(hello)) => hello,
        Ok(None) => return Err(WireError::invalid_frame("Stream finished before Hello")),
        Err(e) => return Err(WireError::invalid_frame(e.to_string())),
    };

    if hello.version != PROTOCOL_VERSION {
        return Err(WireError::new(
            WireError::UNSUPPORTED_VERSION,
            format!(
                "Unsupported protocol version {} (expected {})",
                hello.version, PROTOCOL_VERSION
            ),
        ));
    }

    validate_identity(&hello.identity, config.max_identity_len)
}

/// Tell the client why it was turned away, then close
async fn reject(connection: &quinn::Connection, send: &mut SendStream, reason: &WireError) {
    if let Err(e) = write_frame(send, reason).await {
        debug!("Could not send rejection: {}", e);
    }
    if let Err(e) = send.finish() {
        debug!("Could not finish rejected stream: {}", e);
    }
    connection.close(reason.code.into(), reason.message.as_bytes());
}

/// Handshake one connection and run its presence router to completion
async fn handle_incoming(state: Arc<RelayState>, incoming: Incoming) -> Result<()> {
    let connection = incoming.await?;
    let remote_addr = connection.remote_address();
    debug!("New connection from {}", remote_addr);

    let (mut send, recv) = connection.accept_bi().await?;
    let mut reader = FramedReader::new(recv, state.config.max_message_size);

    let hello = timeout(
        state.config.handshake_timeout,
        read_hello(&mut reader, &state.config),
    )
    .await
    .unwrap_or_else(|_| Err(WireError::new(WireError::UNKNOWN, "Handshake timed out")));

    let identity = match hello {
        Ok(identity) => identity,
        Err(reason) => {
            warn!("Rejected {}: {}", remote_addr, reason.message);
            reject(&connection, &mut send, &reason).await;
            return Err(RelayError::handshake(reason.message));
        }
    };

    let handle = state
        .registry()
        .issue_handle(QuicSink::new(connection.clone(), send));

    let ack = HelloAck {
        version: PROTOCOL_VERSION,
        connection_id: handle.id().as_u64(),
        session_id: Uuid::new_v4().to_string(),
    };
    handle.sink().send_frame(&ack).await?;
    info!("{} connected from {} as {}", identity, remote_addr, handle.id());

    let mut router = PresenceRouter::new(identity, handle, Arc::clone(&state.engine));
    let result = router.run(QuicSource::new(reader)).await;

    match (&result, router.state()) {
        (_, RouterState::Closed) => info!("{} left", router.identity()),
        (Ok(()), _) => debug!("{} finished its stream without going offline", router.identity()),
        (Err(_), _) => debug!("{} lost its stream", router.identity()),
    }
    // Registry entries of peers that never sent Offline are dropped by the next failed delivery
    router.handle().sink().close();

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config() -> RelayConfig {
        RelayConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..RelayConfig::default()
        }
    }

    #[test]
    fn test_validate_identity() {
        assert_eq!(validate_identity("  alice \n", 50).unwrap(), "alice");
        assert_eq!(validate_identity(&"x".repeat(50), 50).unwrap().len(), 50);

        let empty = validate_identity("   ", 50).unwrap_err();
        assert_eq!(empty.code, WireError::INVALID_IDENTITY);

        let long = validate_identity(&"x".repeat(51), 50).unwrap_err();
        assert_eq!(long.code, WireError::INVALID_IDENTITY);

        // Limit counts characters, not bytes
        assert!(validate_identity(&"é".repeat(50), 50).is_ok());
    }

    #[test]
    fn test_configure_server() {
        assert!(configure_server(&RelayConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_bind_and_stats() {
        let server = RelayServer::bind(loopback_config()).unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let stats = server.stats().await;
        assert_eq!(stats.online_count(), 0);
        assert_eq!(stats.max_connections, 1000);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_run_returns_after_shutdown() {
        let server = Arc::new(RelayServer::bind(loopback_config()).unwrap());
        let runner = Arc::clone(&server);
        let task = tokio::spawn(async move { runner.run().await });

        server.shutdown();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
