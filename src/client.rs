//! QUIC relay client
//!
//! Connects, performs the Hello/HelloAck handshake, and then reads relayed
//! messages on a background task, surfacing them as [`ClientEvent`]s.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use quinn::{ClientConfig as QuinnClientConfig, Connection, Endpoint, SendStream, TransportConfig};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::error::{RelayError, Result};
use crate::protocol::codec::DecodedMessage;
use crate::protocol::messages::{Hello, HelloAck, InboundItem, RelayMessage, Status};
use crate::server::ALPN;
use crate::transport::{FramedReader, write_frame};

/// Client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Relay address to connect to
    pub server_addr: SocketAddr,
    /// Client bind address (use 0.0.0.0:0 for auto)
    pub bind_addr: SocketAddr,
    /// Connect and handshake timeout
    pub connect_timeout: Duration,
    /// Keep-alive interval, keeps quiet sessions under the relay idle timeout
    pub keep_alive: Duration,
    /// Maximum frame payload accepted from the relay
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            connect_timeout: Duration::from_secs(10),
            keep_alive: Duration::from_secs(30),
            max_message_size: 64 * 1024,
        }
    }
}

/// Events that the client can receive
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Handshake completed
    Connected { connection_id: u64, session_id: String },
    /// A relayed message
    Message(RelayMessage),
    /// The relay stream ended or the connection was lost
    Disconnected(String),
    /// A frame could not be understood; the stream keeps going
    Error(RelayError),
}

/// QUIC relay client
pub struct RelayClient {
    config: ClientConfig,
    identity: Option<String>,
    endpoint: Option<Endpoint>,
    connection: Option<Connection>,
    send: Option<SendStream>,
}

impl RelayClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            identity: None,
            endpoint: None,
            connection: None,
            send: None,
        }
    }

    /// Connect and handshake under `identity`.
    ///
    /// The identity is not online yet; call [`join`](Self::join) for that.
    pub async fn connect(
        &mut self,
        identity: impl Into<String>,
    ) -> Result<mpsc::UnboundedReceiver<ClientEvent>> {
        let identity = identity.into();
        info!("Connecting to relay at {}", self.config.server_addr);

        let mut endpoint = Endpoint::client(self.config.bind_addr)
            .map_err(|e| RelayError::network(format!("Failed to create endpoint: {}", e)))?;
        endpoint.set_default_client_config(self.configure_client()?);
        self.endpoint = Some(endpoint.clone());

        let connecting = endpoint
            .connect(self.config.server_addr, "localhost")
            .map_err(|e| RelayError::connection(format!("Failed to initiate connection: {}", e)))?;

        let connection = timeout(self.config.connect_timeout, connecting)
            .await
            .map_err(|_| RelayError::timeout("Connection timeout"))??;

        let (mut send, recv) = connection.open_bi().await?;
        let mut reader = FramedReader::new(recv, self.config.max_message_size);

        write_frame(&mut send, &Hello::new(identity.clone())).await?;
        let ack = timeout(self.config.connect_timeout, read_ack(&mut reader))
            .await
            .map_err(|_| RelayError::timeout("Handshake timeout"))??;

        info!(
            "Connected as {} (connection {}, session {})",
            identity, ack.connection_id, ack.session_id
        );

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let _ = event_tx.send(ClientEvent::Connected {
            connection_id: ack.connection_id,
            session_id: ack.session_id,
        });
        tokio::spawn(receive_messages(reader, event_tx));

        self.identity = Some(identity);
        self.connection = Some(connection);
        self.send = Some(send);

        Ok(event_rx)
    }

    /// Configure the QUIC client
    fn configure_client(&self) -> Result<QuinnClientConfig> {
        // The relay uses a throwaway self-signed certificate, so any certificate is accepted
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut crypto = rustls::ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS13])
            .map_err(|e| RelayError::config(format!("Failed to configure TLS: {}", e)))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth();

        crypto.alpn_protocols = vec![ALPN.to_vec()];

        let mut transport = TransportConfig::default();
        transport.keep_alive_interval(Some(self.config.keep_alive));

        let mut config = QuinnClientConfig::new(Arc::new(
            quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
                .map_err(|e| RelayError::config(format!("Failed to create QUIC config: {}", e)))?,
        ));
        config.transport_config(Arc::new(transport));
        Ok(config)
    }

    /// Announce this identity as online
    pub async fn join(&mut self) -> Result<()> {
        self.send_item(&InboundItem::online()).await
    }

    /// Send a chat line
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.send_item(&InboundItem::text(text)).await
    }

    /// Send an automated line, rendered differently by receivers
    pub async fn send_auto_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.send_item(&InboundItem::auto_text(text)).await
    }

    /// Go offline gracefully and wait for the relay to close the connection
    pub async fn leave(&mut self) -> Result<()> {
        self.send_item(&InboundItem::offline()).await?;
        self.finish_stream();

        if let Some(connection) = &self.connection {
            if timeout(self.config.connect_timeout, connection.closed())
                .await
                .is_err()
            {
                debug!("Relay did not close the connection after Offline");
            }
        }

        self.disconnect().await
    }

    /// End the outbound stream without sending Offline.
    ///
    /// The relay treats this like a vanished peer: the next broadcast that
    /// fails to reach this client announces it offline.
    pub fn finish_stream(&mut self) {
        if let Some(mut send) = self.send.take() {
            if let Err(e) = send.finish() {
                debug!("Could not finish stream: {}", e);
            }
        }
    }

    /// Drop the connection without announcing anything
    pub async fn disconnect(&mut self) -> Result<()> {
        self.send = None;

        if let Some(connection) = self.connection.take() {
            connection.close(0u32.into(), b"Client disconnect");
            info!("Disconnected from relay");
        }

        if let Some(endpoint) = self.endpoint.take() {
            endpoint.close(0u32.into(), b"Client shutdown");
        }

        self.identity = None;
        Ok(())
    }

    async fn send_item(&mut self, item: &InboundItem) -> Result<()> {
        let send = self
            .send
            .as_mut()
            .ok_or_else(|| RelayError::connection("Not connected to relay"))?;
        write_frame(send, item).await?;
        debug!("Sent {:?}", item.status);
        Ok(())
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Check if connected to the relay
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

async fn read_ack(reader: &mut FramedReader) -> Result<HelloAck> {
    let frame = reader
        .next_frame()
        .await?
        .ok_or_else(|| RelayError::handshake("Relay closed the stream during handshake"))?;

    match DecodedMessage::decode(&frame) {
        Ok(DecodedMessage::HelloAck(ack)) => Ok(ack),
        Ok(DecodedMessage::Error(e)) => Err(RelayError::handshake(e.message)),
        Ok(other) => Err(RelayError::protocol(format!(
            "Expected HelloAck, got {:?}",
            other.frame_type()
        ))),
        Err(e) => Err(RelayError::serialization(format!("Invalid HelloAck: {}", e))),
    }
}

async fn receive_messages(mut reader: FramedReader, event_tx: mpsc::UnboundedSender<ClientEvent>) {
    loop {
        let frame = match reader.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                let _ = event_tx.send(ClientEvent::Disconnected("Relay finished the stream".into()));
                break;
            }
            Err(e) => {
                let _ = event_tx.send(ClientEvent::Disconnected(format!("Connection lost: {}", e)));
                break;
            }
        };

        let event = match DecodedMessage::decode(&frame) {
            Ok(DecodedMessage::Message(message)) => ClientEvent::Message(message),
            Ok(DecodedMessage::Error(e)) => {
                ClientEvent::Error(RelayError::protocol(format!("Relay error {}: {}", e.code, e.message)))
            }
            Ok(other) => ClientEvent::Error(RelayError::protocol(format!(
                "Unexpected {:?} frame",
                other.frame_type()
            ))),
            Err(e) => {
                error!("Failed to parse message: {}", e);
                ClientEvent::Error(RelayError::serialization(format!("Failed to parse message: {}", e)))
            }
        };

        if event_tx.send(event).is_err() {
            break;
        }
    }
}

/// Render a relayed message as one terminal line
pub fn render_line(message: &RelayMessage) -> String {
    let when = i64::try_from(message.timestamp)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| message.timestamp.to_string());

    let body = match message.status {
        Status::Online => "[online now]".to_string(),
        Status::Offline => "[offline now]".to_string(),
        Status::Text => message.text.clone().unwrap_or_default(),
        Status::AutoText => format!("~ {}", message.text.as_deref().unwrap_or_default()),
    };

    format!("{} ({}): {}", when, message.from, body)
}

/// Certificate verifier that accepts any certificate (INSECURE - development only)
#[derive(Debug)]
struct AcceptAnyCertificate;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
