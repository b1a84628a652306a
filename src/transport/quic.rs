//! Framed QUIC streams
//!
//! Each client uses one bidirectional stream. Frames are decoded with
//! [`FrameCodec`] from whatever chunk sizes the stream yields.

use async_trait::async_trait;
use quinn::{Connection, RecvStream, SendStream};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::protocol::codec::{Decodable, DecodedMessage, Encodable, encode};
use crate::protocol::frame::{Frame, FrameCodec};
use crate::protocol::messages::{InboundItem, RelayMessage};
use crate::transport::{ItemSource, MessageSink};

const READ_CHUNK_SIZE: usize = 4096;

/// Reads whole frames off a QUIC receive stream
pub struct FramedReader {
    recv: RecvStream,
    codec: FrameCodec,
    buf: Vec<u8>,
}

impl FramedReader {
    pub fn new(recv: RecvStream, max_payload: usize) -> Self {
        Self {
            recv,
            codec: FrameCodec::with_limit(max_payload),
            buf: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    /// Next complete frame, or `None` once the peer finished the stream
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let decoded = self
                .codec
                .decode_next()
                .map_err(|e| RelayError::protocol(format!("Frame decode error: {}", e)))?;
            if let Some(frame) = decoded {
                return Ok(Some(frame));
            }

            match self.recv.read(&mut self.buf).await? {
                Some(n) => self.codec.feed(&self.buf[..n]),
                None if self.codec.buffered_len() > 0 => {
                    return Err(RelayError::protocol("Stream finished mid-frame"));
                }
                None => return Ok(None),
            }
        }
    }

    /// Next frame decoded as `T`; any other frame type is a protocol error
    pub async fn next_message<T: Decodable>(&mut self) -> Result<Option<T>> {
        match self.next_frame().await? {
            Some(frame) => T::decode_frame(&frame)
                .map(Some)
                .map_err(|e| RelayError::protocol(e.to_string())),
            None => Ok(None),
        }
    }
}

/// Encode and write a single frame
pub async fn write_frame<T: Encodable>(send: &mut SendStream, msg: &T) -> Result<()> {
    let bytes = encode(msg).map_err(|e| RelayError::serialization(e.to_string()))?;
    send.write_all(&bytes).await?;
    Ok(())
}

/// Relay-side send half of a client stream
pub struct QuicSink {
    connection: Connection,
    send: Mutex<SendStream>,
}

impl QuicSink {
    pub fn new(connection: Connection, send: SendStream) -> Self {
        Self {
            connection,
            send: Mutex::new(send),
        }
    }

    pub fn remote_address(&self) -> std::net::SocketAddr {
        self.connection.remote_address()
    }

    /// Write any frame to the client, serialized with other writers
    pub async fn send_frame<T: Encodable + Sync>(&self, msg: &T) -> Result<()> {
        if let Some(reason) = self.connection.close_reason() {
            return Err(RelayError::delivery(format!("Connection closed: {}", reason)));
        }
        let mut send = self.send.lock().await;
        write_frame(&mut send, msg).await
    }
}

#[async_trait]
impl MessageSink for QuicSink {
    async fn deliver(&self, message: &RelayMessage) -> Result<()> {
        self.send_frame(message).await
    }

    fn close(&self) {
        debug!("Closing connection to {}", self.connection.remote_address());
        self.connection.close(0u32.into(), b"closed");
    }
}

/// Relay-side receive half of a client stream
pub struct QuicSource {
    reader: FramedReader,
}

impl QuicSource {
    pub fn new(reader: FramedReader) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl ItemSource for QuicSource {
    async fn next_item(&mut self) -> Result<Option<InboundItem>> {
        let Some(frame) = self.reader.next_frame().await? else {
            return Ok(None);
        };

        match DecodedMessage::decode(&frame) {
            Ok(DecodedMessage::Item(item)) => Ok(Some(item)),
            Ok(other) => Err(RelayError::protocol(format!(
                "Unexpected {:?} frame after handshake",
                other.frame_type()
            ))),
            Err(e) => Err(RelayError::serialization(format!("Invalid item: {}", e))),
        }
    }
}
