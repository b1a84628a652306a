//! Binary frame protocol with length-prefixed messages
//!
//! Frame format:
//! ```text
//! +---------+---------------+-----------+
//! | type    | length        | payload   |
//! | (1 byte)| (4 bytes, BE) | (JSON)    |
//! +---------+---------------+-----------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::{self, Cursor};

/// Frame header size: 1 byte type + 4 bytes length
pub const FRAME_HEADER_SIZE: usize = 5;

/// Hard upper bound on a frame payload (1 MB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Frame types carried on a relay stream
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    // Handshake (0x00 - 0x0F)
    Hello = 0x00,
    HelloAck = 0x01,

    // Client -> relay (0x10 - 0x2F)
    Item = 0x10,

    // Relay -> client (0x30 - 0x4F)
    Message = 0x30,

    Error = 0xFF,
}

impl FrameType {
    /// Convert from u8, returns None for unknown types
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(FrameType::Hello),
            0x01 => Some(FrameType::HelloAck),
            0x10 => Some(FrameType::Item),
            0x30 => Some(FrameType::Message),
            0xFF => Some(FrameType::Error),
            _ => None,
        }
    }
}

/// A single protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(frame_type: FrameType, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            payload: payload.into(),
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.frame_type as u8);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
    }

    /// Header plus payload, ready to write
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Ok(None) until `buf` holds a whole frame
    fn decode(buf: &mut BytesMut, max_payload: usize) -> io::Result<Option<Frame>> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Peek at the header without consuming
        let mut cursor = Cursor::new(&buf[..]);
        let frame_type_byte = cursor.get_u8();
        let payload_len = cursor.get_u32() as usize;

        let frame_type = FrameType::from_u8(frame_type_byte).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unknown frame type: 0x{:02X}", frame_type_byte),
            )
        })?;

        if payload_len > max_payload {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Frame payload too large: {} bytes (max: {})",
                    payload_len, max_payload
                ),
            ));
        }

        let total_size = FRAME_HEADER_SIZE + payload_len;
        if buf.len() < total_size {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        let payload = buf.split_to(payload_len).freeze();

        Ok(Some(Frame {
            frame_type,
            payload,
        }))
    }
}

/// Streaming frame decoder with a per-stream payload limit
#[derive(Debug)]
pub struct FrameCodec {
    buffer: BytesMut,
    max_payload: usize,
}

impl FrameCodec {
    /// Create a codec that rejects payloads above `max_payload` bytes
    pub fn with_limit(max_payload: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_payload: max_payload.min(MAX_FRAME_SIZE),
        }
    }

    /// Feed data into the codec
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame
    pub fn decode_next(&mut self) -> io::Result<Option<Frame>> {
        Frame::decode(&mut self.buffer, self.max_payload)
    }

    /// Bytes received but not yet decoded
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_codec_partial_feed() {
        let mut codec = FrameCodec::with_limit(MAX_FRAME_SIZE);

        let first = Frame::new(FrameType::Item, br#"{"status":"Online"}"#.to_vec());
        let second = Frame::new(FrameType::Item, br#"{"status":"Offline"}"#.to_vec());

        let mut data = BytesMut::new();
        first.encode(&mut data);
        second.encode(&mut data);

        // Not even a complete header yet
        codec.feed(&data[..3]);
        assert!(codec.decode_next().unwrap().is_none());

        codec.feed(&data[3..]);
        assert_eq!(codec.decode_next().unwrap(), Some(first));
        assert_eq!(codec.decode_next().unwrap(), Some(second));
        assert!(codec.decode_next().unwrap().is_none());
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_unknown_frame_type_rejected() {
        let mut codec = FrameCodec::with_limit(MAX_FRAME_SIZE);
        let mut data = BytesMut::new();
        data.put_u8(0x42);
        data.put_u32(0);
        codec.feed(&data);

        assert!(codec.decode_next().is_err());
    }

    #[test]
    fn test_payload_limit_enforced() {
        let mut codec = FrameCodec::with_limit(16);
        let frame = Frame::new(FrameType::Item, vec![b'x'; 17]);
        codec.feed(&frame.encode_to_bytes());

        assert!(codec.decode_next().is_err());
    }
}
