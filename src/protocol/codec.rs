//! Codec for encoding/decoding protocol messages to/from frames
//!
//! This module provides the bridge between typed messages and binary frames.

use super::frame::{Frame, FrameType};
use super::messages::*;
use bytes::Bytes;
use std::io::{self, Error as IoError, ErrorKind};

/// Trait for messages that can be encoded to frames
pub trait Encodable {
    /// Get the frame type for this message
    fn frame_type(&self) -> FrameType;

    /// Encode the message payload to bytes
    fn encode_payload(&self) -> io::Result<Bytes>;

    /// Encode the complete frame
    fn encode_frame(&self) -> io::Result<Frame> {
        Ok(Frame::new(self.frame_type(), self.encode_payload()?))
    }
}

/// Trait for messages that can be decoded from frames
pub trait Decodable: Sized {
    /// Expected frame type for this message
    fn expected_frame_type() -> FrameType;

    /// Decode the message from a payload
    fn decode_payload(payload: &[u8]) -> io::Result<Self>;

    /// Decode from a complete frame, validating the frame type
    fn decode_frame(frame: &Frame) -> io::Result<Self> {
        if frame.frame_type != Self::expected_frame_type() {
            return Err(IoError::new(
                ErrorKind::InvalidData,
                format!(
                    "Expected frame type {:?}, got {:?}",
                    Self::expected_frame_type(),
                    frame.frame_type
                ),
            ));
        }
        Self::decode_payload(&frame.payload)
    }
}

macro_rules! impl_codec {
    ($type:ty, $frame_type:expr) => {
        impl Encodable for $type {
            fn frame_type(&self) -> FrameType {
                $frame_type
            }

            fn encode_payload(&self) -> io::Result<Bytes> {
                serde_json::to_vec(self)
                    .map(Bytes::from)
                    .map_err(|e| IoError::new(ErrorKind::InvalidData, e))
            }
        }

        impl Decodable for $type {
            fn expected_frame_type() -> FrameType {
                $frame_type
            }

            fn decode_payload(payload: &[u8]) -> io::Result<Self> {
                serde_json::from_slice(payload).map_err(|e| IoError::new(ErrorKind::InvalidData, e))
            }
        }
    };
}

impl_codec!(Hello, FrameType::Hello);
impl_codec!(HelloAck, FrameType::HelloAck);
impl_codec!(InboundItem, FrameType::Item);
impl_codec!(RelayMessage, FrameType::Message);
impl_codec!(Error, FrameType::Error);

/// Any frame decoded into its typed payload
#[derive(Debug, Clone)]
pub enum DecodedMessage {
    Hello(Hello),
    HelloAck(HelloAck),
    Item(InboundItem),
    Message(RelayMessage),
    Error(Error),
}

impl DecodedMessage {
    /// Decode a frame into a typed message
    pub fn decode(frame: &Frame) -> io::Result<Self> {
        let payload = &frame.payload;

        match frame.frame_type {
            FrameType::Hello => Ok(Self::Hello(serde_json::from_slice(payload)?)),
            FrameType::HelloAck => Ok(Self::HelloAck(serde_json::from_slice(payload)?)),
            FrameType::Item => Ok(Self::Item(serde_json::from_slice(payload)?)),
            FrameType::Message => Ok(Self::Message(serde_json::from_slice(payload)?)),
            FrameType::Error => Ok(Self::Error(serde_json::from_slice(payload)?)),
        }
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::Hello(_) => FrameType::Hello,
            Self::HelloAck(_) => FrameType::HelloAck,
            Self::Item(_) => FrameType::Item,
            Self::Message(_) => FrameType::Message,
            Self::Error(_) => FrameType::Error,
        }
    }
}

/// Encode a message directly to wire bytes
pub fn encode<T: Encodable>(msg: &T) -> io::Result<Bytes> {
    msg.encode_frame().map(|f| f.encode_to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::{FrameCodec, MAX_FRAME_SIZE};

    #[test]
    fn test_item_through_frame_codec() {
        let item = InboundItem::text("hi");
        let bytes = encode(&item).unwrap();

        let mut codec = FrameCodec::with_limit(MAX_FRAME_SIZE);
        codec.feed(&bytes);
        let frame = codec.decode_next().unwrap().unwrap();

        assert_eq!(frame.frame_type, FrameType::Item);
        let decoded = InboundItem::decode_frame(&frame).unwrap();
        assert_eq!(decoded, item);
    }

    #[test]
    fn test_decoded_message_dispatch() {
        let hello = Hello::new("alice");
        let frame = hello.encode_frame().unwrap();

        match DecodedMessage::decode(&frame).unwrap() {
            DecodedMessage::Hello(h) => {
                assert_eq!(h.identity, "alice");
                assert_eq!(h.version, PROTOCOL_VERSION);
            }
            other => panic!("Expected Hello, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_frame_type() {
        let frame = InboundItem::online().encode_frame().unwrap();
        assert!(RelayMessage::decode_frame(&frame).is_err());
    }
}
