//! Protocol layer for the relay
//!
//! This module provides:
//! - Binary frame encoding/decoding
//! - Message type definitions
//! - Codec traits for serialization

pub mod codec;
pub mod frame;
pub mod messages;

pub use codec::{Decodable, DecodedMessage, Encodable, encode};
pub use frame::{Frame, FrameCodec, FrameType};
pub use messages::*;
