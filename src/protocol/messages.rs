//! Protocol message types for the relay
//!
//! All payloads carried inside frames. JSON via serde.

use serde::{Deserialize, Serialize};

/// Current wire protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Kind of an inbound item or outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Online,
    Offline,
    /// Content typed by a person
    Text,
    /// Content produced by a chatter generator; routed exactly like `Text`
    AutoText,
}

// =============================================================================
// Handshake
// =============================================================================

/// First frame on a new stream. Carries the asserted identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    pub version: u32,
    pub identity: String,
}

impl Hello {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            identity: identity.into(),
        }
    }
}

/// Relay response to Hello
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloAck {
    pub version: u32,
    /// Registry-issued connection id
    pub connection_id: u64,
    pub session_id: String,
}

// =============================================================================
// Items and messages
// =============================================================================

/// Client -> relay item. Identity is not repeated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub status: Status,
}

impl InboundItem {
    pub fn online() -> Self {
        Self {
            text: None,
            status: Status::Online,
        }
    }

    pub fn offline() -> Self {
        Self {
            text: None,
            status: Status::Offline,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            status: Status::Text,
        }
    }

    pub fn auto_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            status: Status::AutoText,
        }
    }
}

/// Relay -> client message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    /// Milliseconds since UNIX epoch, assigned by the relay
    pub timestamp: u64,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub status: Status,
}

impl RelayMessage {
    /// Presence notice (`Online` or `Offline`) attributed to `from`
    pub fn presence(timestamp: u64, from: impl Into<String>, status: Status) -> Self {
        Self {
            timestamp,
            from: from.into(),
            text: None,
            status,
        }
    }

    /// Content message stamped by the relay
    pub fn content(
        timestamp: u64,
        from: impl Into<String>,
        text: impl Into<String>,
        status: Status,
    ) -> Self {
        Self {
            timestamp,
            from: from.into(),
            text: Some(text.into()),
            status,
        }
    }
}

/// Error payload sent before the relay closes a stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub code: u32,
    pub message: String,
}

impl Error {
    pub const UNKNOWN: u32 = 0;
    pub const INVALID_FRAME: u32 = 1;
    pub const INVALID_IDENTITY: u32 = 2;
    pub const UNSUPPORTED_VERSION: u32 = 3;
    pub const SERVER_FULL: u32 = 4;

    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_identity(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_IDENTITY, message)
    }

    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_FRAME, message)
    }
}
