//! Error handling for the relay

use std::fmt;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay error types
#[derive(Debug, Clone)]
pub enum RelayError {
    /// Network-related errors (reads, writes, sockets)
    Network(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// Identity handshake errors
    Handshake(String),
    /// Protocol errors (unexpected or oversized frames)
    Protocol(String),
    /// Connection establishment or teardown errors
    Connection(String),
    /// Delivery to a peer failed
    Delivery(String),
    /// Configuration error
    Config(String),
    /// Timeout error
    Timeout(String),
    /// Resource limit exceeded
    ResourceLimit(String),
    /// Relay internal error
    Internal(String),
}

impl RelayError {
    /// Get error code for this error type
    pub fn code(&self) -> u32 {
        match self {
            RelayError::Network(_) => 1000,
            RelayError::Serialization(_) => 1001,
            RelayError::Handshake(_) => 1002,
            RelayError::Protocol(_) => 1003,
            RelayError::Connection(_) => 1004,
            RelayError::Delivery(_) => 1005,
            RelayError::Config(_) => 1010,
            RelayError::Timeout(_) => 1011,
            RelayError::ResourceLimit(_) => 1012,
            RelayError::Internal(_) => 1009,
        }
    }

    /// Get human-readable error message
    pub fn message(&self) -> &str {
        match self {
            RelayError::Network(msg)
            | RelayError::Serialization(msg)
            | RelayError::Handshake(msg)
            | RelayError::Protocol(msg)
            | RelayError::Connection(msg)
            | RelayError::Delivery(msg)
            | RelayError::Config(msg)
            | RelayError::Timeout(msg)
            | RelayError::ResourceLimit(msg)
            | RelayError::Internal(msg) => msg,
        }
    }

    pub fn network<T: Into<String>>(msg: T) -> Self {
        RelayError::Network(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        RelayError::Serialization(msg.into())
    }

    pub fn handshake<T: Into<String>>(msg: T) -> Self {
        RelayError::Handshake(msg.into())
    }

    pub fn protocol<T: Into<String>>(msg: T) -> Self {
        RelayError::Protocol(msg.into())
    }

    pub fn connection<T: Into<String>>(msg: T) -> Self {
        RelayError::Connection(msg.into())
    }

    pub fn delivery<T: Into<String>>(msg: T) -> Self {
        RelayError::Delivery(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        RelayError::Config(msg.into())
    }

    pub fn timeout<T: Into<String>>(msg: T) -> Self {
        RelayError::Timeout(msg.into())
    }

    pub fn resource_limit<T: Into<String>>(msg: T) -> Self {
        RelayError::ResourceLimit(msg.into())
    }

    pub fn internal<T: Into<String>>(msg: T) -> Self {
        RelayError::Internal(msg.into())
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Network(msg) => write!(f, "Network error: {}", msg),
            RelayError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            RelayError::Handshake(msg) => write!(f, "Handshake error: {}", msg),
            RelayError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            RelayError::Connection(msg) => write!(f, "Connection error: {}", msg),
            RelayError::Delivery(msg) => write!(f, "Delivery failed: {}", msg),
            RelayError::Config(msg) => write!(f, "Configuration error: {}", msg),
            RelayError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            RelayError::ResourceLimit(msg) => write!(f, "Resource limit exceeded: {}", msg),
            RelayError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Network(format!("IO error: {}", err))
    }
}

impl From<quinn::ConnectError> for RelayError {
    fn from(err: quinn::ConnectError) -> Self {
        RelayError::Connection(format!("QUIC connect error: {}", err))
    }
}

impl From<quinn::ConnectionError> for RelayError {
    fn from(err: quinn::ConnectionError) -> Self {
        RelayError::Connection(format!("QUIC connection error: {}", err))
    }
}

impl From<quinn::ReadError> for RelayError {
    fn from(err: quinn::ReadError) -> Self {
        RelayError::Network(format!("QUIC read error: {}", err))
    }
}

impl From<quinn::WriteError> for RelayError {
    fn from(err: quinn::WriteError) -> Self {
        RelayError::Delivery(format!("QUIC write error: {}", err))
    }
}

impl From<quinn::ClosedStream> for RelayError {
    fn from(err: quinn::ClosedStream) -> Self {
        RelayError::Connection(format!("Stream closed: {}", err))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Serialization(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_messages() {
        let err = RelayError::handshake("empty identity");
        assert_eq!(err.code(), 1002);
        assert_eq!(err.message(), "empty identity");
        assert_eq!(err.to_string(), "Handshake error: empty identity");
    }

    #[test]
    fn test_io_error_is_network() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: RelayError = io.into();
        assert!(matches!(err, RelayError::Network(_)));
    }
}
