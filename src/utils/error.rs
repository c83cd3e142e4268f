//! The `error` module defines the error type shared by every `tagsub` component.
//!
//! Only unknown tags and protocol violations terminate an RPC call on purpose;
//! the remaining variants wrap failures from the transport, serialization and
//! configuration layers so they can be propagated with `?`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(Debug, Error)]
pub enum BrokerError {
    /// A tag name outside the fixed enumeration.
    #[error("unknown tag '{name}'")]
    UnknownTag { name: String },

    /// A frame that is valid JSON but not valid at this point of the call.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The broker answered a call with an error frame.
    #[error("broker rejected the call: {0}")]
    Rejected(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl BrokerError {
    #[inline]
    pub fn unknown_tag(name: impl Into<String>) -> Self {
        Self::UnknownTag { name: name.into() }
    }

    #[inline]
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tag_error() {
        let err = BrokerError::unknown_tag("FEATURE");
        assert!(err.to_string().contains("FEATURE"));
        assert!(err.to_string().contains("unknown tag"));
    }

    #[test]
    fn test_protocol_error() {
        let err = BrokerError::protocol("expected a call frame");
        assert_eq!(err.to_string(), "protocol error: expected a call frame");
    }
}
