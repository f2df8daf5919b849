//! Error types for the realtime multiplexer.

use thiserror::Error;

/// Main error type for transport and payload operations.
///
/// Connection failures are handled inside the registry (logged, retried);
/// this type exists for transport implementations and wire parsing, not for
/// the `subscribe`/`unsubscribe` surface.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("channel {channel} rejected: {reason}")]
    ChannelRejected { channel: String, reason: String },

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl From<serde_json::Error> for RealtimeError {
    fn from(e: serde_json::Error) -> Self {
        RealtimeError::Deserialization(e.to_string())
    }
}

/// Result type for multiplexer operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;
