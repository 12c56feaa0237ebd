//! Error types for the transport layer.

use std::io;

/// Errors that can occur while framing, encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer closed the stream before a complete line arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred while reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A line exceeded the configured maximum length.
    #[error("message size exceeds maximum allowed {max}")]
    MessageTooLarge {
        /// The maximum allowed line length in bytes.
        max: usize,
    },

    /// The line was not a valid message.
    #[error("malformed message {line:?}: {source}")]
    Decode {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    /// Failed to serialize the outgoing message to JSON.
    #[error("JSON serialization failed: {0}")]
    Encode(#[source] serde_json::Error),
}

impl TransportError {
    /// Whether the stream can still be used after this error
    ///
    /// A malformed line is consumed in full, so the next line can be read.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::Decode { .. })
    }
}
