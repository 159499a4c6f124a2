//! Error types for the protocol layer.
//!
//! Each crate in Lobbyist defines its own error enum. A `ProtocolError`
//! always means the bytes (or the values about to become bytes) are wrong,
//! never that the network is.

/// Errors that can occur while encoding or decoding wire payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The caller asked for something the server would reject, such as an
    /// impostor count that does not fit the lobby size.
    ///
    /// Raised before any bytes are produced.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// A payload ended before a field could be read.
    #[error("truncated message: needed {needed} bytes, {remaining} remaining")]
    TruncatedMessage { needed: usize, remaining: usize },

    /// The bytes were long enough but do not form a valid value
    /// (bad UTF-8, an overlong packed integer, an unknown enum value).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
