//! Unified error type for the Lobbyist client.

use lobbyist_protocol::ProtocolError;
use lobbyist_session::SessionError;
use lobbyist_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// A transport-level error (connect, send).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (invalid options, malformed payload).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (step taken out of order, session over).
    #[error(transparent)]
    Session(#[from] SessionError),
}
