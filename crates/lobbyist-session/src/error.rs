//! Error types for the session layer.

use crate::SessionState;

/// Errors raised by [`SessionMachine`](crate::SessionMachine) operations.
///
/// None of these end a session on their own. The dispatcher logs them and
/// carries on; the connection session treats them as a reason to stop
/// driving the exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The session already reached `Joined`, `Disconnected` or `Failed`.
    #[error("session already ended in state {0}")]
    AlreadyTerminated(SessionState),

    /// The requested step is not the next one in the lifecycle, e.g.
    /// marking the host-game request sent before the handshake.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition { from: SessionState, to: SessionState },
}
