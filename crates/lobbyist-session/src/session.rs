//! Session types: the phases a lobby session moves through and the outcome
//! it reports.

use std::fmt;

use lobbyist_protocol::JoinResult;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The current phase of a lobby session.
///
/// Transitions only ever move forward:
///
/// ```text
///   Connecting → HandshakeSent → AwaitingHost → Joined
///        │              │              │
///        └──────────────┴──────────────┴──→ Disconnected | Failed
/// ```
///
/// - **Connecting**: the transport has not confirmed the hello yet.
/// - **HandshakeSent**: the server acknowledged the handshake.
/// - **AwaitingHost**: the host-game request is out; waiting for the lobby.
/// - **Joined**: the server placed us in a lobby. Terminal.
/// - **Disconnected**: the transport went away. Terminal.
/// - **Failed**: connect or send failed locally. Terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Connecting,
    HandshakeSent,
    AwaitingHost,
    Joined,
    Disconnected,
    Failed,
}

impl SessionState {
    /// Returns `true` once no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Joined | Self::Disconnected | Self::Failed)
    }

    /// The next step on the success path, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Connecting => Some(Self::HandshakeSent),
            Self::HandshakeSent => Some(Self::AwaitingHost),
            Self::AwaitingHost => Some(Self::Joined),
            Self::Joined | Self::Disconnected | Self::Failed => None,
        }
    }

    /// Returns `true` if moving to `target` follows the lifecycle.
    ///
    /// Failure states are reachable from every non-terminal state; the
    /// success path must be walked one step at a time.
    pub fn can_transition_to(self, target: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match target {
            Self::Disconnected | Self::Failed => true,
            _ => self.next() == Some(target),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::HandshakeSent => write!(f, "HandshakeSent"),
            Self::AwaitingHost => write!(f, "AwaitingHost"),
            Self::Joined => write!(f, "Joined"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionOutcome
// ---------------------------------------------------------------------------

/// How a session ended. Produced exactly once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The server placed us in a lobby.
    Joined(JoinResult),

    /// The transport reported a disconnect before we joined.
    Disconnected { reason: String },

    /// Connecting or sending failed, or the caller gave up waiting.
    Failed { reason: String },
}

impl SessionOutcome {
    /// The state a session is left in after producing this outcome.
    pub fn state(&self) -> SessionState {
        match self {
            Self::Joined(_) => SessionState::Joined,
            Self::Disconnected { .. } => SessionState::Disconnected,
            Self::Failed { .. } => SessionState::Failed,
        }
    }

    pub fn is_joined(&self) -> bool {
        matches!(self, Self::Joined(_))
    }

    /// The join details, if the session succeeded.
    pub fn join_result(&self) -> Option<&JoinResult> {
        match self {
            Self::Joined(result) => Some(result),
            _ => None,
        }
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Joined(result) => write!(f, "joined {result}"),
            Self::Disconnected { reason } => write!(f, "disconnected: {reason}"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}
