//! Lobby session management for Lobbyist.
//!
//! This crate owns the client side of a lobby session once bytes have been
//! framed by the transport:
//!
//! 1. **State**: which phase the session is in ([`SessionState`]) and how
//!    it ended ([`SessionOutcome`])
//! 2. **Transitions**: applying handshake/request milestones, inbound
//!    messages, and disconnects in order ([`SessionMachine`])
//! 3. **Dispatch**: turning raw inbound buffers into [`InboundMessage`]s
//!    without letting one bad message end the session ([`Dispatcher`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Client Layer (above)  ← drives connect/send, waits on the Completion
//!     ↕
//! Session Layer (this crate)  ← state machine and dispatch
//!     ↕
//! Protocol Layer (below)  ← tag and payload decoding
//! ```

mod dispatcher;
mod error;
mod machine;
mod session;

pub use dispatcher::{Dispatch, Dispatcher, InboundMessage};
pub use error::SessionError;
pub use machine::{Completion, SessionMachine};
pub use session::{SessionOutcome, SessionState};
