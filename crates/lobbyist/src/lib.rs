//! # Lobbyist
//!
//! Minimal lobby client for Hazel-style game servers.
//!
//! A session connects with a handshake, asks the server to host a game,
//! then reacts to inbound messages until the server places it in a lobby,
//! the transport goes away, or a send fails. The layers are split into
//! crates and re-exported here:
//!
//! ```text
//! lobbyist-transport (datagrams) → lobbyist-protocol (messages) → lobbyist-session (state)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lobbyist::prelude::*;
//!
//! # async fn demo() -> Result<(), LobbyError> {
//! let client = LobbyClient::new(ClientConfig::default());
//! let outcome = client
//!     .host_game_at("127.0.0.1:22023".parse().unwrap(), &GameOptions::new(4, 2), &FilterOptions::default())
//!     .await?;
//! if let Some(joined) = outcome.join_result() {
//!     println!("hosting {}", joined.game_code);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;

pub use client::{LobbyClient, run};
pub use config::ClientConfig;
pub use error::LobbyError;

pub use lobbyist_protocol as protocol;
pub use lobbyist_session as session;
pub use lobbyist_transport as transport;

/// Commonly used types.
pub mod prelude {
    pub use crate::{ClientConfig, LobbyClient, LobbyError, run};
    pub use lobbyist_protocol::{
        ChatMode, CrossplayFlags, FilterOptions, GameCode, GameOptions, GameplaySettings, JoinResult, Language,
        MapType, ProtocolVersion,
    };
    pub use lobbyist_session::{SessionOutcome, SessionState};
    pub use lobbyist_transport::{Connection, UdpConfig, UdpConnection};
}
