//! Wire protocol for Lobbyist.
//!
//! This crate knows how the lobby server lays out bytes and nothing about
//! connections or session state:
//!
//! - **Codec** ([`MessageWriter`], [`MessageReader`]): little-endian
//!   primitives, packed integers, length-prefixed text, nested messages.
//! - **Types** ([`ProtocolVersion`], [`GameOptions`], [`JoinResult`], ...):
//!   the values carried in those bytes.
//! - **Messages** ([`encode_handshake`], [`encode_create_game`],
//!   [`decode_tag`], [`decode_joined_game`], [`decode_redirect`]): the
//!   payloads a lobby client sends and the inbound messages it reads.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (datagrams) → Protocol (tagged messages) → Session (state)
//! ```
//!
//! Every decoder is a pure function over a borrowed cursor; none of them
//! touch session state.

mod codec;
mod error;
mod game_code;
mod messages;
mod types;

pub use codec::{MessageReader, MessageWriter, MAX_MESSAGE_BODY};
pub use error::ProtocolError;
pub use game_code::GameCode;
pub use messages::{
    ACKNOWLEDGEMENT_TAG, CreateGameRequest, GAME_OPTIONS_VERSION, HandshakePayload,
    MAX_DISPLAY_NAME_LEN, TaggedMessage, decode_game_options, decode_joined_game,
    decode_redirect, decode_tag, encode_create_game, encode_game_options,
    encode_handshake,
};
pub use types::{
    ChatMode, CrossplayFlags, FilterOptions, GameOptions, GameplaySettings, JoinResult, Language,
    MapType, MessageTag, ProtocolVersion, RedirectTarget,
};
