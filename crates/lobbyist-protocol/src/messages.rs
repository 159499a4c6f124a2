//! The outbound payloads (handshake, host-game request) and the decoders
//! for the inbound messages the session reacts to.
//!
//! Encoders validate first and only then produce bytes, so an
//! [`InvalidOptions`](ProtocolError::InvalidOptions) error always means
//! nothing could have reached the wire.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use crate::codec::{MessageReader, MessageWriter};
use crate::types::{
    ChatMode, CrossplayFlags, FilterOptions, GameOptions, GameplaySettings,
    JoinResult, Language, MapType, MessageTag, ProtocolVersion, RedirectTarget,
};
use crate::{GameCode, ProtocolError};

/// Longest display name the server accepts, in characters.
pub const MAX_DISPLAY_NAME_LEN: usize = 10;

/// Tag of the nested message carrying platform-specific data.
const PLATFORM_DATA_TAG: u8 = 0;

/// Tag of the nested message carrying filter options.
const FILTER_OPTIONS_TAG: u8 = 0;

/// Layout version of the game-options block this client writes.
pub const GAME_OPTIONS_VERSION: u8 = 9;

/// Game mode byte for the classic mode, the only one this client hosts.
const GAME_MODE_NORMAL: u8 = 1;

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// The identity announcement carried by the transport's hello.
///
/// Layout:
///
/// ```text
/// [version: i32][name: text][last nonce: u32 = 0][language: u32]
/// [chat mode: u8][platform data: message tag 0][crossplay: i32][reserved: u8 = 0]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePayload {
    pub version: ProtocolVersion,
    pub display_name: String,
    pub language: Language,
    pub chat_mode: ChatMode,
    /// Body of the platform-data message. Empty unless a platform needs it.
    pub platform_data: Vec<u8>,
    pub crossplay: CrossplayFlags,
}

impl HandshakePayload {
    /// The last reliable nonce the client saw. Always zero for a fresh
    /// session.
    pub const LAST_NONCE_RECEIVED: u32 = 0;

    pub fn new(version: ProtocolVersion, display_name: impl Into<String>) -> Self {
        Self {
            version,
            display_name: display_name.into(),
            language: Language::default(),
            chat_mode: ChatMode::default(),
            platform_data: Vec::new(),
            crossplay: CrossplayFlags::default(),
        }
    }

    /// Encodes the handshake body.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidOptions`] if the display name is empty or
    /// longer than [`MAX_DISPLAY_NAME_LEN`] characters, or if the version
    /// does not pack into an `i32`.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let name_len = self.display_name.chars().count();
        if name_len == 0 || name_len > MAX_DISPLAY_NAME_LEN {
            return Err(ProtocolError::InvalidOptions(format!(
                "display name must be 1 to {MAX_DISPLAY_NAME_LEN} characters, got {name_len}"
            )));
        }

        let version = self.version.packed().ok_or_else(|| {
            ProtocolError::InvalidOptions(format!(
                "protocol version {} does not fit the wire format",
                self.version
            ))
        })?;

        let mut w = MessageWriter::new();
        w.write_i32(version);
        w.write_str(&self.display_name);
        w.write_u32(Self::LAST_NONCE_RECEIVED);
        w.write_u32(self.language.as_u32());
        w.write_u8(self.chat_mode.as_u8());
        w.start_message(PLATFORM_DATA_TAG);
        w.write_bytes(&self.platform_data);
        w.end_message()?;
        w.write_i32(self.crossplay.bits());
        w.write_u8(0);
        w.into_bytes()
    }
}

/// Builds and encodes a handshake with no platform data.
pub fn encode_handshake(
    version: ProtocolVersion,
    display_name: &str,
    language: Language,
    chat_mode: ChatMode,
    crossplay: CrossplayFlags,
) -> Result<Vec<u8>, ProtocolError> {
    HandshakePayload {
        version,
        display_name: display_name.to_string(),
        language,
        chat_mode,
        platform_data: Vec::new(),
        crossplay,
    }
    .encode()
}

// ---------------------------------------------------------------------------
// Host-game request
// ---------------------------------------------------------------------------

/// A request to create a lobby, framed as a `HostGame` message.
///
/// ```text
/// [len: u16][tag: HostGame]
///     [options: bytes-and-size][crossplay: i32][filters: message tag 0]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CreateGameRequest {
    pub options: GameOptions,
    pub crossplay: CrossplayFlags,
    pub filters: FilterOptions,
}

impl CreateGameRequest {
    /// Encodes the framed request.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidOptions`] if the options fail
    /// [`GameOptions::validate`].
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        self.options.validate()?;

        let mut w = MessageWriter::new();
        w.start_message(MessageTag::HostGame.as_u8());
        encode_game_options(&mut w, &self.options)?;
        w.write_i32(self.crossplay.bits());
        encode_filter_options(&mut w, &self.filters)?;
        w.end_message()?;
        w.into_bytes()
    }

    /// Decodes a framed request, the inverse of [`encode`](Self::encode).
    pub fn decode(buffer: &[u8]) -> Result<Self, ProtocolError> {
        let mut outer = MessageReader::new(buffer);
        let (tag, mut body) = outer.read_message()?;
        if tag != MessageTag::HostGame.as_u8() {
            return Err(ProtocolError::InvalidMessage(format!(
                "expected HostGame, got {}",
                MessageTag::from_u8(tag)
            )));
        }
        let options = decode_game_options(&mut body)?;
        let crossplay = CrossplayFlags(body.read_i32()?);
        let filters = decode_filter_options(&mut body)?;
        Ok(Self {
            options,
            crossplay,
            filters,
        })
    }
}

/// Validates the options and encodes a framed host-game request.
pub fn encode_create_game(
    options: &GameOptions,
    crossplay: CrossplayFlags,
    filters: &FilterOptions,
) -> Result<Vec<u8>, ProtocolError> {
    CreateGameRequest {
        options: options.clone(),
        crossplay,
        filters: filters.clone(),
    }
    .encode()
}

/// Writes the options block as a bytes-and-size blob.
///
/// The block is the layout version followed by one nested message whose tag
/// is the game mode. Its body holds the classic-mode fields in the order the
/// server reads them:
///
/// ```text
/// [max players][keywords: u32][map]
/// [player speed: f32][crew light: f32][impostor light: f32][kill cooldown: f32]
/// [common tasks][long tasks][short tasks][emergency meetings: i32]
/// [impostors][kill distance][discussion time: i32][voting time: i32]
/// [is defaults: bool][emergency cooldown][confirm ejects: bool]
/// [visual tasks: bool][anonymous votes: bool][task bar updates]
/// [role settings..]
/// ```
pub fn encode_game_options(
    w: &mut MessageWriter,
    options: &GameOptions,
) -> Result<(), ProtocolError> {
    let g = &options.gameplay;
    let mut block = MessageWriter::new();
    block.write_u8(GAME_OPTIONS_VERSION);
    block.start_message(GAME_MODE_NORMAL);
    block.write_u8(options.max_players);
    block.write_u32(options.keywords);
    block.write_u8(options.map as u8);
    block.write_f32(g.player_speed);
    block.write_f32(g.crew_light);
    block.write_f32(g.impostor_light);
    block.write_f32(g.kill_cooldown);
    block.write_u8(g.common_tasks);
    block.write_u8(g.long_tasks);
    block.write_u8(g.short_tasks);
    block.write_i32(g.emergency_meetings);
    block.write_u8(options.num_impostors);
    block.write_u8(g.kill_distance);
    block.write_i32(g.discussion_time);
    block.write_i32(g.voting_time);
    block.write_bool(g.is_defaults);
    block.write_u8(g.emergency_cooldown);
    block.write_bool(g.confirm_ejects);
    block.write_bool(g.visual_tasks);
    block.write_bool(g.anonymous_votes);
    block.write_u8(g.task_bar_updates);
    block.write_bytes(&options.role_settings);
    block.end_message()?;
    w.write_bytes_and_size(&block.into_bytes()?);
    Ok(())
}

/// Reads an options block written by [`encode_game_options`].
pub fn decode_game_options(
    reader: &mut MessageReader<'_>,
) -> Result<GameOptions, ProtocolError> {
    let mut block = MessageReader::new(reader.read_bytes_and_size()?);

    let version = block.read_u8()?;
    if version != GAME_OPTIONS_VERSION {
        return Err(ProtocolError::InvalidMessage(format!(
            "unsupported game options version {version}"
        )));
    }
    let (mode, mut body) = block.read_message()?;
    if mode != GAME_MODE_NORMAL {
        return Err(ProtocolError::InvalidMessage(format!(
            "unsupported game mode {mode}"
        )));
    }

    let max_players = body.read_u8()?;
    let keywords = body.read_u32()?;
    let map = MapType::try_from(body.read_u8()?)?;
    let player_speed = body.read_f32()?;
    let crew_light = body.read_f32()?;
    let impostor_light = body.read_f32()?;
    let kill_cooldown = body.read_f32()?;
    let common_tasks = body.read_u8()?;
    let long_tasks = body.read_u8()?;
    let short_tasks = body.read_u8()?;
    let emergency_meetings = body.read_i32()?;
    let num_impostors = body.read_u8()?;
    let gameplay = GameplaySettings {
        player_speed,
        crew_light,
        impostor_light,
        kill_cooldown,
        common_tasks,
        long_tasks,
        short_tasks,
        emergency_meetings,
        kill_distance: body.read_u8()?,
        discussion_time: body.read_i32()?,
        voting_time: body.read_i32()?,
        is_defaults: body.read_bool()?,
        emergency_cooldown: body.read_u8()?,
        confirm_ejects: body.read_bool()?,
        visual_tasks: body.read_bool()?,
        anonymous_votes: body.read_bool()?,
        task_bar_updates: body.read_u8()?,
    };

    Ok(GameOptions {
        max_players,
        num_impostors,
        map,
        keywords,
        gameplay,
        role_settings: body.rest().to_vec(),
    })
}

fn encode_filter_options(
    w: &mut MessageWriter,
    filters: &FilterOptions,
) -> Result<(), ProtocolError> {
    w.start_message(FILTER_OPTIONS_TAG);
    w.write_packed_u32(filters.tags.len() as u32);
    for tag in &filters.tags {
        w.write_str(tag);
    }
    w.end_message()
}

fn decode_filter_options(
    reader: &mut MessageReader<'_>,
) -> Result<FilterOptions, ProtocolError> {
    let (_, mut body) = reader.read_message()?;
    let count = body.read_packed_u32()?;
    let mut tags = BTreeSet::new();
    for _ in 0..count {
        tags.insert(body.read_str()?.to_string());
    }
    Ok(FilterOptions { tags })
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// One inbound message: its tag and a cursor over the payload.
///
/// Borrowed from the receive buffer; it lives for one dispatch.
#[derive(Debug, Clone, Copy)]
pub struct TaggedMessage<'a> {
    pub tag: u8,
    pub reader: MessageReader<'a>,
}

impl TaggedMessage<'_> {
    /// Returns `true` for transport acknowledgements, which carry no
    /// application payload.
    pub fn is_acknowledgement(&self) -> bool {
        self.tag == ACKNOWLEDGEMENT_TAG
    }

    /// The tag as a named [`MessageTag`].
    pub fn kind(&self) -> MessageTag {
        MessageTag::from_u8(self.tag)
    }
}

/// Tag value reserved for transport acknowledgements.
pub const ACKNOWLEDGEMENT_TAG: u8 = u8::MAX;

/// Splits an inbound buffer into its tag and payload cursor.
///
/// # Errors
/// [`ProtocolError::TruncatedMessage`] on an empty buffer.
pub fn decode_tag(buffer: &[u8]) -> Result<TaggedMessage<'_>, ProtocolError> {
    let mut reader = MessageReader::new(buffer);
    let tag = reader.read_u8()?;
    Ok(TaggedMessage { tag, reader })
}

/// Reads a `JoinedGame` payload: game code, client id, host id.
///
/// Trailing bytes (player lists sent by newer servers) are left unread.
pub fn decode_joined_game(
    reader: &mut MessageReader<'_>,
) -> Result<JoinResult, ProtocolError> {
    const NEEDED: usize = 12;
    if reader.remaining() < NEEDED {
        return Err(ProtocolError::TruncatedMessage {
            needed: NEEDED,
            remaining: reader.remaining(),
        });
    }
    Ok(JoinResult {
        game_code: GameCode::from_i32(reader.read_i32()?),
        client_id: reader.read_i32()?,
        host_id: reader.read_i32()?,
    })
}

/// Reads a `Redirect` payload: length-prefixed IPv4 bytes, then the port.
pub fn decode_redirect(
    reader: &mut MessageReader<'_>,
) -> Result<RedirectTarget, ProtocolError> {
    let ip = reader.read_bytes_and_size()?;
    let ip: [u8; 4] = ip.try_into().map_err(|_| {
        ProtocolError::InvalidMessage(format!(
            "redirect address must be 4 bytes, got {}",
            ip.len()
        ))
    })?;
    let port = reader.read_u16()?;
    Ok(RedirectTarget {
        ip: Ipv4Addr::from(ip),
        port,
    })
}
