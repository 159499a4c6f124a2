//! Value types that travel in the handshake and host-game request, and the
//! values extracted from inbound messages.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::{GameCode, ProtocolError};

// ---------------------------------------------------------------------------
// ProtocolVersion
// ---------------------------------------------------------------------------

/// The client build advertised to the server.
///
/// Builds are dated, so the components read as year / month / day /
/// revision. On the wire the four are packed into one integer:
///
/// ```text
/// major * 25000 + minor * 1800 + patch * 50 + revision
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
    pub revision: i32,
}

impl ProtocolVersion {
    /// The build this client identifies as by default (2025.10.14).
    pub const CURRENT: Self = Self::new(2025, 10, 14, 0);

    pub const fn new(major: i32, minor: i32, patch: i32, revision: i32) -> Self {
        Self {
            major,
            minor,
            patch,
            revision,
        }
    }

    /// Packs the version into its wire integer.
    ///
    /// Returns `None` if the result does not fit in an `i32`.
    pub fn packed(&self) -> Option<i32> {
        self.major
            .checked_mul(25000)?
            .checked_add(self.minor.checked_mul(1800)?)?
            .checked_add(self.patch.checked_mul(50)?)?
            .checked_add(self.revision)
    }

    /// Recovers the components from a packed integer.
    pub const fn unpack(value: i32) -> Self {
        let major = value / 25000;
        let rest = value % 25000;
        let minor = rest / 1800;
        let rest = rest % 1800;
        Self::new(major, minor, rest / 50, rest % 50)
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.revision
        )
    }
}

// ---------------------------------------------------------------------------
// Language / ChatMode / CrossplayFlags
// ---------------------------------------------------------------------------

/// Client language, sent as a 32-bit integer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[repr(u32)]
pub enum Language {
    #[default]
    English = 0,
    Latam = 1,
    Brazilian = 2,
    Portuguese = 3,
    Korean = 4,
    Russian = 5,
    Dutch = 6,
    Filipino = 7,
    French = 8,
    German = 9,
    Italian = 10,
    Japanese = 11,
    Spanish = 12,
    SChinese = 13,
    TChinese = 14,
    Irish = 15,
}

impl Language {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Which chat surfaces the client allows, sent as one byte.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum ChatMode {
    #[default]
    FreeChatOrQuickChat = 1,
    QuickChatOnly = 2,
}

impl ChatMode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Platforms a lobby will interoperate with.
///
/// Bit `1 << n` is set for platform number `n` (1 = Epic PC, 2 = Steam PC,
/// 3 = Mac, 4 = Windows Store, 5 = itch.io, 6 = iPhone, 7 = Android,
/// 8 = Switch, 9 = Xbox, 10 = PlayStation).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CrossplayFlags(pub i32);

impl CrossplayFlags {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(0x7FE);

    /// Flags allowing exactly one platform.
    pub const fn platform(number: u8) -> Self {
        Self(1 << number)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> i32 {
        self.0
    }
}

impl Default for CrossplayFlags {
    fn default() -> Self {
        Self::ALL
    }
}

impl std::ops::BitOr for CrossplayFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ---------------------------------------------------------------------------
// GameOptions / FilterOptions
// ---------------------------------------------------------------------------

/// Map a lobby is created on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum MapType {
    #[default]
    Skeld = 0,
    MiraHq = 1,
    Polus = 2,
    Dleks = 3,
    Airship = 4,
    Fungle = 5,
}

impl TryFrom<u8> for MapType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Skeld),
            1 => Ok(Self::MiraHq),
            2 => Ok(Self::Polus),
            3 => Ok(Self::Dleks),
            4 => Ok(Self::Airship),
            5 => Ok(Self::Fungle),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown map {other}"
            ))),
        }
    }
}

/// Gameplay tuning carried in the options block.
///
/// Defaults are the server's stock lobby settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameplaySettings {
    pub player_speed: f32,
    pub crew_light: f32,
    pub impostor_light: f32,
    /// Seconds.
    pub kill_cooldown: f32,
    pub common_tasks: u8,
    pub long_tasks: u8,
    pub short_tasks: u8,
    pub emergency_meetings: i32,
    /// 0 = short, 1 = normal, 2 = long.
    pub kill_distance: u8,
    /// Seconds.
    pub discussion_time: i32,
    /// Seconds.
    pub voting_time: i32,
    pub is_defaults: bool,
    /// Seconds.
    pub emergency_cooldown: u8,
    pub confirm_ejects: bool,
    pub visual_tasks: bool,
    pub anonymous_votes: bool,
    /// 0 = always, 1 = on meetings, 2 = never.
    pub task_bar_updates: u8,
}

impl Default for GameplaySettings {
    fn default() -> Self {
        Self {
            player_speed: 1.0,
            crew_light: 1.0,
            impostor_light: 1.5,
            kill_cooldown: 15.0,
            common_tasks: 1,
            long_tasks: 1,
            short_tasks: 2,
            emergency_meetings: 1,
            kill_distance: 1,
            discussion_time: 15,
            voting_time: 120,
            is_defaults: true,
            emergency_cooldown: 15,
            confirm_ejects: true,
            visual_tasks: true,
            anonymous_votes: false,
            task_bar_updates: 0,
        }
    }
}

/// The lobby configuration requested from the server.
///
/// The counts the client validates sit at the top level; the rest of the
/// classic-mode settings live in `gameplay`. Role settings are not modelled:
/// `role_settings` is copied to the wire verbatim after the typed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameOptions {
    pub max_players: u8,
    pub num_impostors: u8,
    #[serde(default)]
    pub map: MapType,
    /// Language keyword bits used by the server's lobby search.
    #[serde(default)]
    pub keywords: u32,
    #[serde(default)]
    pub gameplay: GameplaySettings,
    #[serde(default)]
    pub role_settings: Vec<u8>,
}

impl GameOptions {
    /// Options with the given lobby size and everything else defaulted.
    pub fn new(max_players: u8, num_impostors: u8) -> Self {
        Self {
            max_players,
            num_impostors,
            map: MapType::default(),
            keywords: 0,
            gameplay: GameplaySettings::default(),
            role_settings: Vec::new(),
        }
    }

    /// Checks the counts the server would otherwise reject.
    ///
    /// `max_players` must be positive and the impostor count must sit
    /// strictly between zero and `max_players`.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.max_players == 0 {
            return Err(ProtocolError::InvalidOptions(
                "max players must be positive".into(),
            ));
        }
        if self.num_impostors == 0 || self.num_impostors >= self.max_players {
            return Err(ProtocolError::InvalidOptions(format!(
                "impostor count {} must be between 1 and {}",
                self.num_impostors,
                self.max_players - 1
            )));
        }
        Ok(())
    }
}

/// Lobby search filters attached to a host-game request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub tags: BTreeSet<String>,
}

impl FilterOptions {
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}

// ---------------------------------------------------------------------------
// MessageTag
// ---------------------------------------------------------------------------

/// The tag byte at the front of every lobby message.
///
/// The session only reacts to a handful of these; the rest exist so logs
/// can name what arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTag {
    HostGame,
    JoinGame,
    StartGame,
    RemoveGame,
    RemovePlayer,
    GameData,
    GameDataTo,
    JoinedGame,
    EndGame,
    GetGameList,
    AlterGame,
    KickPlayer,
    WaitForHost,
    Redirect,
    ReselectServer,
    GetGameListV2,
    ReportPlayer,
    SetGameSession,
    SetActivePodType,
    QueryPlatformIds,
    QueryLobbyInfo,
    Unknown(u8),
}

impl MessageTag {
    pub fn from_u8(tag: u8) -> Self {
        match tag {
            0 => Self::HostGame,
            1 => Self::JoinGame,
            2 => Self::StartGame,
            3 => Self::RemoveGame,
            4 => Self::RemovePlayer,
            5 => Self::GameData,
            6 => Self::GameDataTo,
            7 => Self::JoinedGame,
            8 => Self::EndGame,
            9 => Self::GetGameList,
            10 => Self::AlterGame,
            11 => Self::KickPlayer,
            12 => Self::WaitForHost,
            13 => Self::Redirect,
            14 => Self::ReselectServer,
            16 => Self::GetGameListV2,
            17 => Self::ReportPlayer,
            20 => Self::SetGameSession,
            21 => Self::SetActivePodType,
            22 => Self::QueryPlatformIds,
            23 => Self::QueryLobbyInfo,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::HostGame => 0,
            Self::JoinGame => 1,
            Self::StartGame => 2,
            Self::RemoveGame => 3,
            Self::RemovePlayer => 4,
            Self::GameData => 5,
            Self::GameDataTo => 6,
            Self::JoinedGame => 7,
            Self::EndGame => 8,
            Self::GetGameList => 9,
            Self::AlterGame => 10,
            Self::KickPlayer => 11,
            Self::WaitForHost => 12,
            Self::Redirect => 13,
            Self::ReselectServer => 14,
            Self::GetGameListV2 => 16,
            Self::ReportPlayer => 17,
            Self::SetGameSession => 20,
            Self::SetActivePodType => 21,
            Self::QueryPlatformIds => 22,
            Self::QueryLobbyInfo => 23,
            Self::Unknown(other) => other,
        }
    }
}

impl From<u8> for MessageTag {
    fn from(tag: u8) -> Self {
        Self::from_u8(tag)
    }
}

impl fmt::Display for MessageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(tag) => write!(f, "Unknown({tag})"),
            known => write!(f, "{known:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound values
// ---------------------------------------------------------------------------

/// The server confirmed the client is in a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinResult {
    pub game_code: GameCode,
    pub client_id: i32,
    pub host_id: i32,
}

impl fmt::Display for JoinResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "game {} (client {}, host {})",
            self.game_code, self.client_id, self.host_id
        )
    }
}

/// A server the current one asked the client to reconnect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RedirectTarget {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl fmt::Display for RedirectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_version_packs_to_known_value() {
        assert_eq!(ProtocolVersion::CURRENT.packed(), Some(50_643_700));
    }

    #[test]
    fn test_version_unpack_reverses_pack() {
        let v = ProtocolVersion::new(2024, 6, 18, 3);
        assert_eq!(ProtocolVersion::unpack(v.packed().unwrap()), v);
        assert_eq!(v.to_string(), "2024.6.18.3");
    }

    #[test]
    fn test_version_pack_overflow_is_none() {
        assert_eq!(ProtocolVersion::new(100_000, 1, 1, 0).packed(), None);
        assert_eq!(ProtocolVersion::new(0, 0, 0, i32::MAX).packed(), Some(i32::MAX));
        assert_eq!(ProtocolVersion::new(0, 0, 1, i32::MAX).packed(), None);
    }

    #[test]
    fn test_crossplay_all_contains_every_platform() {
        for number in 1..=10 {
            assert!(CrossplayFlags::ALL.contains(CrossplayFlags::platform(number)));
        }
        assert!(!CrossplayFlags::ALL.contains(CrossplayFlags::platform(0)));
        assert_eq!(
            (CrossplayFlags::platform(2) | CrossplayFlags::platform(7)).bits(),
            0x84
        );
    }

    #[test]
    fn test_validate_boundaries() {
        assert!(matches!(
            GameOptions::new(4, 0).validate(),
            Err(ProtocolError::InvalidOptions(_))
        ));
        assert!(matches!(
            GameOptions::new(4, 4).validate(),
            Err(ProtocolError::InvalidOptions(_))
        ));
        assert!(matches!(
            GameOptions::new(0, 0).validate(),
            Err(ProtocolError::InvalidOptions(_))
        ));
        assert!(GameOptions::new(4, 2).validate().is_ok());
        assert!(GameOptions::new(4, 3).validate().is_ok());
        assert!(GameOptions::new(2, 1).validate().is_ok());
    }

    #[test]
    fn test_map_type_rejects_unknown() {
        assert_eq!(MapType::try_from(4).unwrap(), MapType::Airship);
        assert!(MapType::try_from(42).is_err());
    }

    #[test]
    fn test_message_tag_names() {
        assert_eq!(MessageTag::from_u8(7), MessageTag::JoinedGame);
        assert_eq!(MessageTag::from_u8(13).to_string(), "Redirect");
        assert_eq!(MessageTag::from_u8(15), MessageTag::Unknown(15));
        assert_eq!(MessageTag::from_u8(15).to_string(), "Unknown(15)");
        assert_eq!(MessageTag::from_u8(22), MessageTag::QueryPlatformIds);
        assert_eq!(MessageTag::from_u8(23).to_string(), "QueryLobbyInfo");
        assert_eq!(MessageTag::from_u8(24), MessageTag::Unknown(24));
        for tag in 0..=u8::MAX {
            assert_eq!(MessageTag::from_u8(tag).as_u8(), tag);
        }
    }

    #[test]
    fn test_redirect_target_display() {
        let target = RedirectTarget {
            ip: Ipv4Addr::new(127, 0, 0, 1),
            port: 22023,
        };
        assert_eq!(target.to_string(), "127.0.0.1:22023");
    }

    #[test]
    fn test_game_options_json_defaults() {
        let options: GameOptions =
            serde_json::from_str(r#"{"max_players":10,"num_impostors":2}"#)
                .unwrap();
        assert_eq!(options, GameOptions::new(10, 2));

        let options: GameOptions = serde_json::from_str(
            r#"{"max_players":10,"num_impostors":2,"gameplay":{"kill_cooldown":30.0}}"#,
        )
        .unwrap();
        assert_eq!(options.gameplay.kill_cooldown, 30.0);
        assert_eq!(options.gameplay.voting_time, 120);
    }
}
