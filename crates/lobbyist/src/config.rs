//! Client configuration.

use std::time::Duration;

use lobbyist_protocol::{ChatMode, CrossplayFlags, Language, ProtocolVersion};
use lobbyist_transport::UdpConfig;
use serde::{Deserialize, Serialize};

/// Configuration for a [`LobbyClient`](crate::LobbyClient).
///
/// Everything the handshake carries lives here, plus the optional deadline
/// for reaching the lobby.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Name shown to other players. 1 to 10 characters.
    pub display_name: String,

    /// Protocol version announced in the handshake.
    pub version: ProtocolVersion,

    pub language: Language,

    pub chat_mode: ChatMode,

    /// Platforms we are willing to play with.
    pub crossplay: CrossplayFlags,

    /// How long to wait for the lobby before giving up. `None` waits until
    /// the server or the transport ends the session.
    pub join_timeout: Option<Duration>,

    /// Tuning for [`LobbyClient::host_game_at`](crate::LobbyClient::host_game_at).
    #[serde(skip)]
    pub udp: UdpConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            display_name: "Lobbyist".to_string(),
            version: ProtocolVersion::CURRENT,
            language: Language::default(),
            chat_mode: ChatMode::default(),
            crossplay: CrossplayFlags::default(),
            join_timeout: None,
            udp: UdpConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_chat_mode(mut self, chat_mode: ChatMode) -> Self {
        self.chat_mode = chat_mode;
        self
    }

    pub fn with_crossplay(mut self, crossplay: CrossplayFlags) -> Self {
        self.crossplay = crossplay;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = Some(timeout);
        self
    }

    pub fn with_udp(mut self, udp: UdpConfig) -> Self {
        self.udp = udp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.display_name, "Lobbyist");
        assert_eq!(config.version, ProtocolVersion::CURRENT);
        assert_eq!(config.crossplay, CrossplayFlags::ALL);
        assert!(config.join_timeout.is_none());
    }

    #[test]
    fn test_builders_override_fields() {
        let config = ClientConfig::default()
            .with_display_name("Host")
            .with_language(Language::French)
            .with_chat_mode(ChatMode::QuickChatOnly)
            .with_crossplay(CrossplayFlags::NONE)
            .with_join_timeout(Duration::from_secs(10));
        assert_eq!(config.display_name, "Host");
        assert_eq!(config.language, Language::French);
        assert_eq!(config.chat_mode, ChatMode::QuickChatOnly);
        assert_eq!(config.crossplay, CrossplayFlags::NONE);
        assert_eq!(config.join_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{ "display_name": "Tester" }"#).unwrap();
        assert_eq!(config.display_name, "Tester");
        assert_eq!(config.version, ProtocolVersion::CURRENT);
        assert!(config.join_timeout.is_none());
    }
}
