//! Hosts one game on a lobby server and prints how the session ended.
//!
//! ```text
//! LOBBYIST_SERVER=127.0.0.1:22023 \
//! LOBBYIST_NAME=Host \
//! LOBBYIST_OPTIONS='{"max_players": 10, "num_impostors": 2}' \
//! RUST_LOG=debug cargo run -p host-game
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use lobbyist::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_SERVER: &str = "127.0.0.1:22023";

/// Reads the client configuration from `LOBBYIST_NAME` and
/// `LOBBYIST_JOIN_TIMEOUT_SECS`.
fn config_from(
    name: Option<String>,
    join_timeout_secs: Option<String>,
) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let mut config = ClientConfig::default();
    if let Some(name) = name {
        config = config.with_display_name(name);
    }
    if let Some(secs) = join_timeout_secs {
        config = config.with_join_timeout(Duration::from_secs(secs.parse()?));
    }
    Ok(config)
}

/// Game options as JSON, or four players with two impostors.
fn options_from(raw: Option<&str>) -> Result<GameOptions, serde_json::Error> {
    match raw {
        Some(json) => serde_json::from_str(json),
        None => Ok(GameOptions::new(4, 2)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server: SocketAddr = std::env::var("LOBBYIST_SERVER")
        .unwrap_or_else(|_| DEFAULT_SERVER.to_string())
        .parse()?;
    let config = config_from(
        std::env::var("LOBBYIST_NAME").ok(),
        std::env::var("LOBBYIST_JOIN_TIMEOUT_SECS").ok(),
    )?;
    let options = options_from(std::env::var("LOBBYIST_OPTIONS").ok().as_deref())?;

    tracing::info!(%server, name = %config.display_name, version = %config.version, "hosting game");
    let client = LobbyClient::new(config);
    let outcome = client
        .host_game_at(server, &options, &FilterOptions::default())
        .await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.is_joined() {
        std::process::exit(1);
    }
    Ok(())
}
