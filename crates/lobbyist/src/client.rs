//! Running one lobby session over a connection.
//!
//! [`run`] is the core: it owns the connection for the lifetime of the
//! session, walks the handshake and host-game steps, then lets the
//! dispatcher drive the state machine until an outcome is produced.
//! [`LobbyClient`] sits on top and adds payload encoding and an optional
//! deadline.

use std::net::SocketAddr;
use std::sync::Arc;

use lobbyist_protocol::{
    FilterOptions, GameOptions, encode_create_game, encode_handshake,
};
use lobbyist_session::{Dispatcher, SessionMachine, SessionOutcome};
use lobbyist_transport::{Connection, EventStream, UdpConnection};
use tokio::task::JoinHandle;

use crate::{ClientConfig, LobbyError};

/// Closes the connection when the session ends, on every exit path.
///
/// [`release`](Self::release) closes it in place. If the guard is dropped
/// instead (the session future was cancelled, e.g. by a deadline), the close
/// is spawned onto the runtime.
struct ConnectionGuard<C: Connection> {
    conn: C,
    closed: bool,
}

impl<C: Connection> ConnectionGuard<C> {
    fn new(conn: C) -> Self {
        Self { conn, closed: false }
    }

    async fn release(mut self) {
        self.closed = true;
        if let Err(e) = self.conn.close().await {
            tracing::debug!(conn_id = %self.conn.id(), error = %e, "close failed");
        }
    }
}

impl<C: Connection> Drop for ConnectionGuard<C> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let conn_id = self.conn.id();
        let close = self.conn.close();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = close.await {
                        tracing::debug!(%conn_id, error = %e, "close failed");
                    }
                });
            }
            Err(_) => tracing::debug!(%conn_id, "no runtime, connection dropped without close"),
        }
    }
}

/// Stops the event pump when the session ends.
struct PumpGuard(Option<JoinHandle<()>>);

impl Drop for PumpGuard {
    fn drop(&mut self) {
        if let Some(pump) = self.0.take() {
            pump.abort();
        }
    }
}

/// Runs one lobby session and returns how it ended.
///
/// The handshake travels with the connect; the host-game request is sent
/// only after the connection is up. Connect or send failures end the session
/// as [`SessionOutcome::Failed`]. Otherwise the session ends when the server
/// places us in a lobby or the transport goes away. The connection is
/// closed before this returns.
pub async fn run<C>(connection: C, handshake: &[u8], create_game: &[u8]) -> SessionOutcome
where
    C: Connection,
    LobbyError: From<C::Error>,
{
    let (machine, completion) = SessionMachine::new();
    let machine = Arc::new(machine);
    let mut guard = ConnectionGuard::new(connection);

    let conn_id = guard.conn.id();
    tracing::info!(%conn_id, "connecting");

    let _pump = match start(&mut guard.conn, &machine, handshake, create_game).await {
        Ok(events) => {
            let dispatcher = Dispatcher::new(Arc::clone(&machine));
            PumpGuard(Some(tokio::spawn(dispatcher.pump(events))))
        }
        Err(e) => {
            tracing::error!(%conn_id, error = %e, "session setup failed");
            machine.fail(e.to_string());
            PumpGuard(None)
        }
    };

    let outcome = completion.wait().await;
    tracing::info!(%conn_id, %outcome, "session finished");
    guard.release().await;
    outcome
}

/// Connects with the handshake and sends the host-game request.
async fn start<C>(
    conn: &mut C,
    machine: &SessionMachine,
    handshake: &[u8],
    create_game: &[u8],
) -> Result<EventStream, LobbyError>
where
    C: Connection,
    LobbyError: From<C::Error>,
{
    let events = conn.connect(handshake).await?;
    tracing::info!(conn_id = %conn.id(), len = handshake.len(), "connected, handshake accepted");
    machine.mark_handshake_sent()?;

    conn.send(create_game).await?;
    tracing::info!(conn_id = %conn.id(), len = create_game.len(), "requested game creation");
    machine.mark_create_game_sent()?;

    Ok(events)
}

// ---------------------------------------------------------------------------
// LobbyClient
// ---------------------------------------------------------------------------

/// Hosts games on a lobby server.
///
/// # Example
///
/// ```rust,no_run
/// use lobbyist::prelude::*;
///
/// # async fn demo() -> Result<(), LobbyError> {
/// let client = LobbyClient::new(ClientConfig::default().with_display_name("Host"));
/// let outcome = client
///     .host_game_at("127.0.0.1:22023".parse().unwrap(), &GameOptions::new(4, 2), &FilterOptions::default())
///     .await?;
/// println!("{outcome}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct LobbyClient {
    config: ClientConfig,
}

impl LobbyClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Encodes the handshake described by the config.
    pub fn handshake(&self) -> Result<Vec<u8>, LobbyError> {
        let config = &self.config;
        Ok(encode_handshake(
            config.version,
            &config.display_name,
            config.language,
            config.chat_mode,
            config.crossplay,
        )?)
    }

    /// Encodes a host-game request.
    pub fn create_game(
        &self,
        options: &GameOptions,
        filters: &FilterOptions,
    ) -> Result<Vec<u8>, LobbyError> {
        Ok(encode_create_game(options, self.config.crossplay, filters)?)
    }

    /// Hosts a game over `connection` and waits for the outcome.
    ///
    /// # Errors
    /// [`LobbyError::Protocol`] if the display name or the options are
    /// invalid. Nothing is sent in that case. Everything after that is
    /// reported through the returned [`SessionOutcome`].
    pub async fn host_game<C>(
        &self,
        connection: C,
        options: &GameOptions,
        filters: &FilterOptions,
    ) -> Result<SessionOutcome, LobbyError>
    where
        C: Connection,
        LobbyError: From<C::Error>,
    {
        let handshake = self.handshake()?;
        let create_game = self.create_game(options, filters)?;
        tracing::debug!(
            conn_id = %connection.id(),
            max_players = options.max_players,
            num_impostors = options.num_impostors,
            "hosting game"
        );

        let session = run(connection, &handshake, &create_game);
        let Some(limit) = self.config.join_timeout else {
            return Ok(session.await);
        };
        match tokio::time::timeout(limit, session).await {
            Ok(outcome) => Ok(outcome),
            Err(_) => {
                tracing::warn!(?limit, "gave up waiting to join");
                Ok(SessionOutcome::Failed {
                    reason: format!("timed out after {limit:?} waiting to join"),
                })
            }
        }
    }

    /// Hosts a game on the UDP server at `endpoint`.
    pub async fn host_game_at(
        &self,
        endpoint: SocketAddr,
        options: &GameOptions,
        filters: &FilterOptions,
    ) -> Result<SessionOutcome, LobbyError> {
        let connection = UdpConnection::with_config(endpoint, self.config.udp.clone());
        self.host_game(connection, options, filters).await
    }
}
