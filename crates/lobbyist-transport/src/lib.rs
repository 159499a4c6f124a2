//! Transport abstraction layer for Lobbyist.
//!
//! Provides the [`Connection`] trait that the session layer drives, and the
//! [`TransportEvent`] stream a connection hands back once it is connected.
//! Delivery guarantees (acknowledgements, reliable ids, keep-alive) are the
//! transport's business; the layers above only see whole messages.
//!
//! # Feature Flags
//!
//! - `udp` (default): minimal Hazel-style UDP client connection
//!
//! [`MemoryConnection`] is always available. It is an in-process
//! connection driven by a [`MemoryPeer`], used by tests and demos.

#![allow(async_fn_in_trait)]

mod error;
mod memory;
#[cfg(feature = "udp")]
mod udp;

pub use error::TransportError;
pub use memory::{MemoryConnection, MemoryPeer, SentFrame};
#[cfg(feature = "udp")]
pub use udp::{UdpConfig, UdpConnection};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

/// Capacity of the event channel returned by [`Connection::connect`].
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique `ConnectionId`.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Something that happened on a connection after it was established.
///
/// Events are delivered exactly once each, in the order the transport
/// observed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One application message: a tag byte followed by its payload.
    /// Transport acknowledgements arrive as the single byte
    /// [`lobbyist_protocol::ACKNOWLEDGEMENT_TAG`].
    Data(Vec<u8>),

    /// The connection is gone. No further events follow.
    Disconnected { reason: String },
}

/// Receiving half of a connection's event channel.
pub type EventStream = mpsc::Receiver<TransportEvent>;

/// A client connection to a lobby server.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Establishes the connection, carrying `handshake` as the body of the
    /// initial hello, and returns the stream of inbound events.
    ///
    /// Completes once the remote side has acknowledged the hello.
    async fn connect(
        &mut self,
        handshake: &[u8],
    ) -> Result<EventStream, Self::Error>;

    /// Sends one framed application message reliably.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Closes the connection and stops any background work.
    ///
    /// The returned future is `Send` so it can be spawned from a drop
    /// guard.
    fn close(
        &self,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_next_is_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.into_inner() > a.into_inner());
    }
}
