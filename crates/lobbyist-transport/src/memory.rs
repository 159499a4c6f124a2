//! In-process connection driven by a [`MemoryPeer`].
//!
//! The peer plays the server: it scripts inbound events and inspects what
//! the client sent, in order.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::{
    Connection, ConnectionId, EventStream, TransportError, TransportEvent,
    EVENT_CHANNEL_CAPACITY,
};

/// One payload the client handed to the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentFrame {
    /// The body passed to [`Connection::connect`].
    Handshake(Vec<u8>),
    /// A body passed to [`Connection::send`].
    Data(Vec<u8>),
}

#[derive(Default)]
struct Shared {
    sent: Mutex<Vec<SentFrame>>,
    closed: AtomicBool,
}

impl Shared {
    fn record(&self, frame: SentFrame) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame);
    }
}

/// Client side of an in-process connection.
pub struct MemoryConnection {
    id: ConnectionId,
    shared: Arc<Shared>,
    events: Option<mpsc::Receiver<TransportEvent>>,
    connected: bool,
    refuse_connect: Option<String>,
    fail_sends: Option<String>,
}

/// Server side of an in-process connection.
#[derive(Clone)]
pub struct MemoryPeer {
    shared: Arc<Shared>,
    events: mpsc::Sender<TransportEvent>,
}

impl MemoryConnection {
    /// Creates a connected pair. Events the peer delivers before the
    /// client connects are buffered and handed over by `connect`.
    pub fn pair() -> (MemoryConnection, MemoryPeer) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared::default());
        let conn = MemoryConnection {
            id: ConnectionId::next(),
            shared: Arc::clone(&shared),
            events: Some(rx),
            connected: false,
            refuse_connect: None,
            fail_sends: None,
        };
        let peer = MemoryPeer { shared, events: tx };
        (conn, peer)
    }

    /// Makes `connect` fail with the given reason.
    pub fn refuse_connect(mut self, reason: impl Into<String>) -> Self {
        self.refuse_connect = Some(reason.into());
        self
    }

    /// Makes every `send` fail with the given reason.
    pub fn fail_sends(mut self, reason: impl Into<String>) -> Self {
        self.fail_sends = Some(reason.into());
        self
    }
}

impl Connection for MemoryConnection {
    type Error = TransportError;

    async fn connect(
        &mut self,
        handshake: &[u8],
    ) -> Result<EventStream, Self::Error> {
        if let Some(reason) = &self.refuse_connect {
            return Err(TransportError::ConnectFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                reason.clone(),
            )));
        }
        let events = self.events.take().ok_or_else(|| {
            TransportError::ConnectionClosed("already connected".into())
        })?;
        self.shared.record(SentFrame::Handshake(handshake.to_vec()));
        self.connected = true;
        tracing::debug!(id = %self.id, "memory connection established");
        Ok(events)
    }

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed("closed".into()));
        }
        if let Some(reason) = &self.fail_sends {
            return Err(TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                reason.clone(),
            )));
        }
        self.shared.record(SentFrame::Data(data.to_vec()));
        Ok(())
    }

    fn close(
        &self,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        let shared = Arc::clone(&self.shared);
        let id = self.id;
        async move {
            if !shared.closed.swap(true, Ordering::AcqRel) {
                tracing::debug!(%id, "memory connection closed");
            }
            Ok(())
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

impl MemoryPeer {
    /// Delivers one inbound message (`[tag][payload]`).
    ///
    /// Returns `false` once the client has stopped listening.
    pub async fn deliver(&self, data: impl Into<Vec<u8>>) -> bool {
        self.events
            .send(TransportEvent::Data(data.into()))
            .await
            .is_ok()
    }

    /// Reports a disconnect with the given reason.
    pub async fn disconnect(&self, reason: impl Into<String>) -> bool {
        self.events
            .send(TransportEvent::Disconnected {
                reason: reason.into(),
            })
            .await
            .is_ok()
    }

    /// Everything the client has sent so far, in order.
    pub fn sent(&self) -> Vec<SentFrame> {
        self.shared
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns `true` once the client has closed the connection.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}
