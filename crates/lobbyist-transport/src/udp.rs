//! Minimal Hazel-style UDP client connection.
//!
//! Only what a lobby client needs to reach a real server: the hello
//! exchange, reliable ids on outbound messages, acknowledging inbound
//! reliable packets, keep-alive pings, and disconnect detection. There is
//! no retransmission and no fragment reassembly.
//!
//! Packet layout: `[send option][reliable id: u16 BE, reliable kinds only][body]`.
//! A body is a sequence of messages, each `[length: u16 LE][tag][payload]`.

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use lobbyist_protocol::ACKNOWLEDGEMENT_TAG;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{
    Connection, ConnectionId, EVENT_CHANNEL_CAPACITY, EventStream,
    TransportError, TransportEvent,
};

const SEND_OPTION_NONE: u8 = 0;
const SEND_OPTION_RELIABLE: u8 = 1;
const SEND_OPTION_HELLO: u8 = 8;
const SEND_OPTION_DISCONNECT: u8 = 9;
const SEND_OPTION_ACKNOWLEDGEMENT: u8 = 10;
const SEND_OPTION_FRAGMENT: u8 = 11;
const SEND_OPTION_PING: u8 = 12;

const HAZEL_VERSION: u8 = 1;

/// Largest datagram we expect from the server.
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Tuning for [`UdpConnection`].
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// How long `connect` waits for the hello to be acknowledged.
    pub connect_timeout: Duration,

    /// Interval between keep-alive pings once connected.
    pub keep_alive_interval: Duration,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            keep_alive_interval: Duration::from_millis(1500),
        }
    }
}

/// A client connection to a Hazel-style UDP server.
pub struct UdpConnection {
    id: ConnectionId,
    endpoint: SocketAddr,
    config: UdpConfig,
    socket: Option<Arc<UdpSocket>>,
    next_reliable_id: Arc<AtomicU16>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl UdpConnection {
    /// Creates an unconnected client for the given server endpoint.
    pub fn new(endpoint: SocketAddr) -> Self {
        Self::with_config(endpoint, UdpConfig::default())
    }

    /// Creates an unconnected client with explicit tuning.
    pub fn with_config(endpoint: SocketAddr, config: UdpConfig) -> Self {
        Self {
            id: ConnectionId::next(),
            endpoint,
            config,
            socket: None,
            next_reliable_id: Arc::new(AtomicU16::new(0)),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The server endpoint this connection targets.
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    fn track(&self, task: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }
}

impl Connection for UdpConnection {
    type Error = TransportError;

    async fn connect(
        &mut self,
        handshake: &[u8],
    ) -> Result<EventStream, Self::Error> {
        let bind_addr = if self.endpoint.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(TransportError::ConnectFailed)?;
        socket
            .connect(self.endpoint)
            .await
            .map_err(TransportError::ConnectFailed)?;
        let socket = Arc::new(socket);

        let hello_id = self.next_reliable_id.fetch_add(1, Ordering::Relaxed);
        let mut hello = Vec::with_capacity(handshake.len() + 4);
        hello.push(SEND_OPTION_HELLO);
        hello.extend_from_slice(&hello_id.to_be_bytes());
        hello.push(HAZEL_VERSION);
        hello.extend_from_slice(handshake);

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (connected_tx, connected_rx) = oneshot::channel();
        let reader = tokio::spawn(read_loop(
            Arc::clone(&socket),
            events_tx,
            hello_id,
            connected_tx,
        ));

        if let Err(e) = socket.send(&hello).await {
            reader.abort();
            return Err(TransportError::SendFailed(e));
        }
        tracing::debug!(id = %self.id, endpoint = %self.endpoint, "hello sent");

        match tokio::time::timeout(self.config.connect_timeout, connected_rx)
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                reader.abort();
                return Err(TransportError::ConnectionClosed(
                    "server closed the connection during hello".into(),
                ));
            }
            Err(_) => {
                reader.abort();
                return Err(TransportError::ConnectFailed(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "hello was not acknowledged",
                )));
            }
        }

        let keep_alive = tokio::spawn(keep_alive_loop(
            Arc::clone(&socket),
            Arc::clone(&self.next_reliable_id),
            self.config.keep_alive_interval,
        ));
        self.track(reader);
        self.track(keep_alive);
        self.socket = Some(socket);

        tracing::info!(id = %self.id, endpoint = %self.endpoint, "udp connection established");
        Ok(events_rx)
    }

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let socket = self.socket.as_ref().ok_or(TransportError::NotConnected)?;
        let reliable_id = self.next_reliable_id.fetch_add(1, Ordering::Relaxed);
        let mut packet = Vec::with_capacity(data.len() + 3);
        packet.push(SEND_OPTION_RELIABLE);
        packet.extend_from_slice(&reliable_id.to_be_bytes());
        packet.extend_from_slice(data);
        socket
            .send(&packet)
            .await
            .map_err(TransportError::SendFailed)?;
        tracing::trace!(id = %self.id, reliable_id, len = data.len(), "reliable packet sent");
        Ok(())
    }

    fn close(
        &self,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        let socket = self.socket.clone();
        let tasks = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let id = self.id;
        async move {
            for task in tasks {
                task.abort();
            }
            if let Some(socket) = socket {
                socket
                    .send(&[SEND_OPTION_DISCONNECT])
                    .await
                    .map_err(TransportError::SendFailed)?;
                tracing::debug!(%id, "udp connection closed");
            }
            Ok(())
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for UdpConnection {
    fn drop(&mut self) {
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

async fn read_loop(
    socket: Arc<UdpSocket>,
    events: mpsc::Sender<TransportEvent>,
    hello_id: u16,
    connected: oneshot::Sender<()>,
) {
    let mut connected = Some(connected);
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let len = match socket.recv(&mut buf).await {
            Ok(len) => len,
            Err(e) => {
                let _ = events
                    .send(TransportEvent::Disconnected {
                        reason: TransportError::ReceiveFailed(e).to_string(),
                    })
                    .await;
                return;
            }
        };

        let Some(packet) = Packet::parse(&buf[..len]) else {
            tracing::debug!(len, "dropping malformed datagram");
            continue;
        };

        let delivered = match packet {
            Packet::Unreliable { body } => deliver_messages(&events, body).await,
            Packet::Reliable { id, body } => {
                acknowledge(&socket, id).await;
                deliver_messages(&events, body).await
            }
            Packet::Ping { id } => {
                acknowledge(&socket, id).await;
                true
            }
            Packet::Acknowledgement { id } if id == hello_id && connected.is_some() => {
                if let Some(tx) = connected.take() {
                    let _ = tx.send(());
                }
                true
            }
            Packet::Acknowledgement { .. } => events
                .send(TransportEvent::Data(vec![ACKNOWLEDGEMENT_TAG]))
                .await
                .is_ok(),
            Packet::Disconnect { reason } => {
                let reason = match reason {
                    Some(code) => format!("server disconnected (reason {code})"),
                    None => "server disconnected".to_string(),
                };
                let _ = events
                    .send(TransportEvent::Disconnected { reason })
                    .await;
                return;
            }
            Packet::Ignored { option } => {
                tracing::trace!(option, "ignoring packet");
                true
            }
        };

        if !delivered {
            tracing::debug!("event receiver dropped, stopping reader");
            return;
        }
    }
}

async fn keep_alive_loop(
    socket: Arc<UdpSocket>,
    next_reliable_id: Arc<AtomicU16>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let id = next_reliable_id.fetch_add(1, Ordering::Relaxed);
        let [hi, lo] = id.to_be_bytes();
        if let Err(e) = socket.send(&[SEND_OPTION_PING, hi, lo]).await {
            tracing::debug!(error = %e, "keep-alive ping failed");
            return;
        }
    }
}

async fn acknowledge(socket: &UdpSocket, id: u16) {
    let [hi, lo] = id.to_be_bytes();
    if let Err(e) = socket
        .send(&[SEND_OPTION_ACKNOWLEDGEMENT, hi, lo, 0xFF])
        .await
    {
        tracing::debug!(error = %e, reliable_id = id, "acknowledgement failed");
    }
}

async fn deliver_messages(
    events: &mpsc::Sender<TransportEvent>,
    body: &[u8],
) -> bool {
    for message in split_messages(body) {
        if events.send(TransportEvent::Data(message)).await.is_err() {
            return false;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Packet parsing
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Packet<'a> {
    Unreliable { body: &'a [u8] },
    Reliable { id: u16, body: &'a [u8] },
    Ping { id: u16 },
    Acknowledgement { id: u16 },
    Disconnect { reason: Option<u8> },
    Ignored { option: u8 },
}

impl<'a> Packet<'a> {
    fn parse(datagram: &'a [u8]) -> Option<Self> {
        let (&option, rest) = datagram.split_first()?;
        let reliable_id = |rest: &[u8]| -> Option<u16> {
            Some(u16::from_be_bytes([*rest.first()?, *rest.get(1)?]))
        };

        match option {
            SEND_OPTION_NONE => Some(Self::Unreliable { body: rest }),
            SEND_OPTION_RELIABLE => Some(Self::Reliable {
                id: reliable_id(rest)?,
                body: &rest[2..],
            }),
            SEND_OPTION_PING => Some(Self::Ping {
                id: reliable_id(rest)?,
            }),
            SEND_OPTION_ACKNOWLEDGEMENT => Some(Self::Acknowledgement {
                id: reliable_id(rest)?,
            }),
            SEND_OPTION_DISCONNECT => {
                // Either a bare reason byte or a nested message whose
                // first payload byte is the reason.
                let reason = match rest {
                    [] => None,
                    [code] => Some(*code),
                    [_, _, _, code, ..] => Some(*code),
                    _ => None,
                };
                Some(Self::Disconnect { reason })
            }
            SEND_OPTION_HELLO | SEND_OPTION_FRAGMENT => {
                Some(Self::Ignored { option })
            }
            _ => None,
        }
    }
}

/// Splits a packet body into `[tag][payload]` messages.
///
/// A trailing message whose declared length overruns the body is dropped.
fn split_messages(mut body: &[u8]) -> Vec<Vec<u8>> {
    let mut messages = Vec::new();
    while body.len() >= 3 {
        let len = u16::from_le_bytes([body[0], body[1]]) as usize;
        let end = 3 + len;
        if body.len() < end {
            tracing::debug!(declared = len, available = body.len() - 3, "truncated message in packet");
            break;
        }
        messages.push(body[2..end].to_vec());
        body = &body[end..];
    }
    messages
}
