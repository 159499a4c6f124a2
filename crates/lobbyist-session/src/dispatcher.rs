//! Inbound message dispatch.
//!
//! The dispatcher is the only place raw inbound bytes meet the session. It
//! decodes the tag, turns the buffer into an [`InboundMessage`], and applies
//! it to the [`SessionMachine`]. Decode failures stop here: they are logged
//! with the offending tag and the session keeps running.

use std::sync::Arc;

use lobbyist_protocol::{
    JoinResult, MessageTag, ProtocolError, RedirectTarget, decode_joined_game,
    decode_redirect, decode_tag,
};
use lobbyist_transport::{EventStream, TransportEvent};

use crate::{SessionMachine, SessionState};

/// An inbound message the session knows how to react to.
///
/// Adding a message kind means adding a variant here, and the compiler then
/// points at every match that has to handle it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Transport-level delivery confirmation (tag 255).
    Acknowledgement,
    /// The server has not picked a host yet.
    WaitForHost,
    /// The server placed us in a lobby.
    JoinedGame(JoinResult),
    /// The server wants us on another node.
    Redirect(RedirectTarget),
    /// Any tag the session does not act on.
    Unrecognized(MessageTag),
}

impl InboundMessage {
    /// Decodes one `[tag][payload]` buffer.
    ///
    /// On failure the tag is returned alongside the error (when the buffer
    /// had one) so it can be logged.
    pub fn decode(
        buffer: &[u8],
    ) -> Result<Self, (Option<MessageTag>, ProtocolError)> {
        let mut tagged = decode_tag(buffer).map_err(|e| (None, e))?;
        if tagged.is_acknowledgement() {
            return Ok(Self::Acknowledgement);
        }

        let kind = tagged.kind();
        let reader = &mut tagged.reader;
        let decoded = match kind {
            MessageTag::JoinedGame => decode_joined_game(reader).map(Self::JoinedGame),
            MessageTag::Redirect => decode_redirect(reader).map(Self::Redirect),
            MessageTag::WaitForHost => Ok(Self::WaitForHost),
            other => Ok(Self::Unrecognized(other)),
        };
        decoded.map_err(|e| (Some(kind), e))
    }
}

/// What happened to one inbound buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The message was applied; carries the state afterwards.
    Applied(SessionState),
    /// The message could not be decoded and was dropped.
    Discarded {
        tag: Option<MessageTag>,
        error: ProtocolError,
    },
    /// The session had already ended; the buffer was not looked at.
    Ignored,
}

/// Routes inbound transport events into a [`SessionMachine`].
///
/// Cheap to clone; every clone drives the same machine.
#[derive(Clone)]
pub struct Dispatcher {
    machine: Arc<SessionMachine>,
}

impl Dispatcher {
    pub fn new(machine: Arc<SessionMachine>) -> Self {
        Self { machine }
    }

    /// The machine this dispatcher drives.
    pub fn machine(&self) -> &Arc<SessionMachine> {
        &self.machine
    }

    /// Handles one `[tag][payload]` buffer. Never fails.
    pub fn dispatch(&self, buffer: &[u8]) -> Dispatch {
        if self.machine.state().is_terminal() {
            tracing::debug!(len = buffer.len(), "session already ended, ignoring message");
            return Dispatch::Ignored;
        }

        match InboundMessage::decode(buffer) {
            // The machine logs acknowledgements.
            Ok(InboundMessage::Acknowledgement) => {
                Dispatch::Applied(self.machine.apply(InboundMessage::Acknowledgement))
            }
            Ok(message) => {
                if let Some(&tag) = buffer.first() {
                    tracing::info!(tag, name = %MessageTag::from_u8(tag), "received message");
                }
                Dispatch::Applied(self.machine.apply(message))
            }
            Err((tag, error)) => {
                match tag {
                    Some(tag) => tracing::warn!(
                        tag = tag.as_u8(),
                        name = %tag,
                        error = %error,
                        "error processing message"
                    ),
                    None => tracing::warn!(error = %error, "error processing message"),
                }
                Dispatch::Discarded { tag, error }
            }
        }
    }

    /// Handles one transport event.
    pub fn handle_event(&self, event: TransportEvent) -> Dispatch {
        match event {
            TransportEvent::Data(buffer) => self.dispatch(&buffer),
            TransportEvent::Disconnected { reason } => {
                tracing::info!(%reason, "disconnected");
                self.machine.disconnected(reason);
                Dispatch::Applied(self.machine.state())
            }
        }
    }

    /// Feeds events into the machine until it reaches a terminal state.
    ///
    /// A stream that closes without a disconnect event is treated as one.
    pub async fn pump(self, mut events: EventStream) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
            if self.machine.state().is_terminal() {
                return;
            }
        }
        if !self.machine.state().is_terminal() {
            self.machine.disconnected("transport event stream closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use lobbyist_protocol::{ACKNOWLEDGEMENT_TAG, GameCode};
    use lobbyist_transport::{Connection, MemoryConnection};

    use super::*;
    use crate::{Completion, SessionOutcome};

    fn awaiting_host() -> (Dispatcher, Completion) {
        let (machine, completion) = SessionMachine::new();
        machine.mark_handshake_sent().unwrap();
        machine.mark_create_game_sent().unwrap();
        (Dispatcher::new(Arc::new(machine)), completion)
    }

    fn joined_game(code: i32, client: i32, host: i32) -> Vec<u8> {
        let mut buf = vec![MessageTag::JoinedGame.as_u8()];
        buf.extend_from_slice(&code.to_le_bytes());
        buf.extend_from_slice(&client.to_le_bytes());
        buf.extend_from_slice(&host.to_le_bytes());
        buf
    }

    #[test]
    fn test_decode_classifies_known_tags() {
        assert_eq!(
            InboundMessage::decode(&[ACKNOWLEDGEMENT_TAG]),
            Ok(InboundMessage::Acknowledgement)
        );
        assert_eq!(
            InboundMessage::decode(&[12]),
            Ok(InboundMessage::WaitForHost)
        );
        assert_eq!(
            InboundMessage::decode(&[5, 1, 2, 3]),
            Ok(InboundMessage::Unrecognized(MessageTag::GameData))
        );
        assert_eq!(
            InboundMessage::decode(&[99]),
            Ok(InboundMessage::Unrecognized(MessageTag::Unknown(99)))
        );
    }

    #[test]
    fn test_decode_reports_tag_with_error() {
        let (tag, error) = InboundMessage::decode(&[7, 1, 2, 3, 4]).unwrap_err();
        assert_eq!(tag, Some(MessageTag::JoinedGame));
        assert_eq!(
            error,
            ProtocolError::TruncatedMessage {
                needed: 12,
                remaining: 4
            }
        );

        let (tag, _) = InboundMessage::decode(&[]).unwrap_err();
        assert_eq!(tag, None);
    }

    #[tokio::test]
    async fn test_dispatch_joined_game() {
        let (dispatcher, completion) = awaiting_host();
        assert_eq!(
            dispatcher.dispatch(&joined_game(123456, 1, 1)),
            Dispatch::Applied(SessionState::Joined)
        );
        let outcome = completion.wait().await;
        assert_eq!(
            outcome.join_result().map(|r| (r.game_code, r.client_id, r.host_id)),
            Some((GameCode(123456), 1, 1))
        );
    }

    #[test]
    fn test_truncated_message_is_discarded_and_session_survives() {
        let (dispatcher, _completion) = awaiting_host();
        let result = dispatcher.dispatch(&[7, 0, 0, 0, 0]);
        assert!(matches!(
            result,
            Dispatch::Discarded {
                tag: Some(MessageTag::JoinedGame),
                error: ProtocolError::TruncatedMessage { .. }
            }
        ));
        assert_eq!(dispatcher.machine().state(), SessionState::AwaitingHost);

        // The next well-formed message still goes through.
        assert_eq!(
            dispatcher.dispatch(&[12]),
            Dispatch::Applied(SessionState::AwaitingHost)
        );
    }

    #[test]
    fn test_redirect_is_advisory() {
        let (dispatcher, _completion) = awaiting_host();
        let mut buf = vec![13, 4, 127, 0, 0, 1];
        buf.extend_from_slice(&22023u16.to_le_bytes());
        assert_eq!(
            dispatcher.dispatch(&buf),
            Dispatch::Applied(SessionState::AwaitingHost)
        );
    }

    #[test]
    fn test_acknowledgement_leaves_state_unchanged() {
        let (dispatcher, _completion) = awaiting_host();
        assert_eq!(
            dispatcher.handle_event(TransportEvent::Data(vec![ACKNOWLEDGEMENT_TAG])),
            Dispatch::Applied(SessionState::AwaitingHost)
        );
        assert!(dispatcher.machine().outcome().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_event_terminates() {
        let (dispatcher, completion) = awaiting_host();
        let result = dispatcher.handle_event(TransportEvent::Disconnected {
            reason: "timeout".into(),
        });
        assert_eq!(result, Dispatch::Applied(SessionState::Disconnected));
        assert_eq!(
            completion.wait().await,
            SessionOutcome::Disconnected {
                reason: "timeout".into()
            }
        );
    }

    #[tokio::test]
    async fn test_messages_after_termination_are_ignored() {
        let (dispatcher, completion) = awaiting_host();
        dispatcher.dispatch(&joined_game(1, 2, 3));

        assert_eq!(dispatcher.dispatch(&joined_game(9, 9, 9)), Dispatch::Ignored);
        assert_eq!(dispatcher.dispatch(&[]), Dispatch::Ignored);
        assert_eq!(
            dispatcher.handle_event(TransportEvent::Disconnected {
                reason: "late".into()
            }),
            Dispatch::Applied(SessionState::Joined)
        );

        let outcome = completion.wait().await;
        assert_eq!(outcome.join_result().map(|r| r.client_id), Some(2));
    }

    #[tokio::test]
    async fn test_pump_runs_until_terminal() {
        let (mut conn, peer) = MemoryConnection::pair();
        let events = conn.connect(b"hs").await.unwrap();
        let (dispatcher, completion) = awaiting_host();

        peer.deliver(vec![255]).await;
        peer.deliver(vec![12]).await;
        peer.deliver(joined_game(5, 6, 7)).await;

        dispatcher.clone().pump(events).await;
        assert_eq!(dispatcher.machine().state(), SessionState::Joined);
        assert!(completion.wait().await.is_joined());
    }

    #[tokio::test]
    async fn test_pump_treats_closed_stream_as_disconnect() {
        let (mut conn, peer) = MemoryConnection::pair();
        let events = conn.connect(b"hs").await.unwrap();
        let (dispatcher, completion) = awaiting_host();
        drop(peer);

        dispatcher.pump(events).await;
        assert!(matches!(
            completion.wait().await,
            SessionOutcome::Disconnected { .. }
        ));
    }
}
