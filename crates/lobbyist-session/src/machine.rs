//! The session state machine.
//!
//! # Concurrency note
//!
//! Transport events may be handed to the machine from more than one task.
//! The current state sits behind a mutex, so transitions are applied one at
//! a time; the lock is never held across an `.await`. Reaching a terminal
//! state fires a single-shot completion, guarded by a compare-and-set so a
//! join and a disconnect racing each other still produce one outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::oneshot;

use crate::{InboundMessage, SessionError, SessionOutcome, SessionState};

/// Holds the state of one lobby session and applies transitions to it.
pub struct SessionMachine {
    state: Mutex<SessionState>,
    completed: AtomicBool,
    outcome: OnceLock<SessionOutcome>,
    completion: Mutex<Option<oneshot::Sender<SessionOutcome>>>,
}

/// Resolves once the session reaches a terminal state.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<SessionOutcome>,
}

impl Completion {
    /// Waits for the outcome.
    ///
    /// If the machine is dropped without ever terminating, the session is
    /// reported as failed.
    pub async fn wait(self) -> SessionOutcome {
        self.rx.await.unwrap_or_else(|_| SessionOutcome::Failed {
            reason: "session ended without an outcome".into(),
        })
    }
}

impl SessionMachine {
    /// Creates a machine in `Connecting` and the completion it will fire.
    pub fn new() -> (Self, Completion) {
        let (tx, rx) = oneshot::channel();
        let machine = Self {
            state: Mutex::new(SessionState::Connecting),
            completed: AtomicBool::new(false),
            outcome: OnceLock::new(),
            completion: Mutex::new(Some(tx)),
        };
        (machine, Completion { rx })
    }

    /// The current state.
    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    /// The outcome, once one has been produced.
    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.get()
    }

    /// The transport accepted the hello carrying the handshake.
    pub fn mark_handshake_sent(&self) -> Result<(), SessionError> {
        self.advance(SessionState::HandshakeSent)
    }

    /// The host-game request went out.
    pub fn mark_create_game_sent(&self) -> Result<(), SessionError> {
        self.advance(SessionState::AwaitingHost)
    }

    /// The transport reported the connection gone.
    ///
    /// Returns `false` if the session had already ended.
    pub fn disconnected(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.terminate(SessionOutcome::Disconnected { reason })
    }

    /// Connecting or sending failed.
    ///
    /// Returns `false` if the session had already ended.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.terminate(SessionOutcome::Failed { reason })
    }

    /// Applies one decoded inbound message and returns the resulting state.
    pub fn apply(&self, message: InboundMessage) -> SessionState {
        let mut state = self.lock_state();
        let current = *state;

        if current.is_terminal() {
            tracing::debug!(state = %current, ?message, "session already ended, ignoring message");
            return current;
        }

        match (message, current) {
            (InboundMessage::Acknowledgement, _) => {
                tracing::debug!(state = %current, "received acknowledgement");
            }
            (InboundMessage::WaitForHost, SessionState::AwaitingHost) => {
                tracing::info!("server is waiting for host");
            }
            (InboundMessage::JoinedGame(result), SessionState::AwaitingHost) => {
                tracing::info!(
                    game_code = %result.game_code,
                    client_id = result.client_id,
                    host_id = result.host_id,
                    "joined game"
                );
                self.set_terminal(&mut state, SessionOutcome::Joined(result));
            }
            (InboundMessage::Redirect(target), SessionState::AwaitingHost) => {
                // Following redirects is out of scope; the server's request
                // is only recorded.
                tracing::info!(%target, "server requested redirect");
            }
            (InboundMessage::Unrecognized(tag), _) => {
                tracing::warn!(tag = tag.as_u8(), name = %tag, "unhandled message type");
            }
            (message, _) => {
                tracing::warn!(state = %current, ?message, "unexpected message for state");
            }
        }

        *state
    }

    fn advance(&self, next: SessionState) -> Result<(), SessionError> {
        let mut state = self.lock_state();
        let current = *state;
        if current.is_terminal() {
            return Err(SessionError::AlreadyTerminated(current));
        }
        if !current.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: current,
                to: next,
            });
        }
        *state = next;
        tracing::info!(from = %current, to = %next, "session state changed");
        Ok(())
    }

    fn terminate(&self, outcome: SessionOutcome) -> bool {
        let mut state = self.lock_state();
        let current = *state;
        if current.is_terminal() {
            tracing::debug!(state = %current, %outcome, "session already ended, dropping outcome");
            return false;
        }
        self.set_terminal(&mut state, outcome)
    }

    /// Moves to the outcome's terminal state and fires the completion.
    /// Caller holds the state lock.
    fn set_terminal(
        &self,
        state: &mut MutexGuard<'_, SessionState>,
        outcome: SessionOutcome,
    ) -> bool {
        if self
            .completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(%outcome, "completion already fired");
            return false;
        }

        let from = **state;
        let to = outcome.state();
        **state = to;
        tracing::info!(%from, %to, %outcome, "session ended");

        let _ = self.outcome.set(outcome.clone());
        let sender = self
            .completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = sender {
            // The waiter may already be gone (caller timed out); the
            // outcome stays readable through `outcome()`.
            let _ = tx.send(outcome);
        }
        true
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    use lobbyist_protocol::{GameCode, JoinResult, MessageTag, RedirectTarget};

    use super::*;

    fn awaiting_host() -> (SessionMachine, Completion) {
        let (machine, completion) = SessionMachine::new();
        machine.mark_handshake_sent().unwrap();
        machine.mark_create_game_sent().unwrap();
        (machine, completion)
    }

    fn joined(code: i32) -> InboundMessage {
        InboundMessage::JoinedGame(JoinResult {
            game_code: GameCode(code),
            client_id: 1,
            host_id: 1,
        })
    }

    #[test]
    fn test_new_machine_is_connecting() {
        let (machine, _completion) = SessionMachine::new();
        assert_eq!(machine.state(), SessionState::Connecting);
        assert!(machine.outcome().is_none());
    }

    #[test]
    fn test_steps_must_be_taken_in_order() {
        let (machine, _completion) = SessionMachine::new();
        assert_eq!(
            machine.mark_create_game_sent(),
            Err(SessionError::InvalidTransition {
                from: SessionState::Connecting,
                to: SessionState::AwaitingHost,
            })
        );
        machine.mark_handshake_sent().unwrap();
        assert!(machine.mark_handshake_sent().is_err());
        machine.mark_create_game_sent().unwrap();
        assert_eq!(machine.state(), SessionState::AwaitingHost);
    }

    #[tokio::test]
    async fn test_joined_game_completes_session() {
        let (machine, completion) = awaiting_host();
        assert_eq!(machine.apply(joined(123456)), SessionState::Joined);

        let outcome = completion.wait().await;
        assert_eq!(
            outcome.join_result().map(|r| r.game_code),
            Some(GameCode(123456))
        );
        assert_eq!(machine.outcome(), Some(&outcome));
    }

    #[test]
    fn test_wait_for_host_and_redirect_do_not_transition() {
        let (machine, _completion) = awaiting_host();
        assert_eq!(
            machine.apply(InboundMessage::WaitForHost),
            SessionState::AwaitingHost
        );
        let redirect = InboundMessage::Redirect(RedirectTarget {
            ip: Ipv4Addr::LOCALHOST,
            port: 22023,
        });
        assert_eq!(machine.apply(redirect), SessionState::AwaitingHost);
        assert_eq!(
            machine.apply(InboundMessage::Acknowledgement),
            SessionState::AwaitingHost
        );
        assert_eq!(
            machine.apply(InboundMessage::Unrecognized(MessageTag::Unknown(99))),
            SessionState::AwaitingHost
        );
    }

    #[test]
    fn test_join_before_create_game_is_unexpected() {
        let (machine, _completion) = SessionMachine::new();
        machine.mark_handshake_sent().unwrap();
        assert_eq!(machine.apply(joined(1)), SessionState::HandshakeSent);
        assert!(machine.outcome().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_reports_reason() {
        let (machine, completion) = awaiting_host();
        assert!(machine.disconnected("timeout"));
        assert_eq!(machine.state(), SessionState::Disconnected);
        assert_eq!(
            completion.wait().await,
            SessionOutcome::Disconnected {
                reason: "timeout".into()
            }
        );
    }

    #[tokio::test]
    async fn test_first_terminal_event_wins() {
        let (machine, completion) = awaiting_host();
        assert_eq!(machine.apply(joined(7)), SessionState::Joined);
        assert!(!machine.disconnected("late"));
        assert!(!machine.fail("later"));
        assert_eq!(machine.apply(joined(8)), SessionState::Joined);
        assert!(machine.mark_create_game_sent().is_err());

        let outcome = completion.wait().await;
        assert_eq!(outcome.join_result().map(|r| r.game_code), Some(GameCode(7)));
        assert_eq!(machine.state(), SessionState::Joined);
    }

    #[tokio::test]
    async fn test_racing_join_and_disconnect_produce_one_outcome() {
        let (machine, completion) = awaiting_host();
        let machine = Arc::new(machine);

        let joiner = {
            let machine = Arc::clone(&machine);
            tokio::spawn(async move { machine.apply(joined(42)) == SessionState::Joined })
        };
        let dropper = {
            let machine = Arc::clone(&machine);
            tokio::spawn(async move { machine.disconnected("race") })
        };
        let _ = joiner.await.unwrap();
        let _ = dropper.await.unwrap();

        let outcome = completion.wait().await;
        assert!(machine.state().is_terminal());
        assert_eq!(machine.outcome(), Some(&outcome));
        assert_eq!(machine.state(), outcome.state());
    }

    #[tokio::test]
    async fn test_dropped_machine_reports_failure() {
        let (machine, completion) = SessionMachine::new();
        drop(machine);
        assert!(matches!(
            completion.wait().await,
            SessionOutcome::Failed { .. }
        ));
    }
}
