//! Connection lifecycle state machine.
//!
//! A connection moves strictly forward through
//! `Handshaking -> Open -> CloseSent -> Closed`. Skipping ahead is allowed
//! (a rejected handshake goes straight to `CloseSent`, transport loss goes
//! straight to `Closed`), moving backwards is not.

use std::fmt;

use crate::error::ProtocolViolation;

/// Observable state of a single connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionState {
    /// Upgrade request not yet answered by the application.
    Handshaking,
    /// Handshake accepted; data may flow in both directions.
    Open,
    /// Either side has sent a close; no further application sends.
    CloseSent,
    /// The transport has been closed.
    Closed,
}

impl ConnectionState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Handshaking => "handshaking",
            Self::Open => "open",
            Self::CloseSent => "close-sent",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Enforces valid transitions between [`ConnectionState`]s.
#[derive(Debug)]
pub struct StateMachine {
    state: ConnectionState,
    handshake_complete: bool,
}

impl Default for StateMachine {
    fn default() -> Self { Self::new() }
}

impl StateMachine {
    /// Create a state machine in [`ConnectionState::Handshaking`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Handshaking,
            handshake_complete: false,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.state }

    /// Whether the application has answered the upgrade request, either by
    /// accepting or rejecting it.
    #[must_use]
    pub fn is_handshake_complete(&self) -> bool { self.handshake_complete }

    /// Whether a close has been sent or received.
    #[must_use]
    pub fn is_close_sent(&self) -> bool { self.state >= ConnectionState::CloseSent }

    /// Whether the transport has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.state == ConnectionState::Closed }

    /// Accept the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::InvalidTransition`] unless the connection
    /// is still handshaking.
    pub fn complete_handshake(&mut self) -> Result<(), ProtocolViolation> {
        self.expect(ConnectionState::Handshaking, "accept handshake")?;
        self.state = ConnectionState::Open;
        self.handshake_complete = true;
        Ok(())
    }

    /// Reject the handshake, which both completes it and sends a close.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::InvalidTransition`] unless the connection
    /// is still handshaking.
    pub fn reject_handshake(&mut self) -> Result<(), ProtocolViolation> {
        self.expect(ConnectionState::Handshaking, "reject handshake")?;
        self.state = ConnectionState::CloseSent;
        self.handshake_complete = true;
        Ok(())
    }

    /// Record that a close was sent or received.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::InvalidTransition`] once a close has
    /// already been recorded.
    pub fn close_sent(&mut self) -> Result<(), ProtocolViolation> {
        if self.is_close_sent() {
            return Err(ProtocolViolation::InvalidTransition {
                from: self.state,
                operation: "send close",
            });
        }
        self.state = ConnectionState::CloseSent;
        Ok(())
    }

    /// Record a close frame from the peer.
    ///
    /// Unlike [`StateMachine::close_sent`] this is valid after our own close,
    /// since the peer's frame may be the acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::InvalidTransition`] once the connection is
    /// closed.
    pub fn close_received(&mut self) -> Result<(), ProtocolViolation> {
        if self.is_closed() {
            return Err(ProtocolViolation::InvalidTransition {
                from: self.state,
                operation: "receive close",
            });
        }
        self.state = ConnectionState::CloseSent;
        Ok(())
    }

    /// Move to [`ConnectionState::Closed`].
    ///
    /// Returns `true` if the state changed, which callers use to close the
    /// transport at most once.
    pub fn mark_closed(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.state = ConnectionState::Closed;
        true
    }

    fn expect(
        &self,
        expected: ConnectionState,
        operation: &'static str,
    ) -> Result<(), ProtocolViolation> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ProtocolViolation::InvalidTransition {
                from: self.state,
                operation,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn machine() -> StateMachine { StateMachine::new() }

    #[rstest]
    fn accepts_then_closes(mut machine: StateMachine) {
        machine.complete_handshake().expect("handshake");
        assert_eq!(machine.state(), ConnectionState::Open);
        assert!(machine.is_handshake_complete());
        machine.close_sent().expect("close");
        assert!(machine.is_close_sent());
        assert!(machine.mark_closed());
        assert!(machine.is_closed());
    }

    #[rstest]
    fn rejection_skips_open(mut machine: StateMachine) {
        machine.reject_handshake().expect("reject");
        assert!(machine.is_handshake_complete());
        assert_eq!(machine.state(), ConnectionState::CloseSent);
        assert!(machine.complete_handshake().is_err());
    }

    #[rstest]
    fn second_accept_is_a_violation(mut machine: StateMachine) {
        machine.complete_handshake().expect("handshake");
        let err = machine.complete_handshake().expect_err("second accept");
        assert_eq!(
            err,
            ProtocolViolation::InvalidTransition {
                from: ConnectionState::Open,
                operation: "accept handshake",
            }
        );
    }

    #[rstest]
    fn close_is_recorded_once(mut machine: StateMachine) {
        machine.complete_handshake().expect("handshake");
        machine.close_sent().expect("close");
        assert!(machine.close_sent().is_err());
    }

    #[rstest]
    fn close_received_after_close_sent(mut machine: StateMachine) {
        machine.complete_handshake().expect("handshake");
        machine.close_sent().expect("close");
        machine.close_received().expect("acknowledgement");
        assert_eq!(machine.state(), ConnectionState::CloseSent);
        machine.mark_closed();
        assert!(machine.close_received().is_err());
    }

    #[rstest]
    fn mark_closed_is_idempotent(mut machine: StateMachine) {
        assert!(machine.mark_closed());
        assert!(!machine.mark_closed());
        assert!(machine.close_sent().is_err());
        assert!(!machine.is_handshake_complete());
    }
}
