//! Error types surfaced by the adapter.
//!
//! [`ProtocolViolation`] covers invalid connection state transitions,
//! [`SendError`] and [`ReceiveError`] are returned to the application through
//! the bridge handles, and [`CodecError`] is reported by frame codec
//! implementations.

use thiserror::Error;

use crate::state::ConnectionState;

/// An operation was attempted that the current connection state forbids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtocolViolation {
    /// The requested transition is not reachable from `from`.
    #[error("cannot {operation} while connection is {from}")]
    InvalidTransition {
        /// State the connection was in.
        from: ConnectionState,
        /// Human-readable name of the attempted operation.
        operation: &'static str,
    },
    /// A second upgrade request arrived on the same connection.
    #[error("duplicate upgrade request")]
    DuplicateRequest,
    /// A data frame arrived before the upgrade request.
    #[error("frame received before upgrade request")]
    FrameBeforeRequest,
}

/// Errors returned from [`crate::bridge::Sender::send`].
#[derive(Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SendError {
    /// The intent is not valid while the handshake is still pending.
    #[error("expected message 'websocket.accept' or 'websocket.close', but got '{0}'")]
    ExpectedHandshake(&'static str),
    /// The intent is not valid on an open connection.
    #[error("expected message 'websocket.send' or 'websocket.close', but got '{0}'")]
    UnexpectedMessage(&'static str),
    /// An intent was sent after the connection started closing.
    #[error("unexpected message '{0}', after sending 'websocket.close'")]
    MessageAfterClose(&'static str),
    /// A `websocket.send` intent carried neither text nor bytes.
    #[error("websocket data must be bytes or str")]
    InvalidPayload,
    /// The connection state machine refused the transition.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
}

impl SendError {
    /// Returns `true` when the error indicates a breach of the application
    /// contract rather than a malformed payload.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool { !matches!(self, Self::InvalidPayload) }
}

/// Errors returned from [`crate::bridge::Receiver::recv`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ReceiveError {
    /// The terminal `websocket.disconnect` event has already been delivered.
    #[error("connection already disconnected")]
    Disconnected,
}

/// Errors reported by a [`crate::codec::FrameCodec`] while decoding bytes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The peer sent bytes that do not form a valid frame.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// A message exceeded the configured maximum size.
    #[error("message of {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge {
        /// Size of the offending message.
        size: usize,
        /// Configured limit.
        limit: usize,
    },
    /// Any other codec-specific failure.
    #[error("codec failure: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CodecError {
    /// WebSocket close code matching this failure.
    #[must_use]
    pub fn close_code(&self) -> u16 {
        match self {
            Self::Malformed(_) => 1002,
            Self::MessageTooLarge { .. } => 1009,
            Self::Other(_) => 1011,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(SendError::ExpectedHandshake("websocket.send"), true)]
    #[case(SendError::MessageAfterClose("websocket.close"), true)]
    #[case(SendError::InvalidPayload, false)]
    fn classifies_contract_violations(#[case] err: SendError, #[case] violation: bool) {
        assert_eq!(err.is_contract_violation(), violation);
    }

    #[test]
    fn displays_after_close_message() {
        let err = SendError::MessageAfterClose("websocket.close");
        assert_eq!(
            err.to_string(),
            "unexpected message 'websocket.close', after sending 'websocket.close'"
        );
    }

    #[test]
    fn codec_errors_map_to_close_codes() {
        assert_eq!(CodecError::Malformed("bad".into()).close_code(), 1002);
        assert_eq!(
            CodecError::MessageTooLarge {
                size: 10,
                limit: 5
            }
            .close_code(),
            1009
        );
    }
}
