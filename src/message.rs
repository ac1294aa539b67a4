//! Messages exchanged between the adapter and the hosted application.
//!
//! [`InboundEvent`]s flow from the connection to the application through
//! [`crate::bridge::Receiver`]; [`OutboundIntent`]s flow the other way through
//! [`crate::bridge::Sender`]. Both serialize with a `type` tag matching the
//! conventional `websocket.*` message names.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Close code reported when the peer closed without a status.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Default close code for an application-initiated close.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code used when the server shuts connections down.
pub const CLOSE_SERVICE_RESTART: u16 = 1012;

/// Data carried by a text or binary message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// UTF-8 text.
    #[serde(rename = "text")]
    Text(String),
    /// Opaque bytes.
    #[serde(rename = "bytes")]
    Binary(Bytes),
}

impl Payload {
    /// Length of the payload in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Event delivered to the application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    /// The client requested an upgrade. Always the first event.
    #[serde(rename = "websocket.connect")]
    Connect,
    /// A complete message arrived.
    #[serde(rename = "websocket.receive")]
    Receive {
        /// Message contents.
        #[serde(flatten)]
        payload: Payload,
    },
    /// The connection is gone. Always the last event.
    #[serde(rename = "websocket.disconnect")]
    Disconnect {
        /// Close code, if one is known.
        code: Option<u16>,
    },
}

impl InboundEvent {
    /// Text message event.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Receive {
            payload: Payload::Text(text.into()),
        }
    }

    /// Binary message event.
    #[must_use]
    pub fn binary(bytes: impl Into<Bytes>) -> Self {
        Self::Receive {
            payload: Payload::Binary(bytes.into()),
        }
    }

    /// Disconnect event with an optional close code.
    #[must_use]
    pub fn disconnect(code: Option<u16>) -> Self { Self::Disconnect { code } }

    /// Whether this is the terminal event.
    #[must_use]
    pub fn is_disconnect(&self) -> bool { matches!(self, Self::Disconnect { .. }) }

    /// Conventional message type name.
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Connect => "websocket.connect",
            Self::Receive { .. } => "websocket.receive",
            Self::Disconnect { .. } => "websocket.disconnect",
        }
    }
}

/// Instruction issued by the application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundIntent {
    /// Accept the pending upgrade request.
    #[serde(rename = "websocket.accept")]
    Accept {
        /// Subprotocol selected from the scope's candidates.
        #[serde(default)]
        subprotocol: Option<String>,
        /// Extra response headers.
        #[serde(default)]
        headers: Vec<(String, String)>,
    },
    /// Send a message. Exactly one payload is expected; `bytes` wins when
    /// both are set.
    #[serde(rename = "websocket.send")]
    Send {
        /// Text payload.
        #[serde(default)]
        text: Option<String>,
        /// Binary payload.
        #[serde(default)]
        bytes: Option<Bytes>,
    },
    /// Close the connection, or reject it while handshaking.
    #[serde(rename = "websocket.close")]
    Close {
        /// Close code; defaults to 1000.
        #[serde(default)]
        code: Option<u16>,
        /// Close reason; defaults to empty.
        #[serde(default)]
        reason: Option<String>,
    },
}

impl OutboundIntent {
    /// Accept without a subprotocol or extra headers.
    #[must_use]
    pub fn accept() -> Self {
        Self::Accept {
            subprotocol: None,
            headers: Vec::new(),
        }
    }

    /// Send a text message.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Send {
            text: Some(text.into()),
            bytes: None,
        }
    }

    /// Send a binary message.
    #[must_use]
    pub fn binary(bytes: impl Into<Bytes>) -> Self {
        Self::Send {
            text: None,
            bytes: Some(bytes.into()),
        }
    }

    /// Close with the default code and reason.
    #[must_use]
    pub fn close() -> Self {
        Self::Close {
            code: None,
            reason: None,
        }
    }

    /// Close with an explicit code and reason.
    #[must_use]
    pub fn close_with(code: u16, reason: impl Into<String>) -> Self {
        Self::Close {
            code: Some(code),
            reason: Some(reason.into()),
        }
    }

    /// Conventional message type name.
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Accept { .. } => "websocket.accept",
            Self::Send { .. } => "websocket.send",
            Self::Close { .. } => "websocket.close",
        }
    }
}

impl From<Payload> for OutboundIntent {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Text(text) => Self::text(text),
            Payload::Binary(bytes) => Self::binary(bytes),
        }
    }
}
