//! Contract for the WebSocket frame codec.
//!
//! The adapter never parses HTTP or WebSocket frames itself. A
//! [`FrameCodec`] turns raw bytes into [`ProtocolEvent`]s and buffers the
//! bytes produced by outbound operations until the adapter collects them with
//! [`FrameCodec::bytes_to_send`].

use bytes::Bytes;

use crate::error::CodecError;

/// Upgrade request as decoded by the codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Request target, including any query string.
    pub target: String,
    /// Headers in arrival order, names as received.
    pub headers: Vec<(String, String)>,
}

impl UpgradeRequest {
    /// All values of the header `name`, compared case-insensitively.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// HTTP response emitted during the handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
}

impl HandshakeResponse {
    /// Append a header.
    pub fn push_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }
}

/// Decoded event produced by [`FrameCodec::receive_bytes`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// A valid upgrade request.
    Request(UpgradeRequest),
    /// Bytes that could not be parsed as an upgrade request.
    BadRequest {
        /// Explanation sent back as the response body.
        reason: String,
    },
    /// A complete text message.
    Text(String),
    /// A binary frame; `fin` marks the last fragment of a message.
    Binary {
        /// Fragment contents.
        data: Bytes,
        /// Whether this fragment completes the message.
        fin: bool,
    },
    /// A close frame from the peer.
    Close {
        /// Close code, if present.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
    /// A ping; the codec has already queued the matching pong.
    Ping(Bytes),
    /// An unsolicited or answering pong.
    Pong(Bytes),
}

impl ProtocolEvent {
    /// Short name used in log lines.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "request",
            Self::BadRequest { .. } => "bad-request",
            Self::Text(_) => "text",
            Self::Binary { .. } => "binary",
            Self::Close { .. } => "close",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
        }
    }
}

/// Connection status as tracked by the codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecState {
    /// Waiting for, or answering, the upgrade request.
    Connecting,
    /// Frames may be exchanged.
    Open,
    /// A close frame has been sent or received but not both.
    Closing,
    /// The closing handshake is complete.
    Closed,
}

/// Sans-I/O WebSocket handshake and frame codec.
///
/// Implementations must be deterministic: every call that produces output
/// appends it to an internal buffer drained by [`FrameCodec::bytes_to_send`].
pub trait FrameCodec: Send + 'static {
    /// Feed raw bytes from the transport and return the events they complete.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the bytes are malformed or a message
    /// exceeds the size limit.
    fn receive_bytes(&mut self, data: &[u8]) -> Result<Vec<ProtocolEvent>, CodecError>;

    /// Drain bytes waiting to be written to the transport.
    fn bytes_to_send(&mut self) -> Vec<Bytes>;

    /// Build the `101 Switching Protocols` response for `request`.
    fn accept_handshake(&mut self, request: &UpgradeRequest) -> HandshakeResponse;

    /// Build a rejection response.
    fn reject(&mut self, status: u16, text: &str) -> HandshakeResponse;

    /// Queue `response` for sending.
    fn send_response(&mut self, response: HandshakeResponse);

    /// Queue a text frame.
    fn send_text(&mut self, data: &str);

    /// Queue a binary frame.
    fn send_binary(&mut self, data: &[u8]);

    /// Queue a close frame.
    fn send_close(&mut self, code: u16, reason: &str);

    /// Current codec state.
    fn state(&self) -> CodecState;
}
