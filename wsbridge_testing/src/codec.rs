//! A line-oriented stand-in for a real WebSocket codec.
//!
//! [`LineCodec`] accepts an HTTP-style upgrade request terminated by a blank
//! line, then one frame per `\n`-terminated line:
//!
//! | line                 | event                                  |
//! |----------------------|----------------------------------------|
//! | `text <payload>`     | [`ProtocolEvent::Text`]                |
//! | `bin <payload>`      | final [`ProtocolEvent::Binary`]        |
//! | `bin+ <payload>`     | non-final [`ProtocolEvent::Binary`]    |
//! | `close [code [why]]` | [`ProtocolEvent::Close`]               |
//! | `ping <payload>`     | [`ProtocolEvent::Ping`], answers `pong` |
//! | `pong <payload>`     | [`ProtocolEvent::Pong`]                |
//!
//! Outbound frames use the same encoding, so the bytes a transport records
//! read naturally in assertions.

use bytes::{Bytes, BytesMut};
use wsbridge::{
    AdapterConfig,
    CodecError,
    CodecState,
    FrameCodec,
    HandshakeResponse,
    ProtocolEvent,
    UpgradeRequest,
};

const HEADER_END: &[u8] = b"\r\n\r\n";
const DEFLATE: &str = "permessage-deflate";

/// Encode an upgrade request for `target` with `headers`.
#[must_use]
pub fn upgrade_request(target: &str, headers: &[(&str, &str)]) -> Vec<u8> {
    let mut out = format!("GET {target} HTTP/1.1\r\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    out.into_bytes()
}

/// Encode a text frame.
#[must_use]
pub fn text_frame(text: &str) -> Vec<u8> { format!("text {text}\n").into_bytes() }

/// Encode a final binary frame.
#[must_use]
pub fn binary_frame(data: &str) -> Vec<u8> { format!("bin {data}\n").into_bytes() }

/// Encode a non-final binary fragment.
#[must_use]
pub fn binary_fragment(data: &str) -> Vec<u8> { format!("bin+ {data}\n").into_bytes() }

/// Encode a close frame, optionally carrying a code.
#[must_use]
pub fn close_frame(code: Option<u16>) -> Vec<u8> {
    match code {
        Some(code) => format!("close {code}\n").into_bytes(),
        None => b"close\n".to_vec(),
    }
}

/// Encode a ping frame.
#[must_use]
pub fn ping_frame(data: &str) -> Vec<u8> { format!("ping {data}\n").into_bytes() }

/// Encode a pong frame.
#[must_use]
pub fn pong_frame(data: &str) -> Vec<u8> { format!("pong {data}\n").into_bytes() }

/// Scripted sans-I/O codec; see the module docs for the wire format.
#[derive(Debug)]
pub struct LineCodec {
    inbound: BytesMut,
    outbound: Vec<Bytes>,
    state: CodecState,
    request_seen: bool,
    fragment_len: usize,
    max_message_size: usize,
    per_message_deflate: bool,
}

impl LineCodec {
    /// Create a codec rejecting messages larger than `max_message_size`.
    #[must_use]
    pub fn new(max_message_size: usize) -> Self {
        Self {
            inbound: BytesMut::new(),
            outbound: Vec::new(),
            state: CodecState::Connecting,
            request_seen: false,
            fragment_len: 0,
            max_message_size,
            per_message_deflate: false,
        }
    }

    /// Create a codec honouring the size limit and compression setting of
    /// `config`.
    #[must_use]
    pub fn from_config(config: &AdapterConfig) -> Self {
        Self::new(config.max_message_size()).with_per_message_deflate(config.per_message_deflate())
    }

    /// Offer `permessage-deflate` when a client requests it.
    #[must_use]
    pub fn with_per_message_deflate(mut self, enabled: bool) -> Self {
        self.per_message_deflate = enabled;
        self
    }

    fn negotiates_deflate(&self, request: &UpgradeRequest) -> bool {
        self.per_message_deflate
            && request
                .header_values("sec-websocket-extensions")
                .flat_map(|value| value.split(','))
                .filter_map(|offer| offer.split(';').next())
                .any(|name| name.trim().eq_ignore_ascii_case(DEFLATE))
    }

    fn parse_request(&mut self) -> Option<ProtocolEvent> {
        let end = self
            .inbound
            .windows(HEADER_END.len())
            .position(|window| window == HEADER_END)?;
        let head = self.inbound.split_to(end + HEADER_END.len());
        self.request_seen = true;
        let head = String::from_utf8_lossy(&head[..end]).into_owned();
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split(' ');
        let (Some("GET"), Some(target)) = (parts.next(), parts.next()) else {
            self.state = CodecState::Closed;
            return Some(ProtocolEvent::BadRequest {
                reason: format!("unsupported request line: {request_line}"),
            });
        };
        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_owned(), value.trim().to_owned()))
            .collect();
        Some(ProtocolEvent::Request(UpgradeRequest {
            target: target.to_owned(),
            headers,
        }))
    }

    fn parse_frame(&mut self, line: &str) -> Result<Option<ProtocolEvent>, CodecError> {
        let (op, rest) = line.split_once(' ').unwrap_or((line, ""));
        let event = match op {
            "text" => {
                self.check_size(rest.len())?;
                ProtocolEvent::Text(rest.to_owned())
            }
            "bin" | "bin+" => {
                let fin = op == "bin";
                self.fragment_len += rest.len();
                self.check_size(self.fragment_len)?;
                if fin {
                    self.fragment_len = 0;
                }
                ProtocolEvent::Binary {
                    data: Bytes::copy_from_slice(rest.as_bytes()),
                    fin,
                }
            }
            "close" => {
                let (code, reason) = rest.split_once(' ').unwrap_or((rest, ""));
                let code = if code.is_empty() {
                    None
                } else {
                    Some(
                        code.parse()
                            .map_err(|_| CodecError::Malformed(format!("bad close code {code}")))?,
                    )
                };
                if self.state == CodecState::Open {
                    self.push_line(&format!("close {}", code.unwrap_or(1005)));
                }
                self.state = CodecState::Closed;
                ProtocolEvent::Close {
                    code,
                    reason: reason.to_owned(),
                }
            }
            "ping" => {
                self.push_line(&format!("pong {rest}"));
                ProtocolEvent::Ping(Bytes::copy_from_slice(rest.as_bytes()))
            }
            "pong" => ProtocolEvent::Pong(Bytes::copy_from_slice(rest.as_bytes())),
            other => return Err(CodecError::Malformed(format!("unknown opcode {other}"))),
        };
        Ok(Some(event))
    }

    fn check_size(&self, size: usize) -> Result<(), CodecError> {
        if size > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size,
                limit: self.max_message_size,
            });
        }
        Ok(())
    }

    fn push_line(&mut self, line: &str) { self.outbound.push(Bytes::from(format!("{line}\n"))); }
}

impl Default for LineCodec {
    fn default() -> Self { Self::from_config(&AdapterConfig::default()) }
}

impl FrameCodec for LineCodec {
    fn receive_bytes(&mut self, data: &[u8]) -> Result<Vec<ProtocolEvent>, CodecError> {
        self.inbound.extend_from_slice(data);
        let mut events = Vec::new();
        if !self.request_seen {
            match self.parse_request() {
                Some(event @ ProtocolEvent::BadRequest { .. }) => {
                    self.inbound.clear();
                    return Ok(vec![event]);
                }
                Some(event) => events.push(event),
                None => return Ok(events),
            }
        }
        while let Some(pos) = self.inbound.iter().position(|b| *b == b'\n') {
            let line = self.inbound.split_to(pos + 1);
            if self.state == CodecState::Closed {
                continue;
            }
            let line = std::str::from_utf8(&line[..pos])
                .map_err(|err| CodecError::Malformed(err.to_string()))?
                .trim_end_matches('\r')
                .to_owned();
            if line.is_empty() {
                continue;
            }
            events.extend(self.parse_frame(&line)?);
        }
        Ok(events)
    }

    fn bytes_to_send(&mut self) -> Vec<Bytes> { std::mem::take(&mut self.outbound) }

    fn accept_handshake(&mut self, request: &UpgradeRequest) -> HandshakeResponse {
        let mut response = HandshakeResponse {
            status: 101,
            headers: vec![
                ("upgrade".into(), "websocket".into()),
                ("connection".into(), "Upgrade".into()),
            ],
            body: Bytes::new(),
        };
        if self.negotiates_deflate(request) {
            response.push_header("sec-websocket-extensions", DEFLATE);
        }
        response
    }

    fn reject(&mut self, status: u16, text: &str) -> HandshakeResponse {
        HandshakeResponse {
            status,
            headers: vec![("content-type".into(), "text/plain; charset=utf-8".into())],
            body: Bytes::copy_from_slice(text.as_bytes()),
        }
    }

    fn send_response(&mut self, response: HandshakeResponse) {
        let mut head = format!("HTTP/1.1 {}\r\n", response.status);
        for (name, value) in &response.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str("\r\n");
        let mut out = BytesMut::from(head.as_bytes());
        out.extend_from_slice(&response.body);
        self.outbound.push(out.freeze());
        self.state = if response.status == 101 {
            CodecState::Open
        } else {
            CodecState::Closed
        };
    }

    fn send_text(&mut self, data: &str) { self.push_line(&format!("text {data}")); }

    fn send_binary(&mut self, data: &[u8]) {
        self.push_line(&format!("bin {}", String::from_utf8_lossy(data)));
    }

    fn send_close(&mut self, code: u16, reason: &str) {
        if reason.is_empty() {
            self.push_line(&format!("close {code}"));
        } else {
            self.push_line(&format!("close {code} {reason}"));
        }
        if self.state == CodecState::Open {
            self.state = CodecState::Closing;
        }
    }

    fn state(&self) -> CodecState { self.state }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_request_and_pipelined_frames() {
        let mut codec = LineCodec::default();
        let mut input = upgrade_request("/chat?x=1", &[("Host", "example")]);
        input.extend(text_frame("hi"));
        let events = codec.receive_bytes(&input).expect("decode");
        assert_eq!(events.len(), 2);
        assert!(
            matches!(&events[0], ProtocolEvent::Request(req) if req.target == "/chat?x=1"
                && req.headers == [("Host".to_owned(), "example".to_owned())])
        );
        assert_eq!(events[1], ProtocolEvent::Text("hi".into()));
    }

    #[test]
    fn buffers_partial_lines() {
        let mut codec = LineCodec::default();
        codec
            .receive_bytes(&upgrade_request("/", &[]))
            .expect("decode");
        assert!(codec.receive_bytes(b"text he").expect("decode").is_empty());
        let events = codec.receive_bytes(b"llo\n").expect("decode");
        assert_eq!(events, [ProtocolEvent::Text("hello".into())]);
    }

    #[test]
    fn non_get_is_a_bad_request() {
        let mut codec = LineCodec::default();
        let events = codec
            .receive_bytes(b"POST / HTTP/1.1\r\n\r\n")
            .expect("decode");
        assert!(matches!(&events[..], [ProtocolEvent::BadRequest { .. }]));
    }

    #[test]
    fn oversized_fragments_fail() {
        let mut codec = LineCodec::new(4);
        codec
            .receive_bytes(&upgrade_request("/", &[]))
            .expect("decode");
        codec.receive_bytes(&binary_fragment("abc")).expect("decode");
        let err = codec
            .receive_bytes(&binary_frame("de"))
            .expect_err("too large");
        assert_eq!(err.close_code(), 1009);
    }

    #[test]
    fn answers_ping_and_close() {
        let mut codec = LineCodec::default();
        codec
            .receive_bytes(&upgrade_request("/", &[]))
            .expect("decode");
        let response = codec.accept_handshake(&UpgradeRequest {
            target: "/".into(),
            headers: Vec::new(),
        });
        codec.send_response(response);
        codec.bytes_to_send();
        codec.receive_bytes(&ping_frame("p")).expect("decode");
        codec.receive_bytes(&close_frame(Some(1000))).expect("decode");
        assert_eq!(
            codec.bytes_to_send(),
            [Bytes::from_static(b"pong p\n"), Bytes::from_static(b"close 1000\n")]
        );
        assert_eq!(codec.state(), CodecState::Closed);
    }

    fn deflate_request() -> UpgradeRequest {
        UpgradeRequest {
            target: "/".into(),
            headers: vec![(
                "Sec-WebSocket-Extensions".into(),
                "permessage-deflate; client_max_window_bits".into(),
            )],
        }
    }

    #[test]
    fn deflate_follows_the_config() {
        let extension = |codec: &mut LineCodec| {
            codec
                .accept_handshake(&deflate_request())
                .headers
                .into_iter()
                .find(|(name, _)| name == "sec-websocket-extensions")
                .map(|(_, value)| value)
        };

        let mut enabled = LineCodec::from_config(&AdapterConfig::default());
        assert_eq!(extension(&mut enabled).as_deref(), Some(DEFLATE));

        let mut disabled =
            LineCodec::from_config(&AdapterConfig::default().with_per_message_deflate(false));
        assert_eq!(extension(&mut disabled), None);
    }

    #[test]
    fn deflate_needs_a_client_offer() {
        let mut codec = LineCodec::default();
        let response = codec.accept_handshake(&UpgradeRequest {
            target: "/".into(),
            headers: Vec::new(),
        });
        assert!(
            response
                .headers
                .iter()
                .all(|(name, _)| name != "sec-websocket-extensions")
        );
    }
}
