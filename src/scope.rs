//! Connection metadata handed to the application.

use std::net::SocketAddr;

use percent_encoding::percent_decode_str;

use crate::codec::UpgradeRequest;

/// Protocol version markers advertised in every scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsgiVersion {
    /// Interface version, taken from configuration.
    pub version: String,
    /// Version of the WebSocket message specification.
    pub spec_version: &'static str,
}

/// URL scheme of a WebSocket connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    /// Plain `ws`.
    Ws,
    /// TLS-protected `wss`.
    Wss,
}

impl Scheme {
    /// Scheme derived from transport security.
    #[must_use]
    pub fn for_transport(secure: bool) -> Self { if secure { Self::Wss } else { Self::Ws } }

    /// Scheme as it appears in URLs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }
}

/// Immutable description of a connection, built once from the upgrade
/// request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scope {
    /// Version markers.
    pub asgi: AsgiVersion,
    /// Always `"1.1"`.
    pub http_version: &'static str,
    /// Transport scheme.
    pub scheme: Scheme,
    /// Local address.
    pub server: Option<SocketAddr>,
    /// Remote address.
    pub client: Option<SocketAddr>,
    /// Mount point of the application.
    pub root_path: String,
    /// Percent-decoded request path.
    pub path: String,
    /// Request path as received.
    pub raw_path: Vec<u8>,
    /// Query string without the leading `?`.
    pub query_string: Vec<u8>,
    /// Headers with lower-cased names, in arrival order, duplicates kept.
    pub headers: Vec<(String, String)>,
    /// Subprotocols offered by the client.
    pub subprotocols: Vec<String>,
}

/// Connection details known before the upgrade request arrives.
#[derive(Clone, Debug)]
pub(crate) struct ConnectionInfo {
    pub(crate) scheme: Scheme,
    pub(crate) server: Option<SocketAddr>,
    pub(crate) client: Option<SocketAddr>,
}

impl Scope {
    pub(crate) fn from_request(
        request: &UpgradeRequest,
        info: &ConnectionInfo,
        asgi_version: &str,
        root_path: &str,
    ) -> Self {
        let (raw_path, query_string) = request
            .target
            .split_once('?')
            .unwrap_or((request.target.as_str(), ""));
        let headers = request
            .headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
            .collect();

        Self {
            asgi: AsgiVersion {
                version: asgi_version.to_owned(),
                spec_version: "2.3",
            },
            http_version: "1.1",
            scheme: info.scheme,
            server: info.server,
            client: info.client,
            root_path: root_path.to_owned(),
            path: percent_decode_str(raw_path).decode_utf8_lossy().into_owned(),
            raw_path: raw_path.as_bytes().to_vec(),
            query_string: query_string.as_bytes().to_vec(),
            headers,
            subprotocols: parse_subprotocols(request),
        }
    }

    /// First value of the header `name`; `name` must be lower-case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

fn parse_subprotocols(request: &UpgradeRequest) -> Vec<String> {
    request
        .header_values("sec-websocket-protocol")
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}
