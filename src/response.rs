//! Minimal HTTP responses written directly to the transport.
//!
//! These bypass the codec and are only used when no WebSocket connection
//! will be established: malformed upgrade requests and application failures
//! before the handshake completed.

use std::fmt::Write;

use bytes::Bytes;

/// Body of the response sent when the application fails mid-handshake.
pub const INTERNAL_ERROR_BODY: &str = "Internal Server Error";

/// `400 Bad Request` carrying `reason` as a plain-text body.
#[must_use]
pub fn bad_request(reason: &str) -> Bytes { plain_text(400, "Bad Request", reason) }

/// `500 Internal Server Error` with a fixed body.
#[must_use]
pub fn internal_error() -> Bytes { plain_text(500, "Internal Server Error", INTERNAL_ERROR_BODY) }

fn plain_text(status: u16, phrase: &str, body: &str) -> Bytes {
    let mut out = String::with_capacity(128 + body.len());
    // Writing to a `String` cannot fail.
    let _ = write!(
        out,
        "HTTP/1.1 {status} {phrase}\r\n\
         content-type: text/plain; charset=utf-8\r\n\
         connection: close\r\n\
         content-length: {}\r\n\
         \r\n\
         {body}",
        body.len()
    );
    Bytes::from(out)
}
