//! Contract for the byte transport underneath a connection.

use std::net::SocketAddr;

use bytes::Bytes;

/// An accepted, bidirectional byte stream.
///
/// Writes are non-blocking: the transport buffers them and reports
/// saturation through the connection's [`crate::flow::FlowGate`].
pub trait Transport: Send + 'static {
    /// Queue `data` for writing.
    fn write(&mut self, data: Bytes);

    /// Flush pending writes and close the stream.
    fn close(&mut self);

    /// Whether [`Transport::close`] has been called or the stream is shutting
    /// down.
    fn is_closing(&self) -> bool;

    /// Stop delivering inbound bytes.
    fn pause_reading(&mut self);

    /// Resume delivering inbound bytes.
    fn resume_reading(&mut self);

    /// Local socket address, if known.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Remote socket address, if known.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Whether the stream is TLS-protected.
    fn is_secure(&self) -> bool { false }
}
