//! Per-connection adapter driven by the transport.
//!
//! [`WebSocketAdapter`] is the transport-facing entry point. The transport
//! (or [`crate::driver`]) reports its lifecycle through
//! [`WebSocketAdapter::connection_made`], [`WebSocketAdapter::data_received`]
//! and [`WebSocketAdapter::connection_lost`]; the adapter registers itself in
//! the shared [`ServerState`], routes decoded events and supervises the
//! application task.

use std::{io, sync::Arc};

use log::{debug, trace};

use crate::{
    application::Application,
    bridge::run_application,
    codec::FrameCodec,
    config::AdapterConfig,
    connection::Connection,
    dispatch::Dispatched,
    flow::FlowGate,
    message::InboundEvent,
    registry::{ConnectionId, ServerState},
    scope::{ConnectionInfo, Scheme, Scope},
    state::ConnectionState,
    transport::Transport,
};

/// Bridges one transport to one application invocation.
///
/// Cloning is cheap; all clones refer to the same connection.
#[derive(Clone)]
pub struct WebSocketAdapter {
    conn: Arc<Connection>,
    app: Arc<dyn Application>,
    server: Arc<ServerState>,
}

impl WebSocketAdapter {
    /// Create an adapter for a newly accepted connection.
    #[must_use]
    pub fn new(
        config: Arc<AdapterConfig>,
        app: Arc<dyn Application>,
        server: Arc<ServerState>,
        codec: Box<dyn FrameCodec>,
    ) -> Self {
        let id = server.next_connection_id();
        Self {
            conn: Arc::new(Connection::new(id, config, codec)),
            app,
            server,
        }
    }

    /// Identifier of this connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.conn.id }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.conn.lock().state.state() }

    /// Scope built from the upgrade request, once it has arrived.
    #[must_use]
    pub fn scope(&self) -> Option<Arc<Scope>> { self.conn.lock().scope.clone() }

    /// Flow-control handle the transport uses to report watermarks.
    #[must_use]
    pub fn flow_control(&self) -> FlowGate { self.conn.gate.clone() }

    /// The transport has been accepted.
    pub fn connection_made(&self, transport: Box<dyn Transport>) {
        let info = ConnectionInfo {
            scheme: Scheme::for_transport(transport.is_secure()),
            server: transport.local_addr(),
            client: transport.peer_addr(),
        };
        {
            let mut core = self.conn.lock();
            core.info = info;
            core.transport = Some(transport);
        }
        self.server.connections().insert(&self.conn);
        crate::metrics::inc_connections();
        trace!(
            "{} - WebSocket connection made: connection_id={}",
            self.conn.lock().peer(),
            self.conn.id
        );
    }

    /// Bytes arrived from the transport.
    pub fn data_received(&self, data: &[u8]) {
        if let Dispatched::StartApplication(scope) = self.conn.data_received(data) {
            self.start_application(scope);
        }
    }

    /// The peer half-closed the stream. The transport will report the loss
    /// separately.
    pub fn eof_received(&self) {
        trace!("eof received: connection_id={}", self.conn.id);
    }

    /// The transport is gone.
    ///
    /// `error` is `Some` when the loss was abrupt. Either way a `Disconnect`
    /// is queued if none has been yet, so a pending
    /// [`Receiver::recv`](crate::bridge::Receiver::recv) returns instead of
    /// hanging. Servers that only report abrupt losses to the application
    /// leave it waiting after a clean close; this adapter reports both.
    pub fn connection_lost(&self, error: Option<io::Error>) {
        if let Some(err) = &error {
            debug!(
                "connection lost abruptly: connection_id={}, error={err}",
                self.conn.id
            );
        }
        self.conn.queue.push(InboundEvent::disconnect(None));
        if self.server.connections().remove(&self.conn.id) {
            crate::metrics::dec_connections();
        }
        {
            let mut core = self.conn.lock();
            if error.is_none() {
                core.close_transport();
            } else {
                core.state.mark_closed();
            }
        }
        // Senders waiting on a saturated buffer must observe the closed state.
        self.conn.gate.resume_writing();
        trace!(
            "{} - WebSocket connection lost: connection_id={}",
            self.conn.lock().peer(),
            self.conn.id
        );
    }

    /// Transport buffer rose above its high watermark.
    pub fn pause_writing(&self) { self.conn.gate.pause_writing(); }

    /// Transport buffer fell below its low watermark.
    pub fn resume_writing(&self) { self.conn.gate.resume_writing(); }

    /// Close the connection for a server shutdown. Idempotent.
    pub fn shutdown(&self) { self.conn.shutdown(); }

    fn start_application(&self, scope: Arc<Scope>) {
        let conn = Arc::clone(&self.conn);
        let app = Arc::clone(&self.app);
        debug!(
            "starting application: connection_id={}, path={}",
            conn.id, scope.path
        );
        self.server
            .spawn_task(conn.id, run_application(conn, app, scope));
    }
}
