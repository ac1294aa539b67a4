//! Per-connection state shared by the dispatcher, the bridge handles and the
//! lifecycle hooks.
//!
//! Everything that touches the codec or the transport lives in [`Core`]
//! behind a single mutex, so the bytes produced by one operation are written
//! before another operation can encode anything. The lock is never held
//! across an `.await`.

use std::{
    fmt,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::{Bytes, BytesMut};
use log::{debug, trace};

use crate::{
    codec::{CodecState, FrameCodec, HandshakeResponse},
    config::AdapterConfig,
    flow::FlowGate,
    message::{CLOSE_SERVICE_RESTART, InboundEvent},
    queue::InboundQueue,
    registry::ConnectionId,
    response,
    scope::{ConnectionInfo, Scheme, Scope},
    state::StateMachine,
    transport::Transport,
};

/// Mutable connection state guarded by [`Connection::lock`].
pub(crate) struct Core {
    pub(crate) codec: Box<dyn FrameCodec>,
    pub(crate) transport: Option<Box<dyn Transport>>,
    pub(crate) state: StateMachine,
    pub(crate) info: ConnectionInfo,
    pub(crate) scope: Option<Arc<Scope>>,
    pub(crate) pending_response: Option<HandshakeResponse>,
    pub(crate) binary: BytesMut,
}

impl Core {
    pub(crate) fn write(&mut self, data: Bytes) {
        if data.is_empty() {
            return;
        }
        if let Some(transport) = self.transport.as_mut() {
            transport.write(data);
        }
    }

    /// Write everything the codec has buffered.
    pub(crate) fn flush(&mut self) {
        for chunk in self.codec.bytes_to_send() {
            self.write(chunk);
        }
    }

    pub(crate) fn is_transport_closing(&self) -> bool {
        self.transport
            .as_ref()
            .is_none_or(|transport| transport.is_closing())
    }

    /// Close the transport unless it was already closed. Returns `true` if
    /// this call closed it.
    pub(crate) fn close_transport(&mut self) -> bool {
        if !self.state.mark_closed() {
            return false;
        }
        if let Some(transport) = self.transport.as_mut() {
            transport.close();
        }
        true
    }

    /// Close after a failure, answering with a 500 if the handshake was never
    /// completed.
    pub(crate) fn abort(&mut self) {
        if self.state.is_closed() {
            return;
        }
        if !self.state.is_handshake_complete() {
            self.write(response::internal_error());
        }
        self.close_transport();
    }

    pub(crate) fn pause_reading(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            transport.pause_reading();
        }
    }

    pub(crate) fn resume_reading(&mut self) {
        if let Some(transport) = self.transport.as_mut() {
            transport.resume_reading();
        }
    }

    pub(crate) fn peer(&self) -> PeerLabel { PeerLabel(self.info.client) }

    pub(crate) fn path(&self) -> &str { self.scope.as_ref().map_or("", |scope| scope.path.as_str()) }
}

/// Formats an optional peer address as `host:port` or `-`.
pub(crate) struct PeerLabel(Option<SocketAddr>);

impl fmt::Display for PeerLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(addr) => write!(f, "{addr}"),
            None => f.write_str("-"),
        }
    }
}

/// State of one accepted connection.
pub(crate) struct Connection {
    pub(crate) id: ConnectionId,
    pub(crate) config: Arc<AdapterConfig>,
    pub(crate) queue: InboundQueue,
    pub(crate) gate: FlowGate,
    core: Mutex<Core>,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        config: Arc<AdapterConfig>,
        codec: Box<dyn FrameCodec>,
    ) -> Self {
        Self {
            id,
            config,
            queue: InboundQueue::new(),
            gate: FlowGate::new(),
            core: Mutex::new(Core {
                codec,
                transport: None,
                state: StateMachine::new(),
                info: ConnectionInfo {
                    scheme: Scheme::Ws,
                    server: None,
                    client: None,
                },
                scope: None,
                pending_response: None,
                binary: BytesMut::new(),
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Force the connection closed with a service-restart code.
    ///
    /// Safe to call in any state; only the first call on a live connection
    /// has any effect.
    pub(crate) fn shutdown(&self) {
        let mut core = self.lock();
        if core.state.is_closed() {
            trace!("shutdown ignored; connection already closed: connection_id={}", self.id);
            return;
        }
        self.queue
            .push(InboundEvent::disconnect(Some(CLOSE_SERVICE_RESTART)));
        let can_send_close = core.state.is_handshake_complete()
            && !core.state.is_close_sent()
            && core.codec.state() == CodecState::Open;
        if can_send_close {
            core.codec.send_close(CLOSE_SERVICE_RESTART, "");
            core.flush();
        }
        core.close_transport();
        debug!(
            "connection shut down: connection_id={}, peer={}",
            self.id,
            core.peer()
        );
    }
}
