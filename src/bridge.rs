//! Application-facing handles and task supervision.
//!
//! The application receives a [`Receiver`] and a [`Sender`] alongside the
//! connection [`Scope`]. These are the only two places where the application
//! can suspend: [`Receiver::recv`] waits for the next inbound event and
//! [`Sender::send`] waits for the transport to accept more writes.

use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use log::{error, info};

use crate::{
    application::Application,
    connection::{Connection, Core},
    error::{ReceiveError, SendError},
    message::{CLOSE_NORMAL, InboundEvent, OutboundIntent},
    metrics::{self, Direction, ErrorKind},
    panic::format_payload,
    registry::ConnectionId,
    scope::Scope,
    state::ConnectionState,
};

/// Inbound half of the application contract.
pub struct Receiver {
    conn: Arc<Connection>,
}

impl Receiver {
    pub(crate) fn new(conn: Arc<Connection>) -> Self { Self { conn } }

    /// Wait for the next inbound event.
    ///
    /// Events arrive strictly in order: one `Connect`, any number of
    /// `Receive`s, then one `Disconnect`.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiveError::Disconnected`] once the `Disconnect` event has
    /// already been returned.
    pub async fn recv(&mut self) -> Result<InboundEvent, ReceiveError> {
        let event = self.conn.queue.pop().await.ok_or(ReceiveError::Disconnected)?;
        let drained = self.conn.queue.is_empty();
        if drained && self.conn.gate.is_read_paused() && self.conn.gate.resume_reads() {
            self.conn.lock().resume_reading();
        }
        Ok(event)
    }

    /// Identifier of the underlying connection.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId { self.conn.id }
}

/// Outbound half of the application contract.
#[derive(Clone)]
pub struct Sender {
    conn: Arc<Connection>,
}

impl Sender {
    pub(crate) fn new(conn: Arc<Connection>) -> Self { Self { conn } }

    /// Apply `intent` to the connection.
    ///
    /// Waits while the transport is above its high watermark. All bytes the
    /// intent produces are written before this call returns.
    ///
    /// # Errors
    ///
    /// - [`SendError::ExpectedHandshake`] for a `send` before the handshake is
    ///   answered.
    /// - [`SendError::UnexpectedMessage`] for an `accept` on an open connection.
    /// - [`SendError::MessageAfterClose`] for anything once a close was sent or
    ///   received.
    /// - [`SendError::InvalidPayload`] for a `send` without text or bytes.
    ///
    /// All but the last close the connection.
    pub async fn send(&self, intent: OutboundIntent) -> Result<(), SendError> {
        self.conn.gate.wait_writable().await;
        let mut core = self.conn.lock();
        let result = self.conn.apply_intent(&mut core, intent);
        match &result {
            Ok(()) => metrics::inc_events(Direction::Outbound),
            Err(err) if err.is_contract_violation() => {
                error!(
                    "application contract violation: connection_id={}, peer={}, error={err}",
                    self.conn.id,
                    core.peer()
                );
                metrics::inc_errors(ErrorKind::Contract);
                core.abort();
            }
            Err(err) => {
                error!(
                    "invalid send payload: connection_id={}, error={err}",
                    self.conn.id
                );
            }
        }
        result
    }

    /// Identifier of the underlying connection.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId { self.conn.id }
}

impl Connection {
    fn apply_intent(&self, core: &mut Core, intent: OutboundIntent) -> Result<(), SendError> {
        let kind = intent.message_type();
        match (core.state.state(), intent) {
            (
                ConnectionState::Handshaking,
                OutboundIntent::Accept {
                    subprotocol,
                    headers,
                },
            ) => self.accept(core, subprotocol, headers),
            (ConnectionState::Handshaking, OutboundIntent::Close { .. }) => self.reject(core),
            (ConnectionState::Handshaking, OutboundIntent::Send { .. }) => {
                Err(SendError::ExpectedHandshake(kind))
            }
            (ConnectionState::Open, OutboundIntent::Send { text, bytes }) => {
                Self::send_data(core, text, bytes)
            }
            (ConnectionState::Open, OutboundIntent::Close { code, reason }) => {
                self.close(core, code, reason)
            }
            (ConnectionState::Open, OutboundIntent::Accept { .. }) => {
                Err(SendError::UnexpectedMessage(kind))
            }
            (ConnectionState::CloseSent | ConnectionState::Closed, _) => {
                Err(SendError::MessageAfterClose(kind))
            }
        }
    }

    fn accept(
        &self,
        core: &mut Core,
        subprotocol: Option<String>,
        headers: Vec<(String, String)>,
    ) -> Result<(), SendError> {
        core.state.complete_handshake()?;
        if let Some(mut response) = core.pending_response.take() {
            if let Some(subprotocol) = subprotocol {
                response.push_header("sec-websocket-protocol", subprotocol);
            }
            response.headers.extend(headers);
            core.codec.send_response(response);
        }
        core.flush();
        info!("{} - \"WebSocket {}\" [accepted]", core.peer(), core.path());
        Ok(())
    }

    fn reject(&self, core: &mut Core) -> Result<(), SendError> {
        core.state.reject_handshake()?;
        self.queue.push(InboundEvent::disconnect(None));
        info!("{} - \"WebSocket {}\" 403", core.peer(), core.path());
        core.pending_response = None;
        let response = core.codec.reject(403, "Reject");
        core.codec.send_response(response);
        core.flush();
        core.close_transport();
        Ok(())
    }

    fn send_data(
        core: &mut Core,
        text: Option<String>,
        bytes: Option<bytes::Bytes>,
    ) -> Result<(), SendError> {
        match (bytes, text) {
            (Some(bytes), _) => core.codec.send_binary(&bytes),
            (None, Some(text)) => core.codec.send_text(&text),
            (None, None) => return Err(SendError::InvalidPayload),
        }
        if !core.is_transport_closing() {
            core.flush();
        }
        Ok(())
    }

    fn close(
        &self,
        core: &mut Core,
        code: Option<u16>,
        reason: Option<String>,
    ) -> Result<(), SendError> {
        core.state.close_sent()?;
        let code = code.unwrap_or(CLOSE_NORMAL);
        let reason = reason.unwrap_or_default();
        self.queue.push(InboundEvent::disconnect(Some(code)));
        core.codec.send_close(code, &reason);
        if !core.is_transport_closing() {
            core.flush();
            core.close_transport();
        }
        Ok(())
    }
}

/// Run the application to completion and react to how it finished.
pub(crate) async fn run_application(
    conn: Arc<Connection>,
    app: Arc<dyn Application>,
    scope: Arc<Scope>,
) {
    let receiver = Receiver::new(Arc::clone(&conn));
    let sender = Sender::new(Arc::clone(&conn));
    let outcome = AssertUnwindSafe(app.call(scope, receiver, sender))
        .catch_unwind()
        .await;

    let mut core = conn.lock();
    match outcome {
        Ok(Ok(value)) if !core.state.is_handshake_complete() && !core.state.is_closed() => {
            if let Some(value) = value {
                error!(
                    "application returned a value: connection_id={}, value={}",
                    conn.id,
                    format_payload(value.as_ref())
                );
            }
            error!(
                "application returned without completing handshake: connection_id={}",
                conn.id
            );
            metrics::inc_errors(ErrorKind::Contract);
            core.abort();
        }
        Ok(Ok(Some(value))) => {
            error!(
                "application should return nothing, but returned '{}': connection_id={}",
                format_payload(value.as_ref()),
                conn.id
            );
            metrics::inc_errors(ErrorKind::Contract);
            core.close_transport();
        }
        Ok(Ok(None)) => {}
        Ok(Err(err)) => {
            error!(
                "exception in application: connection_id={}, peer={}, error={err}",
                conn.id,
                core.peer()
            );
            metrics::inc_errors(ErrorKind::Application);
            core.abort();
        }
        Err(panic) => {
            let panic_msg = format_payload(panic.as_ref());
            error!(
                "application panicked: connection_id={}, peer={}, panic={panic_msg}",
                conn.id,
                core.peer()
            );
            tracing::error!(panic = %panic_msg, connection_id = %conn.id, "application panicked");
            metrics::inc_errors(ErrorKind::Application);
            core.abort();
        }
    }
}
