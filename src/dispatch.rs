//! Routing of decoded protocol events.
//!
//! [`Connection::data_received`] feeds raw bytes to the codec and handles
//! every resulting [`ProtocolEvent`] synchronously, in order, while holding
//! the connection lock. It never suspends.

use std::sync::Arc;

use log::{error, trace, warn};

use crate::{
    codec::{CodecState, ProtocolEvent, UpgradeRequest},
    connection::{Connection, Core},
    error::{CodecError, ProtocolViolation},
    message::{CLOSE_NO_STATUS, InboundEvent},
    metrics::{self, ErrorKind},
    response,
    scope::Scope,
};

/// What the dispatcher asks of its caller once the lock is released.
#[derive(Debug)]
pub(crate) enum Dispatched {
    /// Nothing further to do.
    Idle,
    /// A handshake began; start the application with this scope.
    StartApplication(Arc<Scope>),
}

/// Whether event handling should continue with the next event.
enum Flow {
    Continue,
    Stop,
}

impl Connection {
    /// Decode `data` and handle the resulting events.
    pub(crate) fn data_received(&self, data: &[u8]) -> Dispatched {
        let mut core = self.lock();
        if core.state.is_closed() {
            trace!(
                "data ignored on closed connection: connection_id={}, bytes={}",
                self.id,
                data.len()
            );
            return Dispatched::Idle;
        }

        let events = match core.codec.receive_bytes(data) {
            Ok(events) => events,
            Err(err) => {
                self.codec_failed(&mut core, &err);
                return Dispatched::Idle;
            }
        };

        let mut outcome = Dispatched::Idle;
        for event in events {
            if core.state.is_closed() {
                trace!(
                    "event ignored on closed connection: connection_id={}, kind={}",
                    self.id,
                    event.kind()
                );
                break;
            }
            let flow = match event {
                ProtocolEvent::Request(request) => {
                    let flow = self.handle_request(&mut core, &request);
                    if let (Flow::Continue, Some(scope)) = (&flow, core.scope.as_ref()) {
                        outcome = Dispatched::StartApplication(Arc::clone(scope));
                    }
                    flow
                }
                ProtocolEvent::BadRequest { reason } => self.handle_bad_request(&mut core, &reason),
                ProtocolEvent::Text(text) => self.handle_text(&mut core, text),
                ProtocolEvent::Binary { data, fin } => self.handle_binary(&mut core, &data, fin),
                ProtocolEvent::Close { code, .. } => self.handle_close(&mut core, code),
                ProtocolEvent::Ping(_) => {
                    core.flush();
                    Flow::Continue
                }
                ProtocolEvent::Pong(_) => Flow::Continue,
            };
            if matches!(flow, Flow::Stop) {
                break;
            }
        }
        outcome
    }

    fn handle_request(&self, core: &mut Core, request: &UpgradeRequest) -> Flow {
        if core.scope.is_some() || core.state.is_handshake_complete() {
            return self.violation(core, ProtocolViolation::DuplicateRequest);
        }
        let scope = Arc::new(Scope::from_request(
            request,
            &core.info,
            self.config.asgi_version(),
            self.config.root_path(),
        ));
        core.pending_response = Some(core.codec.accept_handshake(request));
        core.scope = Some(scope);
        self.queue.push(InboundEvent::Connect);
        Flow::Continue
    }

    fn handle_bad_request(&self, core: &mut Core, reason: &str) -> Flow {
        warn!(
            "invalid upgrade request: connection_id={}, peer={}, reason={reason}",
            self.id,
            core.peer()
        );
        core.write(response::bad_request(reason));
        core.close_transport();
        Flow::Stop
    }

    fn handle_text(&self, core: &mut Core, text: String) -> Flow {
        if core.scope.is_none() {
            return self.violation(core, ProtocolViolation::FrameBeforeRequest);
        }
        self.queue.push(InboundEvent::text(text));
        core.flush();
        Flow::Continue
    }

    fn handle_binary(&self, core: &mut Core, data: &[u8], fin: bool) -> Flow {
        if core.scope.is_none() {
            return self.violation(core, ProtocolViolation::FrameBeforeRequest);
        }
        core.binary.extend_from_slice(data);
        if fin {
            let message = core.binary.split().freeze();
            self.queue.push(InboundEvent::binary(message));
            // Hold further input until the application drains the queue.
            if self.gate.pause_reads() {
                core.pause_reading();
            }
        }
        Flow::Continue
    }

    fn handle_close(&self, core: &mut Core, code: Option<u16>) -> Flow {
        trace!(
            "close frame received: connection_id={}, code={code:?}",
            self.id
        );
        if matches!(core.codec.state(), CodecState::Closing | CodecState::Closed) {
            core.flush();
        }
        if let Err(violation) = core.state.close_received() {
            return self.violation(core, violation);
        }
        self.queue
            .push(InboundEvent::disconnect(Some(CLOSE_NO_STATUS)));
        core.close_transport();
        Flow::Stop
    }

    fn codec_failed(&self, core: &mut Core, err: &CodecError) {
        warn!(
            "codec rejected inbound bytes: connection_id={}, peer={}, error={err}",
            self.id,
            core.peer()
        );
        metrics::inc_errors(ErrorKind::Codec);
        core.binary.clear();
        if core.state.is_handshake_complete()
            && !core.state.is_close_sent()
            && core.codec.state() == CodecState::Open
        {
            core.codec.send_close(err.close_code(), "");
            core.flush();
        }
        if core.scope.is_some() {
            self.queue
                .push(InboundEvent::disconnect(Some(err.close_code())));
        }
        core.close_transport();
    }

    fn violation(&self, core: &mut Core, violation: ProtocolViolation) -> Flow {
        error!(
            "protocol violation: connection_id={}, peer={}, error={violation}",
            self.id,
            core.peer()
        );
        metrics::inc_errors(ErrorKind::Contract);
        core.close_transport();
        Flow::Stop
    }
}
