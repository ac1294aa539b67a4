//! Public API for the `wsbridge` library.
//!
//! This crate bridges WebSocket connections to asynchronous applications.
//! A [`WebSocketAdapter`] sits between a byte [`Transport`] and a sans-I/O
//! [`FrameCodec`], turns decoded frames into ordered [`InboundEvent`]s and
//! applies the [`OutboundIntent`]s the hosted [`Application`] sends back.
//! [`driver::serve_connection`] runs an adapter over any tokio byte stream.

pub mod adapter;
pub mod application;
pub mod bridge;
pub mod codec;
pub mod config;
mod connection;
mod dispatch;
pub mod driver;
pub mod error;
pub mod flow;
pub mod message;
pub mod metrics;
pub mod panic;
pub mod queue;
pub mod registry;
pub mod response;
pub mod scope;
pub mod state;
pub mod transport;

pub use adapter::WebSocketAdapter;
pub use application::{AppResult, Application, BoxError};
pub use bridge::{Receiver, Sender};
pub use codec::{CodecState, FrameCodec, HandshakeResponse, ProtocolEvent, UpgradeRequest};
pub use config::{AdapterConfig, ConfigError};
pub use error::{CodecError, ProtocolViolation, ReceiveError, SendError};
pub use message::{InboundEvent, OutboundIntent, Payload};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, EVENTS_PROCESSED};
pub use registry::{ConnectionId, ServerState};
pub use scope::{Scheme, Scope};
pub use state::ConnectionState;
pub use transport::Transport;
