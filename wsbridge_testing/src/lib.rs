//! Test support for `wsbridge`.
//!
//! [`Harness`] connects an application to an in-memory [`MockTransport`]
//! speaking the line-oriented [`LineCodec`], so tests can feed client input
//! and assert on the exact bytes the adapter writes back.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use wsbridge::{AppResult, OutboundIntent, Receiver, Scope, Sender};
//! use wsbridge_testing::{Harness, text_frame};
//!
//! async fn greet(_scope: Arc<Scope>, mut receive: Receiver, send: Sender) -> AppResult {
//!     receive.recv().await?;
//!     send.send(OutboundIntent::accept()).await?;
//!     send.send(OutboundIntent::text("hello")).await?;
//!     Ok(None)
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let harness = Harness::new(greet);
//! harness.open("/").await;
//! harness.probe.wait_for_text("text hello\n").await;
//! # }
//! ```

pub mod codec;
pub mod harness;
pub mod logging;
pub mod metrics;
pub mod transport;

pub use codec::{
    LineCodec,
    binary_fragment,
    binary_frame,
    close_frame,
    ping_frame,
    pong_frame,
    text_frame,
    upgrade_request,
};
pub use harness::{Harness, HarnessBuilder};
pub use logging::{LoggerHandle, logger};
pub use metrics::{CounterSnapshot, debugging_recorder_setup};
pub use transport::{MockTransport, TransportProbe};
