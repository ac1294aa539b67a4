//! Metric helpers for `wsbridge`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking open connections.
pub const CONNECTIONS_ACTIVE: &str = "wsbridge_connections_active";
/// Name of the counter tracking messages passed through the adapter.
pub const EVENTS_PROCESSED: &str = "wsbridge_events_processed_total";
/// Name of the counter tracking connection failures.
pub const ERRORS_TOTAL: &str = "wsbridge_errors_total";

/// Direction of message flow relative to the application.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Events delivered to the application.
    Inbound,
    /// Intents issued by the application.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Kind of failure recorded by [`inc_errors`].
#[derive(Clone, Copy, Debug)]
pub enum ErrorKind {
    /// The application broke the message contract.
    Contract,
    /// The codec rejected inbound bytes.
    Codec,
    /// The application returned an error or panicked.
    Application,
}

impl ErrorKind {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Contract => "contract",
            ErrorKind::Codec => "codec",
            ErrorKind::Application => "application",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a message for the given direction.
pub fn inc_events(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(EVENTS_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a failure of the given kind.
pub fn inc_errors(kind: ErrorKind) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "kind" => kind.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}
