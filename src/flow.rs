//! Flow control between the transport and the application.
//!
//! [`FlowGate`] mirrors the transport's write-buffer watermarks so that
//! [`crate::bridge::Sender::send`] suspends while the transport is saturated.
//! It also records whether inbound reads have been paused to bound the memory
//! held by undelivered binary messages.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::trace;
use tokio::sync::watch;

struct GateInner {
    writable: watch::Sender<bool>,
    read_paused: AtomicBool,
}

/// Cloneable handle to a connection's flow-control state.
///
/// Transports call [`FlowGate::pause_writing`] when their buffer rises above
/// the high watermark and [`FlowGate::resume_writing`] once it falls below the
/// low watermark.
#[derive(Clone)]
pub struct FlowGate(Arc<GateInner>);

impl Default for FlowGate {
    fn default() -> Self { Self::new() }
}

impl FlowGate {
    /// Create an open gate with reads running.
    #[must_use]
    pub fn new() -> Self {
        let (writable, _) = watch::channel(true);
        Self(Arc::new(GateInner {
            writable,
            read_paused: AtomicBool::new(false),
        }))
    }

    /// Transport buffer is above its high watermark.
    pub fn pause_writing(&self) {
        trace!("write buffer above high watermark; pausing sends");
        self.0.writable.send_replace(false);
    }

    /// Transport buffer is below its low watermark.
    pub fn resume_writing(&self) {
        trace!("write buffer below low watermark; resuming sends");
        self.0.writable.send_replace(true);
    }

    /// Whether sends may proceed without waiting.
    #[must_use]
    pub fn is_writable(&self) -> bool { *self.0.writable.borrow() }

    /// Wait until the gate is open.
    pub async fn wait_writable(&self) {
        let mut rx = self.0.writable.subscribe();
        // The sender lives as long as `self`, so `wait_for` cannot fail here.
        let _ = rx.wait_for(|writable| *writable).await;
    }

    /// Record that reads were paused. Returns `true` if they were running,
    /// meaning the caller must pause the transport.
    pub fn pause_reads(&self) -> bool { !self.0.read_paused.swap(true, Ordering::AcqRel) }

    /// Record that reads were resumed. Returns `true` if they were paused,
    /// meaning the caller must resume the transport.
    pub fn resume_reads(&self) -> bool { self.0.read_paused.swap(false, Ordering::AcqRel) }

    /// Whether reads are currently paused.
    #[must_use]
    pub fn is_read_paused(&self) -> bool { self.0.read_paused.load(Ordering::Acquire) }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn open_gate_does_not_wait() {
        let gate = FlowGate::new();
        tokio::time::timeout(Duration::from_millis(50), gate.wait_writable())
            .await
            .expect("gate should be open");
    }

    #[tokio::test]
    async fn paused_gate_waits_for_resume() {
        let gate = FlowGate::new();
        gate.pause_writing();
        assert!(!gate.is_writable());

        let waiter = tokio::spawn({
            let gate = gate.clone();
            async move { gate.wait_writable().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        gate.resume_writing();
        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("waiter should finish")
            .expect("join waiter");
    }

    #[test]
    fn read_pause_toggles_once() {
        let gate = FlowGate::new();
        assert!(gate.pause_reads());
        assert!(!gate.pause_reads());
        assert!(gate.is_read_paused());
        assert!(gate.resume_reads());
        assert!(!gate.resume_reads());
    }
}
