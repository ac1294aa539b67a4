//! In-memory [`Transport`] that records everything the adapter does to it.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use bytes::Bytes;
use wsbridge::Transport;

const WAIT_LIMIT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(2);

#[derive(Debug, Default)]
struct Recorded {
    writes: Vec<Bytes>,
    close_calls: usize,
    pause_calls: usize,
    resume_calls: usize,
    reading_paused: bool,
    closing: bool,
}

/// Transport whose effects are observed through a [`TransportProbe`].
#[derive(Debug)]
pub struct MockTransport {
    recorded: Arc<Mutex<Recorded>>,
    local: Option<SocketAddr>,
    peer: Option<SocketAddr>,
    secure: bool,
}

impl MockTransport {
    /// Create a transport with loopback addresses and its probe.
    #[must_use]
    pub fn pair() -> (Self, TransportProbe) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let transport = Self {
            recorded: Arc::clone(&recorded),
            local: "127.0.0.1:8000".parse().ok(),
            peer: "127.0.0.1:5000".parse().ok(),
            secure: false,
        };
        (transport, TransportProbe { recorded })
    }

    /// Report the stream as TLS-protected.
    #[must_use]
    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Report no addresses, as a Unix socket would.
    #[must_use]
    pub fn without_addresses(mut self) -> Self {
        self.local = None;
        self.peer = None;
        self
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> { self.recorded.lock().expect("probe poisoned") }
}

impl Transport for MockTransport {
    fn write(&mut self, data: Bytes) {
        let mut recorded = self.recorded();
        if !recorded.closing {
            recorded.writes.push(data);
        }
    }

    fn close(&mut self) {
        let mut recorded = self.recorded();
        recorded.close_calls += 1;
        recorded.closing = true;
    }

    fn is_closing(&self) -> bool { self.recorded().closing }

    fn pause_reading(&mut self) {
        let mut recorded = self.recorded();
        recorded.pause_calls += 1;
        recorded.reading_paused = true;
    }

    fn resume_reading(&mut self) {
        let mut recorded = self.recorded();
        recorded.resume_calls += 1;
        recorded.reading_paused = false;
    }

    fn local_addr(&self) -> Option<SocketAddr> { self.local }

    fn peer_addr(&self) -> Option<SocketAddr> { self.peer }

    fn is_secure(&self) -> bool { self.secure }
}

/// Read side of a [`MockTransport`].
#[derive(Clone, Debug)]
pub struct TransportProbe {
    recorded: Arc<Mutex<Recorded>>,
}

impl TransportProbe {
    fn recorded(&self) -> MutexGuard<'_, Recorded> { self.recorded.lock().expect("probe poisoned") }

    /// Every chunk written so far.
    #[must_use]
    pub fn writes(&self) -> Vec<Bytes> { self.recorded().writes.clone() }

    /// All written bytes as lossy UTF-8.
    #[must_use]
    pub fn output(&self) -> String {
        self.recorded()
            .writes
            .iter()
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect()
    }

    /// Forget everything written so far.
    pub fn clear_writes(&self) { self.recorded().writes.clear(); }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.recorded().closing }

    /// Number of `close` calls.
    #[must_use]
    pub fn close_calls(&self) -> usize { self.recorded().close_calls }

    /// Number of `pause_reading` calls.
    #[must_use]
    pub fn pause_calls(&self) -> usize { self.recorded().pause_calls }

    /// Number of `resume_reading` calls.
    #[must_use]
    pub fn resume_calls(&self) -> usize { self.recorded().resume_calls }

    /// Whether reading is currently paused.
    #[must_use]
    pub fn is_reading_paused(&self) -> bool { self.recorded().reading_paused }

    /// Wait until the written output satisfies `pred`.
    ///
    /// # Panics
    ///
    /// Panics with the output seen so far if `pred` does not hold in time.
    pub async fn wait_for_output(&self, pred: impl Fn(&str) -> bool) -> String {
        self.wait_until(|probe| pred(&probe.output())).await;
        self.output()
    }

    /// Wait until the output contains `needle`.
    ///
    /// # Panics
    ///
    /// Panics if `needle` is not written in time.
    pub async fn wait_for_text(&self, needle: &str) -> String {
        self.wait_for_output(|out| out.contains(needle)).await
    }

    /// Wait until the transport has been closed.
    ///
    /// # Panics
    ///
    /// Panics if the transport stays open.
    pub async fn wait_closed(&self) { self.wait_until(TransportProbe::is_closed).await; }

    /// Wait until `pred` holds.
    ///
    /// # Panics
    ///
    /// Panics with the current output if `pred` does not hold in time.
    pub async fn wait_until(&self, pred: impl Fn(&Self) -> bool) {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        while !pred(self) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not met; output so far: {:?}",
                self.output()
            );
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
