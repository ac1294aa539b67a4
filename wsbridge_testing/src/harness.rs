//! Wires an application to a [`MockTransport`] and a [`LineCodec`].

use std::sync::Arc;

use wsbridge::{AdapterConfig, Application, ServerState, WebSocketAdapter};

use crate::{
    codec::{LineCodec, upgrade_request},
    transport::{MockTransport, TransportProbe},
};

/// A connected adapter plus the probe observing its transport.
pub struct Harness {
    /// The adapter under test.
    pub adapter: WebSocketAdapter,
    /// Observes the mock transport.
    pub probe: TransportProbe,
    /// Shared server state the adapter registered with.
    pub server: Arc<ServerState>,
}

impl Harness {
    /// Connect `app` with the default configuration.
    #[must_use]
    pub fn new(app: impl Application) -> Self {
        Self::builder(app).build()
    }

    /// Start configuring a harness for `app`.
    #[must_use]
    pub fn builder(app: impl Application) -> HarnessBuilder {
        HarnessBuilder {
            app: Arc::new(app),
            config: AdapterConfig::default(),
            server: None,
            transport: MockTransport::pair(),
        }
    }

    /// Feed raw bytes as if read from the transport.
    pub fn feed(&self, data: impl AsRef<[u8]>) { self.adapter.data_received(data.as_ref()); }

    /// Send an upgrade request for `target` without extra headers.
    pub fn request(&self, target: &str) { self.feed(upgrade_request(target, &[])); }

    /// Send an upgrade request and wait for the `101` response.
    ///
    /// # Panics
    ///
    /// Panics if the application does not accept in time.
    pub async fn open(&self, target: &str) {
        self.request(target);
        self.probe.wait_for_text("HTTP/1.1 101").await;
    }

    /// Report a clean end of the stream.
    pub fn lose_cleanly(&self) {
        self.adapter.eof_received();
        self.adapter.connection_lost(None);
    }

    /// Wait until every application task of this harness has finished.
    ///
    /// # Panics
    ///
    /// Panics if a task is still running after the probe's wait limit.
    pub async fn finished(&self) {
        let server = Arc::clone(&self.server);
        self.probe
            .wait_until(move |_| server.tasks().is_empty())
            .await;
    }
}

/// Configures a [`Harness`] before connecting it.
pub struct HarnessBuilder {
    app: Arc<dyn Application>,
    config: AdapterConfig,
    server: Option<Arc<ServerState>>,
    transport: (MockTransport, TransportProbe),
}

impl HarnessBuilder {
    /// Use `config` for the adapter and codec.
    #[must_use]
    pub fn config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }

    /// Register with an existing server state.
    #[must_use]
    pub fn server(mut self, server: Arc<ServerState>) -> Self {
        self.server = Some(server);
        self
    }

    /// Adjust the mock transport, for example to make it secure.
    #[must_use]
    pub fn transport(mut self, f: impl FnOnce(MockTransport) -> MockTransport) -> Self {
        let (transport, probe) = self.transport;
        self.transport = (f(transport), probe);
        self
    }

    /// Create the adapter and report the transport as connected.
    #[must_use]
    pub fn build(self) -> Harness {
        let server = self.server.unwrap_or_else(ServerState::new);
        let codec = LineCodec::from_config(&self.config);
        let adapter = WebSocketAdapter::new(
            Arc::new(self.config),
            self.app,
            Arc::clone(&server),
            Box::new(codec),
        );
        let (transport, probe) = self.transport;
        adapter.connection_made(Box::new(transport));
        Harness {
            adapter,
            probe,
            server,
        }
    }
}
