//! Drives a [`WebSocketAdapter`] over a tokio byte stream.
//!
//! [`serve_connection`] splits the stream into a read loop, which feeds the
//! adapter and honours read pauses, and a writer task fed through an
//! unbounded channel. The writer tracks how many bytes are queued and reports
//! crossings of the configured watermarks to the adapter's
//! [`FlowGate`], which is what suspends
//! [`Sender::send`](crate::bridge::Sender::send).

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::{mpsc, watch},
};
use tokio_util::sync::CancellationToken;

use crate::{adapter::WebSocketAdapter, config::AdapterConfig, flow::FlowGate, transport::Transport};

/// Addressing details of an accepted stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamInfo {
    /// Local address.
    pub local: Option<SocketAddr>,
    /// Remote address.
    pub peer: Option<SocketAddr>,
    /// Whether the stream is TLS-protected.
    pub secure: bool,
}

impl StreamInfo {
    /// Addresses of a TCP stream.
    #[must_use]
    pub fn from_tcp(stream: &tokio::net::TcpStream) -> Self {
        Self {
            local: stream.local_addr().ok(),
            peer: stream.peer_addr().ok(),
            secure: false,
        }
    }
}

enum WriterCommand {
    Data(Bytes),
    Close,
}

struct DriverShared {
    buffered: AtomicUsize,
    above_high: AtomicBool,
    closing: AtomicBool,
    read_paused: watch::Sender<bool>,
    closed: CancellationToken,
    gate: FlowGate,
    high: usize,
    low: usize,
}

impl DriverShared {
    fn queued(&self, len: usize) {
        let buffered = self.buffered.fetch_add(len, Ordering::AcqRel) + len;
        if buffered > self.high && !self.above_high.swap(true, Ordering::AcqRel) {
            self.gate.pause_writing();
        }
    }

    fn written(&self, len: usize) {
        let buffered = self.buffered.fetch_sub(len, Ordering::AcqRel) - len;
        if buffered <= self.low && self.above_high.swap(false, Ordering::AcqRel) {
            self.gate.resume_writing();
        }
    }
}

struct StreamTransport {
    tx: mpsc::UnboundedSender<WriterCommand>,
    shared: Arc<DriverShared>,
    info: StreamInfo,
}

impl Transport for StreamTransport {
    fn write(&mut self, data: Bytes) {
        if self.shared.closing.load(Ordering::Acquire) {
            return;
        }
        let len = data.len();
        self.shared.queued(len);
        if self.tx.send(WriterCommand::Data(data)).is_err() {
            self.shared.written(len);
        }
    }

    fn close(&mut self) {
        if !self.shared.closing.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(WriterCommand::Close);
            self.shared.closed.cancel();
        }
    }

    fn is_closing(&self) -> bool { self.shared.closing.load(Ordering::Acquire) }

    fn pause_reading(&mut self) { self.shared.read_paused.send_replace(true); }

    fn resume_reading(&mut self) { self.shared.read_paused.send_replace(false); }

    fn local_addr(&self) -> Option<SocketAddr> { self.info.local }

    fn peer_addr(&self) -> Option<SocketAddr> { self.info.peer }

    fn is_secure(&self) -> bool { self.info.secure }
}

/// Serve one connection until the stream closes.
///
/// Returns once the read side has finished and every queued byte has been
/// written or the write side failed.
pub async fn serve_connection<S>(
    io: S,
    info: StreamInfo,
    adapter: WebSocketAdapter,
    config: &AdapterConfig,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(io);
    let (tx, rx) = mpsc::unbounded_channel();
    let (read_paused, _) = watch::channel(false);
    let shared = Arc::new(DriverShared {
        buffered: AtomicUsize::new(0),
        above_high: AtomicBool::new(false),
        closing: AtomicBool::new(false),
        read_paused,
        closed: CancellationToken::new(),
        gate: adapter.flow_control(),
        high: config.write_high_watermark(),
        low: config.write_low_watermark(),
    });

    let writer_task = tokio::spawn(write_loop(writer, rx, Arc::clone(&shared)));
    let control = tx.clone();
    adapter.connection_made(Box::new(StreamTransport {
        tx,
        shared: Arc::clone(&shared),
        info,
    }));

    match read_loop(reader, &adapter, &shared, config.read_buffer_size()).await {
        Ok(()) => adapter.connection_lost(None),
        Err(err) => adapter.connection_lost(Some(err)),
    }
    let _ = control.send(WriterCommand::Close);
    drop(control);

    match writer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!("write side failed: connection_id={}, error={err}", adapter.id()),
        Err(err) => warn!("writer task failed: connection_id={}, error={err}", adapter.id()),
    }
}

async fn read_loop<R>(
    mut reader: R,
    adapter: &WebSocketAdapter,
    shared: &DriverShared,
    buffer_size: usize,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(buffer_size);
    let mut paused = shared.read_paused.subscribe();
    loop {
        tokio::select! {
            biased;
            () = shared.closed.cancelled() => return Ok(()),
            running = async { paused.wait_for(|paused| !*paused).await.is_ok() } => {
                if !running {
                    return Ok(());
                }
            }
        }

        buf.clear();
        buf.reserve(buffer_size);
        let read = tokio::select! {
            biased;
            () = shared.closed.cancelled() => return Ok(()),
            res = reader.read_buf(&mut buf) => res?,
        };
        if read == 0 {
            adapter.eof_received();
            return Ok(());
        }
        adapter.data_received(&buf[..read]);
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
    shared: Arc<DriverShared>,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let result = write_queued(&mut writer, &mut rx, &shared).await;
    shared.closing.store(true, Ordering::Release);
    shared.closed.cancel();
    rx.close();
    while let Ok(command) = rx.try_recv() {
        if let WriterCommand::Data(bytes) = command {
            shared.written(bytes.len());
        }
    }
    result?;
    writer.flush().await?;
    writer.shutdown().await
}

async fn write_queued<W>(
    writer: &mut W,
    rx: &mut mpsc::UnboundedReceiver<WriterCommand>,
    shared: &DriverShared,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Data(bytes) => {
                let result = writer.write_all(&bytes).await;
                shared.written(bytes.len());
                result?;
            }
            WriterCommand::Close => break,
        }
    }
    Ok(())
}
