//! End-to-end tests running the adapter over an in-memory byte stream.

mod common;

use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use common::{echo, recorder, remote, within};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf, duplex},
    task::JoinHandle,
};
use wsbridge::{
    AdapterConfig,
    Application,
    ConnectionState,
    InboundEvent,
    OutboundIntent,
    Scheme,
    ServerState,
    WebSocketAdapter,
    driver::{StreamInfo, serve_connection},
};
use wsbridge_testing::{LineCodec, close_frame, text_frame, upgrade_request};

fn spawn_served(
    app: impl Application,
    config: AdapterConfig,
    info: StreamInfo,
    capacity: usize,
) -> (DuplexStream, WebSocketAdapter, JoinHandle<()>) {
    let (client, server_io) = duplex(capacity);
    let config = Arc::new(config);
    let adapter = WebSocketAdapter::new(
        Arc::clone(&config),
        Arc::new(app),
        ServerState::new(),
        Box::new(LineCodec::from_config(&config)),
    );
    let served = adapter.clone();
    let handle = tokio::spawn(async move {
        serve_connection(server_io, info, served, &config).await;
    });
    (client, adapter, handle)
}

async fn read_until(client: &mut DuplexStream, buf: &mut Vec<u8>, needle: &str) -> String {
    within(async {
        loop {
            let text = String::from_utf8_lossy(buf).into_owned();
            if text.contains(needle) {
                return text;
            }
            let mut chunk = [0_u8; 256];
            let read = client.read(&mut chunk).await.expect("read from server");
            assert!(read > 0, "stream ended before {needle:?}; got {text:?}");
            buf.extend_from_slice(&chunk[..read]);
        }
    })
    .await
}

#[tokio::test]
async fn echoes_over_a_byte_stream() {
    let (mut client, _adapter, handle) =
        spawn_served(echo, AdapterConfig::default(), StreamInfo::default(), 1024);
    let mut buf = Vec::new();

    client
        .write_all(&upgrade_request("/echo", &[]))
        .await
        .expect("write request");
    read_until(&mut client, &mut buf, "HTTP/1.1 101").await;

    client.write_all(&text_frame("hi")).await.expect("write text");
    read_until(&mut client, &mut buf, "text hi\n").await;

    client
        .write_all(&close_frame(Some(1000)))
        .await
        .expect("write close");
    let output = read_until(&mut client, &mut buf, "close 1000\n").await;
    assert!(output.ends_with("text hi\nclose 1000\n"));

    let mut rest = Vec::new();
    within(client.read_to_end(&mut rest))
        .await
        .expect("read to end");
    assert!(rest.is_empty());
    within(handle).await.expect("serve task");
}

#[tokio::test]
async fn stream_details_reach_the_scope() {
    let (app, mut recording) = recorder();
    let info = StreamInfo {
        local: "10.0.0.1:443".parse().ok(),
        peer: "10.0.0.2:50000".parse().ok(),
        secure: true,
    };
    let (mut client, _adapter, handle) =
        spawn_served(app, AdapterConfig::default(), info, 1024);

    client
        .write_all(&upgrade_request("/", &[]))
        .await
        .expect("write request");
    let scope = recording.scope().await;
    assert_eq!(scope.scheme, Scheme::Wss);
    assert_eq!(scope.server, info.local);
    assert_eq!(scope.client, info.peer);

    drop(client);
    assert_eq!(recording.next_event().await, InboundEvent::Connect);
    assert_eq!(
        recording.next_event().await,
        InboundEvent::disconnect(None)
    );
    within(handle).await.expect("serve task");
}

#[tokio::test]
async fn slow_reader_pauses_sends_until_drained() {
    let (app, mut remote) = remote();
    let config = AdapterConfig::default()
        .with_watermarks(32, 8)
        .expect("valid watermarks");
    let (mut client, adapter, _handle) = spawn_served(app, config, StreamInfo::default(), 16);
    let mut buf = Vec::new();

    client
        .write_all(&upgrade_request("/", &[]))
        .await
        .expect("write request");
    remote.submit(OutboundIntent::accept());
    read_until(&mut client, &mut buf, "\r\n\r\n").await;
    remote.result().await.expect("accept");

    let gate = adapter.flow_control();
    within(async {
        while !gate.is_writable() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;

    let messages = 6;
    for n in 0..messages {
        remote.submit(OutboundIntent::text(format!("message number {n:02}")));
    }
    within(async {
        while gate.is_writable() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;

    let last = format!("text message number {:02}\n", messages - 1);
    let output = read_until(&mut client, &mut buf, &last).await;
    for _ in 0..messages {
        remote.result().await.expect("send after drain");
    }
    assert_eq!(output.matches("text message number").count(), messages);
    within(async {
        while !gate.is_writable() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
}

/// Reads from a duplex stream; every write fails.
struct FailingWrites(DuplexStream);

impl AsyncRead for FailingWrites {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
    }
}

impl AsyncWrite for FailingWrites {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn failed_write_ends_the_connection() {
    let (app, mut remote) = remote();
    let config = Arc::new(
        AdapterConfig::default()
            .with_watermarks(32, 8)
            .expect("valid watermarks"),
    );
    let (mut client, server_io) = duplex(1024);
    let adapter = WebSocketAdapter::new(
        Arc::clone(&config),
        Arc::new(app),
        ServerState::new(),
        Box::new(LineCodec::from_config(&config)),
    );
    let served = adapter.clone();
    let handle = tokio::spawn(async move {
        serve_connection(FailingWrites(server_io), StreamInfo::default(), served, &config).await;
    });

    client
        .write_all(&upgrade_request("/", &[]))
        .await
        .expect("write request");
    assert_eq!(remote.next_event().await, InboundEvent::Connect);
    remote.submit(OutboundIntent::accept());
    remote.submit(OutboundIntent::text("queued behind the failure"));

    within(handle).await.expect("serve task");
    assert_eq!(adapter.state(), ConnectionState::Closed);
    assert!(adapter.flow_control().is_writable());
    assert_eq!(
        remote.next_event().await,
        InboundEvent::disconnect(None)
    );
    drop(client);
}
