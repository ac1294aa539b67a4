//! Applications and helpers shared by the integration tests.
#![allow(dead_code, reason = "each test binary uses a subset of the helpers")]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::sync::mpsc;
use wsbridge::{
    AppResult,
    Application,
    InboundEvent,
    OutboundIntent,
    Receiver,
    Scope,
    SendError,
    Sender,
};

const WAIT_LIMIT: Duration = Duration::from_secs(2);

/// Await `fut`, panicking if it takes longer than the wait limit.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(WAIT_LIMIT, fut)
        .await
        .expect("timed out waiting for the application")
}

/// Accept, then echo every message back until the client goes away.
pub async fn echo(_scope: Arc<Scope>, mut receive: Receiver, send: Sender) -> AppResult {
    loop {
        match receive.recv().await? {
            InboundEvent::Connect => send.send(OutboundIntent::accept()).await?,
            InboundEvent::Receive { payload } => send.send(OutboundIntent::from(payload)).await?,
            InboundEvent::Disconnect { .. } => return Ok(None),
        }
    }
}

/// What a [`recorder`] application observed.
pub struct Recording {
    pub scopes: mpsc::UnboundedReceiver<Arc<Scope>>,
    pub events: mpsc::UnboundedReceiver<InboundEvent>,
}

impl Recording {
    /// Next event delivered to the application.
    pub async fn next_event(&mut self) -> InboundEvent {
        within(self.events.recv())
            .await
            .expect("application stopped recording")
    }

    /// Scope the application was started with.
    pub async fn scope(&mut self) -> Arc<Scope> {
        within(self.scopes.recv())
            .await
            .expect("application never started")
    }
}

/// Application accepting the handshake and reporting every event it
/// receives, until the terminal disconnect.
pub fn recorder() -> (impl Application, Recording) {
    recorder_with(Some(OutboundIntent::accept()))
}

/// Like [`recorder`], answering `Connect` with `answer` if given.
pub fn recorder_with(answer: Option<OutboundIntent>) -> (impl Application, Recording) {
    let (scope_tx, scopes) = mpsc::unbounded_channel();
    let (event_tx, events) = mpsc::unbounded_channel();
    let app = move |scope: Arc<Scope>, receive: Receiver, send: Sender| {
        record(
            scope_tx.clone(),
            event_tx.clone(),
            answer.clone(),
            scope,
            receive,
            send,
        )
    };
    (app, Recording { scopes, events })
}

async fn record(
    scopes: mpsc::UnboundedSender<Arc<Scope>>,
    events: mpsc::UnboundedSender<InboundEvent>,
    answer: Option<OutboundIntent>,
    scope: Arc<Scope>,
    mut receive: Receiver,
    send: Sender,
) -> AppResult {
    let _ = scopes.send(scope);
    loop {
        let event = receive.recv().await?;
        let done = event.is_disconnect();
        let connect = event == InboundEvent::Connect;
        let _ = events.send(event);
        if connect {
            if let Some(answer) = answer.clone() {
                send.send(answer).await?;
            }
        }
        if done {
            return Ok(None);
        }
    }
}

/// Handle to a [`remote`] application.
pub struct Remote {
    intents: mpsc::UnboundedSender<OutboundIntent>,
    results: mpsc::UnboundedReceiver<Result<(), SendError>>,
    pub events: mpsc::UnboundedReceiver<InboundEvent>,
}

impl Remote {
    /// Have the application send `intent` and return the outcome.
    pub async fn send(&mut self, intent: OutboundIntent) -> Result<(), SendError> {
        self.submit(intent);
        self.result().await
    }

    /// Have the application send `intent` without waiting for the outcome.
    pub fn submit(&self, intent: OutboundIntent) {
        self.intents.send(intent).expect("application is gone");
    }

    /// Outcome of the oldest submitted intent.
    pub async fn result(&mut self) -> Result<(), SendError> {
        within(self.results.recv())
            .await
            .expect("application is gone")
    }

    /// Next event the application received.
    pub async fn next_event(&mut self) -> InboundEvent {
        within(self.events.recv())
            .await
            .expect("receive loop is gone")
    }
}

/// Application that sends whatever the test submits through [`Remote`]
/// while forwarding every inbound event back to the test.
///
/// The application returns once the [`Remote`] is dropped.
pub fn remote() -> (impl Application, Remote) {
    let (intent_tx, intent_rx) = mpsc::unbounded_channel();
    let (result_tx, results) = mpsc::unbounded_channel();
    let (event_tx, events) = mpsc::unbounded_channel();
    let intents = Arc::new(Mutex::new(Some(intent_rx)));
    let app = move |_scope: Arc<Scope>, receive: Receiver, send: Sender| {
        let intents = intents.lock().expect("intents poisoned").take();
        drive_remote(intents, result_tx.clone(), event_tx.clone(), receive, send)
    };
    (
        app,
        Remote {
            intents: intent_tx,
            results,
            events,
        },
    )
}

async fn drive_remote(
    intents: Option<mpsc::UnboundedReceiver<OutboundIntent>>,
    results: mpsc::UnboundedSender<Result<(), SendError>>,
    events: mpsc::UnboundedSender<InboundEvent>,
    mut receive: Receiver,
    send: Sender,
) -> AppResult {
    let Some(mut intents) = intents else {
        return Ok(None);
    };
    tokio::spawn(async move {
        while let Ok(event) = receive.recv().await {
            if events.send(event).is_err() {
                break;
            }
        }
    });
    while let Some(intent) = intents.recv().await {
        let _ = results.send(send.send(intent).await);
    }
    Ok(None)
}
