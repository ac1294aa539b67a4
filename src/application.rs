//! The application contract.

use std::{any::Any, future::Future, sync::Arc};

use async_trait::async_trait;

use crate::{
    bridge::{Receiver, Sender},
    scope::Scope,
};

/// Error type applications may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Value an application may return. Returning anything is a contract
/// violation and closes the connection.
pub type ReturnValue = Box<dyn Any + Send>;

/// Result of one application invocation.
pub type AppResult = Result<Option<ReturnValue>, BoxError>;

/// A WebSocket application, invoked once per connection.
///
/// The application must answer the handshake with
/// [`OutboundIntent::Accept`](crate::message::OutboundIntent::Accept) or
/// [`OutboundIntent::Close`](crate::message::OutboundIntent::Close) before
/// sending anything else, and should return `Ok(None)` when done.
///
/// Any `async fn` or closure with the matching signature implements this
/// trait:
///
/// ```
/// use std::sync::Arc;
///
/// use wsbridge::{
///     application::AppResult,
///     bridge::{Receiver, Sender},
///     message::{InboundEvent, OutboundIntent},
///     scope::Scope,
/// };
///
/// async fn echo(_scope: Arc<Scope>, mut receive: Receiver, send: Sender) -> AppResult {
///     while let Ok(event) = receive.recv().await {
///         match event {
///             InboundEvent::Connect => send.send(OutboundIntent::accept()).await?,
///             InboundEvent::Receive { payload } => {
///                 send.send(OutboundIntent::from(payload)).await?;
///             }
///             InboundEvent::Disconnect { .. } => break,
///         }
///     }
///     Ok(None)
/// }
///
/// let _app: Arc<dyn wsbridge::Application> = Arc::new(echo);
/// ```
#[async_trait]
pub trait Application: Send + Sync + 'static {
    /// Serve one connection.
    async fn call(&self, scope: Arc<Scope>, receive: Receiver, send: Sender) -> AppResult;
}

#[async_trait]
impl<F, Fut> Application for F
where
    F: Fn(Arc<Scope>, Receiver, Sender) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult> + Send + 'static,
{
    async fn call(&self, scope: Arc<Scope>, receive: Receiver, send: Sender) -> AppResult {
        (self)(scope, receive, send).await
    }
}
