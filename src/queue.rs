//! Ordered queue of events awaiting delivery to the application.
//!
//! The dispatcher and lifecycle hooks push from synchronous contexts; the
//! application's [`crate::bridge::Receiver`] is the single consumer. The
//! queue enforces the event ordering contract: `Connect` only ever first,
//! nothing after a `Disconnect`.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use log::debug;
use tokio::sync::Notify;

use crate::message::InboundEvent;

/// Result of [`InboundQueue::push`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// The event was queued.
    Queued,
    /// The event was discarded because it would break ordering.
    Dropped,
}

#[derive(Default)]
struct QueueState {
    events: VecDeque<InboundEvent>,
    started: bool,
    terminated: bool,
    drained: bool,
}

/// Unbounded FIFO of [`InboundEvent`]s with a single consumer.
#[derive(Default)]
pub struct InboundQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl InboundQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `event`, waking the consumer.
    ///
    /// A `Connect` after any other event, or anything after a
    /// `Disconnect`, is dropped.
    pub fn push(&self, event: InboundEvent) -> PushOutcome {
        {
            let mut state = self.lock();
            let out_of_order = state.terminated || (event == InboundEvent::Connect && state.started);
            if out_of_order {
                debug!(
                    "inbound event dropped: type={}, terminated={}",
                    event.message_type(),
                    state.terminated
                );
                return PushOutcome::Dropped;
            }
            state.started = true;
            state.terminated = event.is_disconnect();
            state.events.push_back(event);
        }
        crate::metrics::inc_events(crate::metrics::Direction::Inbound);
        self.notify.notify_one();
        PushOutcome::Queued
    }

    /// Remove the oldest event, waiting until one is available.
    ///
    /// Returns `None` once the terminal `Disconnect` has been handed out.
    pub async fn pop(&self) -> Option<InboundEvent> {
        loop {
            {
                let mut state = self.lock();
                if let Some(event) = state.events.pop_front() {
                    state.drained = event.is_disconnect();
                    return Some(event);
                }
                if state.drained {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Whether no events are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.lock().events.is_empty() }

    /// Number of events waiting.
    #[must_use]
    pub fn len(&self) -> usize { self.lock().events.len() }

    /// Whether a `Disconnect` has been queued.
    #[must_use]
    pub fn is_terminated(&self) -> bool { self.lock().terminated }
}
