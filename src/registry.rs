//! Server-wide bookkeeping shared by all connections.
//!
//! [`ServerState`] owns two concurrent registries: live connections, held as
//! non-owning weak references so that a forgotten entry never keeps a
//! connection alive, and in-flight application tasks, each removed exactly
//! once by its [`TaskGuard`]. Both are backed by `DashMap` so connections can
//! register and deregister without a global lock.
use std::{
    fmt,
    future::Future,
    pin::pin,
    sync::{
        Arc,
        Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use log::{debug, warn};
use tokio::{sync::Notify, task::AbortHandle, time::timeout};
use tokio_util::task::TaskTracker;

use crate::connection::Connection;

/// Identifier assigned to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Identifier assigned to an application task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

/// Concurrent set of live connections keyed by [`ConnectionId`].
#[derive(Default)]
pub struct ConnectionRegistry(DashMap<ConnectionId, Weak<Connection>>);

impl ConnectionRegistry {
    pub(crate) fn insert(&self, conn: &Arc<Connection>) {
        self.0.insert(conn.id, Arc::downgrade(conn));
    }

    /// Remove a connection. Returns `true` if it was registered.
    pub fn remove(&self, id: &ConnectionId) -> bool { self.0.remove(id).is_some() }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool { self.0.contains_key(id) }

    /// Number of registered connections, including any not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Whether no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Remove all stale weak references.
    ///
    /// `DashMap::retain` acquires per-bucket write locks, so other operations
    /// may contend briefly while the registry is pruned.
    pub fn prune(&self) { self.0.retain(|_, weak| weak.strong_count() > 0); }

    /// Prune stale entries, then return the IDs of the live connections.
    #[must_use]
    pub fn active_ids(&self) -> Vec<ConnectionId> {
        self.live().into_iter().map(|conn| conn.id).collect()
    }

    fn live(&self) -> Vec<Arc<Connection>> {
        let mut live = Vec::with_capacity(self.0.len());
        self.0.retain(|_, weak| {
            if let Some(conn) = weak.upgrade() {
                live.push(conn);
                true
            } else {
                false
            }
        });
        live
    }
}

struct TaskEntry {
    connection: ConnectionId,
    abort: Option<AbortHandle>,
}

/// Concurrent set of running application tasks.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<TaskId, TaskEntry>,
    next_id: AtomicU64,
    idle: Notify,
}

impl TaskRegistry {
    /// Reserve an entry for a task about to be spawned for `connection`.
    ///
    /// The entry is removed when the returned guard is dropped, so the guard
    /// must be moved into the task.
    pub fn register(self: &Arc<Self>, connection: ConnectionId) -> TaskGuard {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.tasks.insert(
            id,
            TaskEntry {
                connection,
                abort: None,
            },
        );
        TaskGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    /// Attach the abort handle of a spawned task. Ignored if the task has
    /// already finished.
    pub fn attach(&self, id: TaskId, abort: AbortHandle) {
        if let Some(mut entry) = self.tasks.get_mut(&id) {
            entry.abort = Some(abort);
        }
    }

    fn remove(&self, id: TaskId) -> bool {
        let removed = self.tasks.remove(&id).is_some();
        if removed && self.tasks.is_empty() {
            self.idle.notify_waiters();
        }
        removed
    }

    /// Wait until no tasks are registered.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.idle.notified());
            notified.as_mut().enable();
            if self.tasks.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Whether `id` is still registered.
    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool { self.tasks.contains_key(&id) }

    /// Number of running tasks.
    #[must_use]
    pub fn len(&self) -> usize { self.tasks.len() }

    /// Whether no tasks are running.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.tasks.is_empty() }

    /// Tasks belonging to `connection`.
    #[must_use]
    pub fn tasks_for(&self, connection: ConnectionId) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|entry| entry.connection == connection)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Cancel every registered task. Entries disappear as the tasks drop
    /// their guards.
    pub fn abort_all(&self) {
        for entry in self.tasks.iter() {
            if let Some(abort) = &entry.abort {
                abort.abort();
            }
        }
    }
}

/// Scoped registration of one task in a [`TaskRegistry`].
///
/// Dropping the guard removes the entry, whether the task completed, failed,
/// panicked or was cancelled.
pub struct TaskGuard {
    registry: Arc<TaskRegistry>,
    id: TaskId,
}

impl TaskGuard {
    /// Identifier of the guarded task.
    #[must_use]
    pub fn id(&self) -> TaskId { self.id }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.registry.remove(self.id) {
            debug!("application task deregistered: task_id={}", self.id.0);
        }
    }
}

/// State shared by every connection of one server.
pub struct ServerState {
    connections: ConnectionRegistry,
    tasks: Arc<TaskRegistry>,
    tracker: TaskTracker,
    next_connection: AtomicU64,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            connections: ConnectionRegistry::default(),
            tasks: Arc::new(TaskRegistry::default()),
            tracker: TaskTracker::new(),
            next_connection: AtomicU64::new(1),
        }
    }
}

impl ServerState {
    /// Create empty shared state.
    #[must_use]
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    /// Registry of live connections.
    #[must_use]
    pub fn connections(&self) -> &ConnectionRegistry { &self.connections }

    /// Registry of running application tasks.
    #[must_use]
    pub fn tasks(&self) -> &Arc<TaskRegistry> { &self.tasks }

    pub(crate) fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed))
    }

    /// Spawn `future` under a registration for `connection`.
    pub(crate) fn spawn_task<F>(&self, connection: ConnectionId, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.tasks.register(connection);
        let id = guard.id();
        let handle = self.tracker.spawn(async move {
            let _guard = guard;
            future.await;
        });
        self.tasks.attach(id, handle.abort_handle());
    }

    /// Force every live connection closed with a service-restart code.
    pub fn shutdown_all(&self) {
        let live = self.connections.live();
        debug!("shutting down connections: count={}", live.len());
        for conn in live {
            conn.shutdown();
        }
    }

    /// Wait until every application task has finished, without closing
    /// anything.
    pub async fn wait_tasks_idle(&self) { self.tasks.wait_idle().await; }

    /// Shut down all connections and wait for their application tasks to
    /// finish. No new tasks can be spawned afterwards.
    pub async fn drain(&self) {
        self.shutdown_all();
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Like [`ServerState::drain`], but cancel the tasks still running once
    /// `grace` has elapsed.
    ///
    /// Returns `false` if any task had to be cancelled.
    pub async fn drain_within(&self, grace: Duration) -> bool {
        self.shutdown_all();
        self.tracker.close();
        if timeout(grace, self.tracker.wait()).await.is_ok() {
            return true;
        }
        warn!(
            "graceful shutdown timed out, cancelling tasks: count={}",
            self.tasks.len()
        );
        self.tasks.abort_all();
        self.tracker.wait().await;
        false
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn tasks() -> Arc<TaskRegistry> { Arc::new(TaskRegistry::default()) }

    #[rstest]
    fn guard_removes_entry_once(tasks: Arc<TaskRegistry>) {
        let guard = tasks.register(ConnectionId::new(1));
        let id = guard.id();
        assert!(tasks.contains(id));
        assert_eq!(tasks.tasks_for(ConnectionId::new(1)), [id]);
        drop(guard);
        assert!(!tasks.contains(id));
        assert!(tasks.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn aborted_task_deregisters(tasks: Arc<TaskRegistry>) {
        let guard = tasks.register(ConnectionId::new(2));
        let id = guard.id();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        tasks.attach(id, handle.abort_handle());
        tasks.abort_all();
        assert!(handle.await.expect_err("task aborted").is_cancelled());
        assert!(!tasks.contains(id));
    }

    #[rstest]
    #[tokio::test]
    async fn attach_after_completion_is_ignored(tasks: Arc<TaskRegistry>) {
        let guard = tasks.register(ConnectionId::new(3));
        let id = guard.id();
        let handle = tokio::spawn(async move { drop(guard) });
        let abort = handle.abort_handle();
        handle.await.expect("join");
        tasks.attach(id, abort);
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn spawned_tasks_are_tracked_until_done() {
        let state = ServerState::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        state.spawn_task(ConnectionId::new(4), async move {
            let _ = rx.await;
        });
        assert_eq!(state.tasks().len(), 1);
        let _ = tx.send(());
        state.drain().await;
        assert!(state.tasks().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn wait_idle_resolves_when_last_guard_drops(tasks: Arc<TaskRegistry>) {
        let first = tasks.register(ConnectionId::new(5));
        let second = tasks.register(ConnectionId::new(6));
        let waiter = tokio::spawn({
            let tasks = Arc::clone(&tasks);
            async move { tasks.wait_idle().await }
        });
        drop(first);
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(second);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("idle in time")
            .expect("join waiter");
    }

    #[test]
    fn connection_ids_are_unique() {
        let state = ServerState::new();
        let first = state.next_connection_id();
        let second = state.next_connection_id();
        assert_ne!(first, second);
        assert_eq!(first.to_string(), first.as_u64().to_string());
    }
}
