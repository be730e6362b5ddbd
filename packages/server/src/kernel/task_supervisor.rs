//! Owner of every fire-and-forget background task.
//!
//! Turn rounds and debates outlive the request that triggered them. Instead of
//! detached `tokio::spawn` calls, they run under a [`TaskSupervisor`]:
//!
//! - a semaphore bounds how many run at once; a task gated on a lock only
//!   takes its slot after the lock is held,
//! - each task gets a child [`CancellationToken`] of the supervisor's token,
//! - [`TaskSupervisor::shutdown`] cancels them all and waits for them to exit.
//!
//! ```ignore
//! let handle = deps.supervisor.spawn("turn_round", move |cancel| async move {
//!     run_turn_round(conversation_id, cancel, &deps).await
//! });
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

#[derive(Clone)]
pub struct TaskSupervisor {
    tracker: TaskTracker,
    shutdown: CancellationToken,
    permits: Arc<Semaphore>,
}

impl TaskSupervisor {
    /// `max_concurrent` is clamped to at least 1.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Runs `task` in the background once a slot is free.
    ///
    /// Resolves to `None` when shutdown begins before the task got a slot.
    /// Once started, the task is expected to watch its token and return
    /// promptly after cancellation.
    pub fn spawn<F, Fut, T>(&self, name: &'static str, task: F) -> JoinHandle<Option<T>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.spawn_gated(name, async {}, move |(), cancel| task(cancel))
    }

    /// Like [`spawn`](Self::spawn), but waits for `gate` before asking for a
    /// slot and hands its output to `task`.
    ///
    /// A task queued behind a per-key lock holds no slot while it waits, so
    /// one busy key cannot starve the others.
    pub fn spawn_gated<G, Gate, F, Fut, T>(
        &self,
        name: &'static str,
        gate: Gate,
        task: F,
    ) -> JoinHandle<Option<T>>
    where
        Gate: Future<Output = G> + Send + 'static,
        G: Send + 'static,
        F: FnOnce(G, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let cancel = self.shutdown.child_token();
        let permits = self.permits.clone();

        self.tracker.spawn(async move {
            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                opened = gate => Some(opened),
            };
            let Some(opened) = opened else {
                debug!(task = name, "cancelled before start");
                return None;
            };

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = permits.acquire_owned() => permit.ok(),
            };
            let Some(_permit) = permit else {
                debug!(task = name, "cancelled before start");
                return None;
            };

            debug!(task = name, "background task started");
            let output = task(opened, cancel).await;
            debug!(task = name, "background task finished");
            Some(output)
        })
    }

    /// Tasks spawned and not yet finished, including ones waiting for a slot.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Waits until every task spawned so far has finished, without
    /// cancelling anything.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancels all tasks and waits for them to exit. Later spawns resolve to
    /// `None` without running.
    pub async fn shutdown(&self) {
        info!(active = self.active(), "stopping background tasks");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl std::fmt::Debug for TaskSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSupervisor")
            .field("active", &self.active())
            .field("available_permits", &self.permits.available_permits())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}
