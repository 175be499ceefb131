//! Tracking for spawned role tasks (sessions, capture, monitor).
//!
//! Every task is wrapped so it reports back when it finishes; the owner
//! reaps finished entries between accepts and joins the rest on shutdown.
//! A panicking task is logged and forgotten; it never takes the owner
//! down with it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// How often [`wait_for_stop`] re-checks its flag.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
enum TaskEvent {
    Finished(u64),
}

struct TrackedTask {
    name: String,
    handle: JoinHandle<()>,
}

/// A set of named, spawned tasks.
pub struct TaskPool {
    tasks: HashMap<u64, TrackedTask>,
    next_id: u64,
    pool_tx: mpsc::UnboundedSender<TaskEvent>,
    pool_rx: mpsc::UnboundedReceiver<TaskEvent>,
}

impl TaskPool {
    pub fn new() -> Self {
        let (pool_tx, pool_rx) = mpsc::unbounded_channel();
        Self {
            tasks: HashMap::new(),
            next_id: 1,
            pool_tx,
            pool_rx,
        }
    }

    /// Spawn `fut` on the runtime and track it under `name`.
    pub fn spawn<F>(&mut self, name: impl Into<String>, fut: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        let event_tx = self.pool_tx.clone();
        let handle = tokio::spawn(async move {
            fut.await;
            let _ = event_tx.send(TaskEvent::Finished(id));
        });
        self.tasks.insert(
            id,
            TrackedTask {
                name: name.into(),
                handle,
            },
        );
        id
    }

    /// Forget tasks that have completed, returning how many were removed.
    pub fn reap(&mut self) -> usize {
        let mut removed = 0;
        while let Ok(TaskEvent::Finished(id)) = self.pool_rx.try_recv() {
            if self.tasks.remove(&id).is_some() {
                removed += 1;
            }
        }
        // Panicked tasks never send `Finished`.
        self.tasks.retain(|id, task| {
            if task.handle.is_finished() {
                warn!("task {} ({id}) ended without reporting", task.name);
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task, aborting any still running after `grace`.
    pub async fn join_all(mut self, grace: Duration) {
        for (id, task) in self.tasks.drain() {
            let TrackedTask { name, mut handle } = task;
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => debug!("task {name} ({id}) finished"),
                Ok(Err(e)) if e.is_panic() => error!("task {name} ({id}) panicked: {e}"),
                Ok(Err(e)) => debug!("task {name} ({id}) cancelled: {e}"),
                Err(_) => {
                    warn!("task {name} ({id}) still running after {grace:?}; aborting");
                    handle.abort();
                }
            }
        }
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once `running` becomes `false`.
pub async fn wait_for_stop(running: &Arc<AtomicBool>) {
    loop {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(STOP_POLL_INTERVAL).await;
    }
}

/// Sleep for `duration`, returning early (with `false`) if `running`
/// clears first.
pub async fn sleep_unless_stopped(duration: Duration, running: &Arc<AtomicBool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => running.load(Ordering::SeqCst),
        _ = wait_for_stop(running) => false,
    }
}
