//! Shutdown coordination for background tasks.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Coordinator for graceful shutdown.
///
/// Every background loop subscribes to the broadcast channel before it is
/// spawned, so a trigger can never be missed. `join` waits for all of them.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    triggered: AtomicBool,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            tasks: Mutex::new(Vec::new()),
            triggered: AtomicBool::new(false),
        }
    }

    /// Spawn a tracked background task. `make` receives the shutdown
    /// receiver the task must exit on. Returns false once shut down.
    pub fn spawn<F, Fut>(&self, name: &'static str, make: F) -> bool
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        if self.is_triggered() {
            return false;
        }
        let handle = tokio::spawn(make(self.tx.subscribe()));
        tracing::debug!(task = name, "Background task spawned");
        tasks.push((name, handle));
        true
    }

    /// Trigger the shutdown signal. Returns true only on the first call.
    pub fn trigger(&self) -> bool {
        // Taking the task lock orders this against `spawn`.
        let _tasks = self.tasks.lock();
        if self.triggered.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.tx.send(());
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Wait for every tracked task to exit.
    pub async fn join(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for (name, handle) in tasks {
            match handle.await {
                Ok(()) => tracing::debug!(task = name, "Background task stopped"),
                Err(e) => tracing::error!(task = name, error = %e, "Background task failed"),
            }
        }
    }

    /// Number of live subscribers (tasks still running).
    #[cfg(test)]
    fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
