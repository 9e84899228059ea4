//! Serialized deferred execution.
//!
//! Check callbacks must not run under the bridge lock, and some callers
//! additionally need them to run in submission order. Posting to this queue
//! gives both: a single drain task runs closures one at a time, FIFO.

use tokio::sync::mpsc;
use tracing::debug;

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Task>,
}

impl TaskQueue {
    /// Spawn the drain task. The queue stops when every sender is dropped.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                task();
            }
            debug!("task queue drained");
        });
        Self { tx }
    }

    /// Post a closure for later execution. A post after shutdown is dropped.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        let _ = self.tx.send(Box::new(task));
    }
}
