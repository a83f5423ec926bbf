//! Single-worker task queue.
//!
//! Jobs run one at a time in the order they were queued. Every ledger and
//! content mutation of a handoff goes through one of these, which is what
//! keeps two submissions from interleaving their file moves.

use crate::core::{StagerError, StagerResult};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::{mpsc, oneshot};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl TaskQueue {
    /// Spawn the worker. Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                // Each job gets its own task so a panic only loses that job
                if let Err(e) = tokio::spawn(job).await {
                    tracing::error!(error = %e, "queued task panicked");
                }
            }
        });
        Self { tx }
    }

    /// Queue `job` and return a future resolving to its output.
    ///
    /// The job takes its place in the queue when this is called, not when
    /// the returned future is first polled.
    pub fn run<F, T>(&self, job: F) -> impl Future<Output = StagerResult<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let queued = self
            .tx
            .send(Box::pin(async move {
                let _ = reply_tx.send(job.await);
            }))
            .is_ok();

        async move {
            if !queued {
                return Err(StagerError::InvalidState(
                    "task queue worker has stopped".to_string(),
                ));
            }
            reply_rx.await.map_err(|_| {
                StagerError::InvalidState("queued task ended without a result".to_string())
            })
        }
    }

    /// Queue `job` without waiting for it.
    pub fn push<F>(&self, job: F) -> StagerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tx
            .send(Box::pin(job))
            .map_err(|_| StagerError::InvalidState("task queue worker has stopped".to_string()))
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
