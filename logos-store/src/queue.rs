//! Single-writer transaction queue.
//!
//! ```text
//! submit(op) ──► mpsc ──► worker ──► spawn(op) ─► await ─► next op
//!    │                                  │
//!    └──────── oneshot ◄── Result ──────┘
//! ```
//!
//! Operations are queued when they are submitted, not when the returned
//! future is first polled, and run strictly one at a time in submission
//! order. Each operation runs in its own task, so an error or a panic only
//! affects that operation's caller; the worker moves on to the next entry.
//!
//! The queue covers the whole store instance, including unrelated documents.
//! One queue per document name would allow more concurrency but is not
//! implemented.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::error::{StoreError, StoreResult};

type Job = BoxFuture<'static, ()>;

/// Queue counters, readable without going through the queue.
#[derive(Debug, Default)]
pub(crate) struct QueueCounters {
    pub submitted: AtomicU64,
    pub failed: AtomicU64,
}

/// Handle to a store's transaction queue. Clones share the same worker.
#[derive(Clone)]
pub struct TransactionQueue {
    sender: mpsc::UnboundedSender<Job>,
    counters: Arc<QueueCounters>,
}

impl TransactionQueue {
    /// Spawn the worker on the current tokio runtime.
    pub fn new() -> StoreResult<Self> {
        let handle = Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        handle.spawn(Self::run(receiver));
        Ok(Self {
            sender,
            counters: Arc::new(QueueCounters::default()),
        })
    }

    /// Drain jobs one at a time until every sender is gone.
    async fn run(mut receiver: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = receiver.recv().await {
            if let Err(e) = tokio::spawn(job).await {
                log::error!("Transaction panicked: {e}");
            }
        }
        log::debug!("Transaction queue closed");
    }

    /// Queue `op` and return a future resolving to its result.
    ///
    /// Failures are logged here and handed back to the caller unchanged.
    pub fn submit<T, F>(
        &self,
        label: &'static str,
        op: F,
    ) -> impl Future<Output = StoreResult<T>> + Send + 'static
    where
        T: Send + 'static,
        F: Future<Output = StoreResult<T>> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let counters = self.counters.clone();
        let job: Job = Box::pin(async move {
            let result = op.await;
            if let Err(e) = &result {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("Transaction '{label}' failed: {e}");
            }
            // The caller may have dropped its future; the work is done either way.
            let _ = reply_tx.send(result);
        });

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        let queued = self.sender.send(job).is_ok();

        async move {
            if !queued {
                return Err(StoreError::Aborted(format!("queue closed before '{label}'")));
            }
            match reply_rx.await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Aborted(format!("'{label}' did not complete"))),
            }
        }
    }

    /// Queue `op` without waiting for it. Failures are only logged.
    pub fn submit_detached<F>(&self, label: &'static str, op: F)
    where
        F: Future<Output = StoreResult<()>> + Send + 'static,
    {
        let counters = self.counters.clone();
        let job: Job = Box::pin(async move {
            if let Err(e) = op.await {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("Background '{label}' failed: {e}");
            }
        });

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        if self.sender.send(job).is_err() {
            log::warn!("Queue closed, dropped background '{label}'");
        }
    }

    /// Operations submitted so far.
    pub fn submitted(&self) -> u64 {
        self.counters.submitted.load(Ordering::Relaxed)
    }

    /// Operations that returned an error.
    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }
}
