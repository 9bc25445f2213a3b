//! Bounded ingestion queue between request handlers and the lookup worker.
//!
//! Producers never wait: when the buffer is full the batch is handed back as
//! a failure and the caller decides whether to retry or drop it.

use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};

/// IP addresses submitted together for lookup.
pub type Batch = Vec<String>;

/// Capacity used when the configured value is missing or not positive.
pub const DEFAULT_CAPACITY: usize = 100;

/// Resolve a configured capacity, falling back to [`DEFAULT_CAPACITY`].
pub fn effective_capacity(configured: i64) -> usize {
    if configured > 0 {
        usize::try_from(configured).unwrap_or(DEFAULT_CAPACITY)
    } else {
        DEFAULT_CAPACITY
    }
}

/// Producer side of the queue.
#[derive(Clone)]
pub struct IngestionQueue {
    tx: Sender<Batch>,
}

/// Consumer side of the queue, owned by the worker.
pub struct BatchReceiver {
    rx: Receiver<Batch>,
}

impl IngestionQueue {
    /// Create a queue holding at most `capacity` batches (0 means default).
    pub fn bounded(capacity: usize) -> (Self, BatchReceiver) {
        let capacity = if capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            capacity
        };
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, BatchReceiver { rx })
    }

    /// Append a batch if there is room. Returns `false` immediately when the
    /// queue is full or the worker is gone.
    pub fn try_enqueue(&self, batch: Batch) -> bool {
        match self.tx.try_send(batch) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Maximum number of buffered batches.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Batches waiting to be picked up.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

impl BatchReceiver {
    /// Wait for the next batch. `None` once every producer is dropped.
    pub async fn recv(&mut self) -> Option<Batch> {
        self.rx.recv().await
    }
}
