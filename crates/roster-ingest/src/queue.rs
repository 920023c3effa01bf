//! Bounded batch queue between the reader and the writers
//!
//! A `tokio::sync::mpsc` channel whose receiving half is shared by every
//! writer. The sender suspends once `capacity` batches are waiting, which is
//! what keeps memory flat for inputs of any size. Dropping the sender (via
//! [`BatchSender::close`]) is the one-way "no more batches" signal; writers
//! keep receiving until the queue is empty and then see `None`.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use crate::batcher::Batch;

/// Every receiver is gone; the rejected batch is handed back
#[derive(Error, Debug)]
#[error("work queue has no consumers left (batch {} dropped)", .0.sequence)]
pub struct QueueClosed(pub Batch);

/// Create a queue holding at most `capacity` batches
pub fn work_queue(capacity: usize) -> (BatchSender, BatchReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        BatchSender { tx },
        BatchReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer half, owned by the pipeline's read loop
#[derive(Debug)]
pub struct BatchSender {
    tx: mpsc::Sender<Batch>,
}

impl BatchSender {
    /// Enqueue a batch, waiting while the queue is full
    pub async fn enqueue(&self, batch: Batch) -> Result<(), QueueClosed> {
        self.tx.send(batch).await.map_err(|e| QueueClosed(e.0))
    }

    /// Batches currently waiting for a writer
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Signal that nothing more will be enqueued.
    ///
    /// Consumes the sender, so closing twice or enqueueing afterwards does
    /// not type-check.
    pub fn close(self) {
        drop(self.tx);
    }
}

/// Consumer half, cloned into every writer
#[derive(Debug, Clone)]
pub struct BatchReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Batch>>>,
}

impl BatchReceiver {
    /// Next batch, or `None` once the queue is closed and drained
    pub async fn dequeue(&self) -> Option<Batch> {
        self.rx.lock().await.recv().await
    }
}
