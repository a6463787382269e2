//! Thread-safe FIFO queues bridging the I/O tasks and the simulation tick.
//!
//! A queue is created explicitly with [`channel`] and its two halves are
//! injected into whichever components produce and consume — there is no
//! shared static state. [`QueueSender::push`] is an O(1) enqueue usable
//! from any thread, sync or async. [`QueueReceiver::drain`] never blocks:
//! it returns whatever is queued right now, possibly nothing, so the
//! simulation tick can call it every frame.
//!
//! Ordering: items from one producer arrive in push order. Items from
//! different producers may interleave arbitrarily.

use roversim_types::SimError;
use tokio::sync::mpsc;

/// Create a new unbounded bridge queue.
pub fn channel<T>() -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueSender { tx }, QueueReceiver { rx })
}

/// Producer half of a bridge queue. Clone freely; all clones feed the same
/// receiver.
pub struct QueueSender<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    /// Enqueue `item`. Fails only when the receiving half has been dropped.
    pub fn push(&self, item: T) -> Result<(), SimError> {
        self.tx
            .send(item)
            .map_err(|_| SimError::Channel("bridge queue receiver dropped".to_string()))
    }
}

/// Consumer half of a bridge queue.
pub struct QueueReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> QueueReceiver<T> {
    /// Take everything currently queued, in arrival order, without blocking.
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            items.push(item);
        }
        items
    }

    /// Wait for the next item. Returns `None` once every sender has been
    /// dropped and the queue is empty. Used by I/O tasks that sleep until
    /// there is something to write.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}
