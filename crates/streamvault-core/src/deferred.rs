//! Deferred-write queue: a serialized FIFO of persistence closures.
//!
//! Catalog and statistics writes are slower and less reliable than the
//! in-memory transitions that produce them, so the hot path only enqueues a
//! closure here and moves on. A single background worker drains the queue
//! in order; a failing write stops the batch and is retried after a short
//! delay, preserving submission order. Because writes for the same stream
//! are enqueued from within a stream-locked section, their relative order
//! is exactly their submission order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::BoxError;

/// One queued persistence operation. May fail retriably; it is re-invoked
/// until it succeeds.
pub type DeferredWrite = Box<dyn FnMut() -> Result<(), BoxError> + Send>;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// FIFO of persistence closures drained by a single background worker.
pub struct DeferredWriteQueue {
    writes: Mutex<VecDeque<DeferredWrite>>,
    wake: Notify,
    stop: AtomicBool,
    retry_delay: Duration,
}

impl DeferredWriteQueue {
    /// Creates a queue with the default 1 s retry delay.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_retry_delay(DEFAULT_RETRY_DELAY)
    }

    /// Creates a queue with a custom retry delay.
    #[must_use]
    pub fn with_retry_delay(retry_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            writes: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            stop: AtomicBool::new(false),
            retry_delay,
        })
    }

    /// Enqueues a write. Never blocks on I/O.
    pub fn push(&self, write: DeferredWrite) {
        self.writes.lock().push_back(write);
        self.wake.notify_one();
    }

    /// Convenience wrapper boxing a closure.
    pub fn push_fn(&self, f: impl FnMut() -> Result<(), BoxError> + Send + 'static) {
        self.push(Box::new(f));
    }

    /// Number of writes waiting to be applied.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.lock().len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.lock().is_empty()
    }

    /// Spawns the background worker. Exactly one worker should run per
    /// queue; it exits only after [`request_shutdown`](Self::request_shutdown)
    /// has been called *and* the queue has fully drained.
    pub fn spawn_worker(self: &Arc<Self>) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                queue.drain_batch();
                if queue.stop.load(Ordering::Acquire) && queue.is_empty() {
                    break;
                }
                tokio::select! {
                    () = tokio::time::sleep(queue.retry_delay) => {}
                    () = queue.wake.notified() => {}
                }
            }
            debug!("deferred-write worker drained and stopped");
        })
    }

    /// Asks the worker to exit once the queue is empty. Await the handle
    /// returned by [`spawn_worker`](Self::spawn_worker) to observe the
    /// final drain completing.
    pub fn request_shutdown(&self) {
        self.stop.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Applies queued writes in order until the queue is empty or a write
    /// fails. A failed write returns to the front so submission order is
    /// preserved across retries.
    fn drain_batch(&self) {
        loop {
            let Some(mut write) = self.writes.lock().pop_front() else {
                return;
            };
            if let Err(err) = write() {
                warn!(error = %err, "deferred write failed, will retry");
                self.writes.lock().push_front(write);
                return;
            }
        }
    }
}

impl std::fmt::Debug for DeferredWriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredWriteQueue")
            .field("pending", &self.len())
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn recorder(log: &Arc<Mutex<Vec<u32>>>, value: u32) -> DeferredWrite {
        let log = Arc::clone(log);
        Box::new(move || {
            log.lock().push(value);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_drains_in_submission_order() {
        let queue = DeferredWriteQueue::with_retry_delay(Duration::from_millis(10));
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            queue.push(recorder(&log, i));
        }
        let worker = queue.spawn_worker();
        queue.request_shutdown();
        worker.await.unwrap();
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_failed_write_retries_without_reordering() {
        let queue = DeferredWriteQueue::with_retry_delay(Duration::from_millis(5));
        let log = Arc::new(Mutex::new(Vec::new()));
        let attempts = Arc::new(AtomicU32::new(0));

        queue.push(recorder(&log, 1));
        {
            let log = Arc::clone(&log);
            let attempts = Arc::clone(&attempts);
            queue.push_fn(move || {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    return Err("catalog unavailable".into());
                }
                log.lock().push(2);
                Ok(())
            });
        }
        queue.push(recorder(&log, 3));

        let worker = queue.spawn_worker();
        queue.request_shutdown();
        worker.await.unwrap();

        assert_eq!(*log.lock(), vec![1, 2, 3]);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_shutdown_drains_late_pushes() {
        let queue = DeferredWriteQueue::with_retry_delay(Duration::from_millis(5));
        let log = Arc::new(Mutex::new(Vec::new()));
        let worker = queue.spawn_worker();

        queue.push(recorder(&log, 1));
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(recorder(&log, 2));
        queue.request_shutdown();
        worker.await.unwrap();

        assert_eq!(*log.lock(), vec![1, 2]);
        assert!(queue.is_empty());
    }
}
