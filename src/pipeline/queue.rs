//! Named job queues with priority lanes and delayed re-enqueue.
//!
//! # Design Decisions
//! - Two lanes per queue: retries enter the high lane and are drained first
//! - Dequeue is serialized per queue; handlers run concurrently on the
//!   worker tasks, which is where the per-queue concurrency bound lives
//! - Delayed jobs are parked on a timer task and injected when due

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

/// Scheduling priority of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    High,
}

/// A named in-process job queue.
pub struct JobQueue<T> {
    name: &'static str,
    high_tx: mpsc::UnboundedSender<T>,
    normal_tx: mpsc::UnboundedSender<T>,
    high_rx: Arc<Mutex<mpsc::UnboundedReceiver<T>>>,
    normal_rx: Arc<Mutex<mpsc::UnboundedReceiver<T>>>,
}

impl<T> Clone for JobQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            high_tx: self.high_tx.clone(),
            normal_tx: self.normal_tx.clone(),
            high_rx: self.high_rx.clone(),
            normal_rx: self.normal_rx.clone(),
        }
    }
}

impl<T: Send + 'static> JobQueue<T> {
    /// Create a new queue.
    pub fn new(name: &'static str) -> Self {
        let (high_tx, high_rx) = mpsc::unbounded_channel();
        let (normal_tx, normal_rx) = mpsc::unbounded_channel();
        Self {
            name,
            high_tx,
            normal_tx,
            high_rx: Arc::new(Mutex::new(high_rx)),
            normal_rx: Arc::new(Mutex::new(normal_rx)),
        }
    }

    /// The queue's name, for logging.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueue a job for immediate pickup.
    pub fn enqueue(&self, job: T, priority: Priority) {
        let result = match priority {
            Priority::High => self.high_tx.send(job),
            Priority::Normal => self.normal_tx.send(job),
        };
        if result.is_err() {
            tracing::error!(queue = self.name, "Enqueue on closed queue dropped a job");
        }
    }

    /// Enqueue a job after `delay`. The job is parked on a timer task and
    /// enters the chosen lane when due.
    pub fn enqueue_after(&self, job: T, delay: Duration, priority: Priority) {
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.enqueue(job, priority);
        });
    }

    /// Wait for the next job, preferring the high lane.
    ///
    /// Dequeue is serialized across workers (both lane locks are held while
    /// waiting); job execution happens after this returns, so worker
    /// concurrency is unaffected. Returns None once the queue is closed and
    /// drained.
    pub async fn next(&self) -> Option<T> {
        let mut high = self.high_rx.lock().await;

        // Drain anything already waiting in the high lane first
        match high.try_recv() {
            Ok(job) => return Some(job),
            Err(mpsc::error::TryRecvError::Empty) | Err(mpsc::error::TryRecvError::Disconnected) => {}
        }

        let mut normal = self.normal_rx.lock().await;
        tokio::select! {
            biased;
            job = high.recv() => job,
            job = normal.recv() => job,
        }
    }
}
